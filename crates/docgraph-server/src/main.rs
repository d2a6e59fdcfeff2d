use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use docgraph_core::{AppConfig, DocGraphError, GraphBackend, GraphStore};
use docgraph_extraction::CapitalizedWordExtractor;
use docgraph_graph::{GraphWriter, InMemoryGraphStore, Neo4jGraphStore};
use docgraph_pipeline::{CancellationToken, IngestionCoordinator};

mod handlers;
mod routes;
mod state;

use state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(
                "docgraph=info"
                    .parse()
                    .unwrap_or_else(|_| tracing_subscriber::filter::LevelFilter::INFO.into()),
            ),
        )
        .init();

    if let Err(e) = run().await {
        tracing::error!(error = %e, "docgraph server failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), DocGraphError> {
    let config = AppConfig::from_env()?;
    let addr = format!("{}:{}", config.server_host, config.server_port);

    let store: Arc<dyn GraphStore> = match config.graph_backend {
        GraphBackend::Neo4j => Arc::new(Neo4jGraphStore::connect(&config).await?),
        GraphBackend::Memory => {
            tracing::warn!("Using in-memory graph backend; data is lost on exit");
            Arc::new(InMemoryGraphStore::new())
        }
    };

    let writer = Arc::new(GraphWriter::new(store, config.ingest.store_timeout()));
    writer.ensure_schema().await?;

    let coordinator = Arc::new(IngestionCoordinator::from_config(
        writer.clone(),
        Arc::new(CapitalizedWordExtractor::new()),
        &config.ingest,
    )?);

    let shutdown = CancellationToken::new();
    let state = AppState {
        config,
        writer,
        coordinator,
        shutdown: shutdown.clone(),
    };

    let app = routes::create_router()
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| DocGraphError::Config(format!("Failed to bind {addr}: {e}")))?;
    tracing::info!("docgraph server listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .map_err(|e| DocGraphError::Internal(format!("Server error: {e}")))
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }
    tracing::info!("Shutdown requested, cancelling running ingestions");
    shutdown.cancel();
}
