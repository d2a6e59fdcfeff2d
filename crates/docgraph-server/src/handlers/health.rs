use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use tracing::info;

use docgraph_core::api_types::HealthResponse;
use docgraph_core::GraphStatistics;

use crate::state::AppState;

const VERSION: &str = env!("CARGO_PKG_VERSION");

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    info!("Health check requested");

    let (store_connected, statistics) = match state.writer.graph_statistics().await {
        Ok(stats) => (true, stats),
        Err(e) => {
            tracing::warn!("Graph store connectivity check failed: {e}");
            (false, GraphStatistics::default())
        }
    };

    let status = if store_connected {
        "ok".to_string()
    } else {
        "degraded".to_string()
    };

    let response = HealthResponse {
        status,
        version: VERSION.to_string(),
        backend: state.writer.backend().to_string(),
        store_connected,
        statistics,
    };

    (StatusCode::OK, Json(response))
}
