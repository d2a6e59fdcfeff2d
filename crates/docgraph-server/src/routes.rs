use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::handlers;
use crate::state::AppState;

pub fn create_router() -> Router<AppState> {
    Router::new()
        // Health
        .route("/api/health", get(handlers::health::health_check))
        // Documents
        .route("/api/documents", post(handlers::documents::ingest_document))
        // Graph
        .route("/api/graph/stats", get(handlers::graph::graph_stats))
        .route("/api/graph", delete(handlers::graph::clear_graph))
}
