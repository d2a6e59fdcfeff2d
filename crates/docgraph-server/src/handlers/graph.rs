use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use tracing::{error, info};

use docgraph_core::api_types::{ClearResponse, ErrorResponse};

use crate::state::AppState;

pub async fn graph_stats(State(state): State<AppState>) -> impl IntoResponse {
    info!("Fetching graph statistics");

    match state.writer.graph_statistics().await {
        Ok(stats) => (StatusCode::OK, Json(stats)).into_response(),
        Err(e) => {
            error!("Failed to get graph statistics: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("Failed to get graph statistics: {e}"),
                }),
            )
                .into_response()
        }
    }
}

/// Drop every Entity and Chunk node. Used before a full rebuild.
pub async fn clear_graph(State(state): State<AppState>) -> impl IntoResponse {
    info!("Clearing graph");

    if let Err(e) = state.writer.clear_all().await {
        error!("Failed to clear graph: {e}");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: format!("Failed to clear graph: {e}"),
            }),
        )
            .into_response();
    }

    match state.writer.graph_statistics().await {
        Ok(statistics) => (
            StatusCode::OK,
            Json(ClearResponse {
                cleared: true,
                statistics,
            }),
        )
            .into_response(),
        Err(e) => {
            error!("Graph cleared but statistics unavailable: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("Graph cleared but statistics unavailable: {e}"),
                }),
            )
                .into_response()
        }
    }
}
