use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use tracing::{error, info, warn};

use docgraph_core::api_types::{ErrorResponse, IngestRequest};
use docgraph_core::DocGraphError;

use crate::state::AppState;

pub async fn ingest_document(
    State(state): State<AppState>,
    Json(request): Json<IngestRequest>,
) -> impl IntoResponse {
    let chunk_size = request.chunk_size.unwrap_or(state.config.ingest.chunk_size);
    let chunk_overlap = request
        .chunk_overlap
        .unwrap_or(state.config.ingest.chunk_overlap);

    info!(
        document_id = %request.document_id,
        bytes = request.text.len(),
        chunk_size,
        chunk_overlap,
        "Ingesting document"
    );

    let result = state
        .coordinator
        .ingest_with_cancel(
            &request.document_id,
            &request.text,
            chunk_size,
            chunk_overlap,
            &state.shutdown,
        )
        .await;

    match result {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(DocGraphError::Aborted { summary, source }) => {
            error!(document_id = %request.document_id, error = %source, "Ingestion aborted");
            (StatusCode::SERVICE_UNAVAILABLE, Json(*summary)).into_response()
        }
        Err(e @ DocGraphError::Config(_)) => {
            warn!(document_id = %request.document_id, error = %e, "Rejected ingestion request");
            (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
        Err(e) => {
            error!(document_id = %request.document_id, error = %e, "Ingestion failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("Ingestion failed: {e}"),
                }),
            )
                .into_response()
        }
    }
}
