use serde::{Deserialize, Serialize};

use crate::graph::GraphStatistics;

// --- Health ---

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub backend: String,
    pub store_connected: bool,
    pub statistics: GraphStatistics,
}

// --- Documents ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRequest {
    pub document_id: String,
    pub text: String,
    /// Falls back to the server's configured chunk size.
    #[serde(default)]
    pub chunk_size: Option<usize>,
    #[serde(default)]
    pub chunk_overlap: Option<usize>,
}

// --- Graph ---

#[derive(Debug, Serialize, Deserialize)]
pub struct ClearResponse {
    pub cleared: bool,
    pub statistics: GraphStatistics,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ingest_request_optional_params() {
        let req: IngestRequest =
            serde_json::from_str(r#"{"document_id": "doc-1", "text": "Alice met Bob."}"#).unwrap();
        assert_eq!(req.document_id, "doc-1");
        assert!(req.chunk_size.is_none());
        assert!(req.chunk_overlap.is_none());

        let req: IngestRequest = serde_json::from_str(
            r#"{"document_id": "doc-1", "text": "", "chunk_size": 400, "chunk_overlap": 50}"#,
        )
        .unwrap();
        assert_eq!(req.chunk_size, Some(400));
        assert_eq!(req.chunk_overlap, Some(50));
    }
}
