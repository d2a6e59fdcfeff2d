use thiserror::Error;

use crate::ingest::IngestionSummary;

#[derive(Error, Debug)]
pub enum DocGraphError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Transient store error: {0}")]
    StoreTransient(String),

    #[error("Fatal store error: {0}")]
    StoreFatal(String),

    /// A fatal error stopped the run. The summary describes what was written
    /// before the abort.
    #[error("Ingestion of {} aborted: {source}", summary.document_id)]
    Aborted {
        summary: Box<IngestionSummary>,
        #[source]
        source: Box<DocGraphError>,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DocGraphError {
    /// Errors worth another attempt after a backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DocGraphError::StoreTransient(_))
    }

    /// Errors that make any further write in the same run pointless.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DocGraphError::StoreFatal(_) | DocGraphError::Config(_) | DocGraphError::Aborted { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, DocGraphError>;
