use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a single ingestion run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum IngestionOutcome {
    /// Every chunk was written.
    Complete,
    /// Every chunk was scheduled but some could not be written.
    Partial { failed: u64 },
    /// Cooperative cancellation stopped scheduling before the end.
    Cancelled,
    /// A fatal store error stopped the run.
    Aborted { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkFailure {
    pub chunk_index: u64,
    pub attempts: u32,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionSummary {
    pub run_id: Uuid,
    pub document_id: String,
    pub outcome: IngestionOutcome,
    pub chunks_total: u64,
    pub chunks_attempted: u64,
    pub chunks_written: u64,
    pub chunks_failed: u64,
    /// Distinct entity names across all chunks written in this run.
    pub distinct_entities_seen: u64,
    pub failures: Vec<ChunkFailure>,
    /// `None` when pruning was skipped or failed.
    pub stale_chunks_removed: Option<u64>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl IngestionSummary {
    pub fn is_complete(&self) -> bool {
        self.outcome == IngestionOutcome::Complete
    }
}
