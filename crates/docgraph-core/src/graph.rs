use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::chunk::{Chunk, ChunkRef};
use crate::error::Result;

/// Aggregate counts over everything the pipeline manages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStatistics {
    pub total_nodes: u64,
    pub total_relationships: u64,
    pub num_entities: u64,
    pub num_chunks: u64,
}

impl GraphStatistics {
    pub fn is_empty(&self) -> bool {
        self.total_nodes == 0 && self.total_relationships == 0
    }
}

/// Property-graph backend. Every write is "ensure existence", never "add",
/// so any call may be retried after a failure without duplicating state.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Short backend name used in logs and health output.
    fn backend(&self) -> &'static str;

    /// Create whatever constraints/indexes the backend needs for merges to
    /// be serialized per key. Safe to call repeatedly.
    async fn ensure_schema(&self) -> Result<()>;

    /// Create the chunk node or overwrite the text of the existing one.
    /// Incoming MENTIONS edges of an existing chunk are removed in the same
    /// write; the caller re-ensures the mentions of the new text.
    async fn ensure_chunk(&self, chunk: &Chunk) -> Result<ChunkRef>;

    /// Merge the entity node keyed by `name`.
    async fn ensure_entity(&self, name: &str) -> Result<()>;

    /// Merge the `Entity -[:MENTIONS]-> Chunk` edge. Both endpoints must exist.
    async fn ensure_mention(&self, entity_name: &str, chunk: &ChunkRef) -> Result<()>;

    /// Write a chunk together with its entities and MENTIONS edges as one
    /// unit: the chunk text is set, its previous mentions are replaced by
    /// `entities`, and every entity is merged. On error nothing of this call
    /// is visible and the previous version of the chunk stays intact.
    async fn write_chunk(&self, chunk: &Chunk, entities: &BTreeSet<String>) -> Result<ChunkRef>;

    /// Detach-delete chunks of `document_id` whose index is `>= keep`.
    /// Returns the number of chunks removed.
    async fn prune_chunks(&self, document_id: &str, keep: u64) -> Result<u64>;

    /// Delete every node and relationship the pipeline manages.
    async fn clear_all(&self) -> Result<()>;

    async fn statistics(&self) -> Result<GraphStatistics>;
}
