use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeSet;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use docgraph_core::chunk::{Chunk, ChunkRef};
use docgraph_core::error::{DocGraphError, Result};
use docgraph_core::graph::{GraphStatistics, GraphStore};

/// Number of lock stripes for per-entity-name serialization.
const ENTITY_LOCK_STRIPES: usize = 64;

/// Idempotent write surface of the pipeline.
///
/// Wraps a `GraphStore` and adds two guarantees the backend may not give by
/// itself: every call is bounded by a timeout (elapsed counts as a transient
/// store error), and upserts of the same entity name never run concurrently.
pub struct GraphWriter {
    store: Arc<dyn GraphStore>,
    timeout: Duration,
    entity_locks: Vec<Mutex<()>>,
}

impl GraphWriter {
    pub fn new(store: Arc<dyn GraphStore>, timeout: Duration) -> Self {
        Self {
            store,
            timeout,
            entity_locks: (0..ENTITY_LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        self.timed("ensure_schema", self.store.ensure_schema()).await
    }

    /// Create the chunk or overwrite its text. Existing mentions of the chunk
    /// are dropped; re-add them with [`GraphWriter::upsert_entity_and_mention`].
    pub async fn upsert_chunk(
        &self,
        document_id: &str,
        chunk_index: u64,
        text: &str,
    ) -> Result<ChunkRef> {
        let chunk = Chunk::new(document_id, chunk_index, text);
        self.timed("upsert_chunk", self.store.ensure_chunk(&chunk)).await
    }

    /// Merge the entity by name, then merge its MENTIONS edge to `chunk`.
    pub async fn upsert_entity_and_mention(&self, entity_name: &str, chunk: &ChunkRef) -> Result<()> {
        let _guard = self.entity_lock(entity_name).lock().await;
        self.timed("upsert_entity", self.store.ensure_entity(entity_name))
            .await?;
        self.timed("upsert_mention", self.store.ensure_mention(entity_name, chunk))
            .await
    }

    /// Write a chunk with all of its entity mentions as one store call. A
    /// failed call leaves the previous version of the chunk in place.
    pub async fn write_chunk(
        &self,
        document_id: &str,
        chunk_index: u64,
        text: &str,
        entities: &BTreeSet<String>,
    ) -> Result<ChunkRef> {
        let chunk = Chunk::new(document_id, chunk_index, text);

        // Stripes are taken in ascending order so overlapping entity sets
        // cannot deadlock.
        let stripes: BTreeSet<usize> = entities.iter().map(|name| self.stripe(name)).collect();
        let mut guards = Vec::with_capacity(stripes.len());
        for stripe in stripes {
            guards.push(self.entity_locks[stripe].lock().await);
        }

        self.timed("write_chunk", self.store.write_chunk(&chunk, entities))
            .await
    }

    /// Remove chunks of `document_id` at or past `chunk_count`.
    pub async fn prune_document(&self, document_id: &str, chunk_count: u64) -> Result<u64> {
        let removed = self
            .timed("prune_document", self.store.prune_chunks(document_id, chunk_count))
            .await?;
        if removed > 0 {
            tracing::info!(document_id = %document_id, removed, "Pruned stale chunks");
        }
        Ok(removed)
    }

    /// Delete everything the pipeline manages. Used only by explicit rebuilds.
    pub async fn clear_all(&self) -> Result<()> {
        tracing::warn!(backend = self.backend(), "Clearing all graph data");
        self.timed("clear_all", self.store.clear_all()).await
    }

    pub async fn graph_statistics(&self) -> Result<GraphStatistics> {
        self.timed("graph_statistics", self.store.statistics()).await
    }

    fn stripe(&self, name: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        name.hash(&mut hasher);
        (hasher.finish() as usize) % self.entity_locks.len()
    }

    fn entity_lock(&self, name: &str) -> &Mutex<()> {
        &self.entity_locks[self.stripe(name)]
    }

    /// Bound a store call by the writer timeout.
    async fn timed<T, F: Future<Output = Result<T>>>(&self, op: &'static str, fut: F) -> Result<T> {
        tokio::time::timeout(self.timeout, fut).await.map_err(|_| {
            tracing::warn!(op, timeout_ms = self.timeout.as_millis() as u64, "Store operation timed out");
            DocGraphError::StoreTransient(format!(
                "{op} timed out after {}ms",
                self.timeout.as_millis()
            ))
        })?
    }
}
