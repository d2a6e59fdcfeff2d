use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use async_trait::async_trait;

use docgraph_core::chunk::{Chunk, ChunkRef};
use docgraph_core::error::{DocGraphError, Result};
use docgraph_core::graph::{GraphStatistics, GraphStore};

#[derive(Debug, Default)]
struct State {
    chunks: BTreeMap<ChunkRef, String>,
    entities: BTreeSet<String>,
    /// `(entity name, chunk)`; a set, so each pair exists at most once.
    mentions: BTreeSet<(String, ChunkRef)>,
}

/// Process-local `GraphStore`. A single mutex serializes every write, which
/// gives the same per-key merge guarantees the Neo4j constraints give.
#[derive(Debug, Default)]
pub struct InMemoryGraphStore {
    state: Mutex<State>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| DocGraphError::Internal("in-memory graph lock poisoned".into()))
    }

    /// Text of a stored chunk, if present.
    pub fn chunk_text(&self, document_id: &str, chunk_index: u64) -> Option<String> {
        let key = ChunkRef {
            document_id: document_id.to_string(),
            chunk_index,
        };
        self.state.lock().ok()?.chunks.get(&key).cloned()
    }

    /// Indices of the stored chunks of one document, ascending.
    pub fn chunk_indices(&self, document_id: &str) -> Vec<u64> {
        match self.state.lock() {
            Ok(state) => state
                .chunks
                .keys()
                .filter(|c| c.document_id == document_id)
                .map(|c| c.chunk_index)
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Chunks that `entity_name` is mentioned in.
    pub fn mentions_of(&self, entity_name: &str) -> Vec<ChunkRef> {
        match self.state.lock() {
            Ok(state) => state
                .mentions
                .iter()
                .filter(|(name, _)| name == entity_name)
                .map(|(_, chunk)| chunk.clone())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn has_entity(&self, name: &str) -> bool {
        self.state
            .lock()
            .map(|s| s.entities.contains(name))
            .unwrap_or(false)
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn ensure_schema(&self) -> Result<()> {
        Ok(())
    }

    async fn ensure_chunk(&self, chunk: &Chunk) -> Result<ChunkRef> {
        let key = chunk.chunk_ref();
        let mut state = self.lock()?;
        if state.chunks.insert(key.clone(), chunk.text.clone()).is_some() {
            state.mentions.retain(|(_, c)| c != &key);
        }
        Ok(key)
    }

    async fn ensure_entity(&self, name: &str) -> Result<()> {
        let mut state = self.lock()?;
        if !state.entities.contains(name) {
            state.entities.insert(name.to_string());
        }
        Ok(())
    }

    async fn ensure_mention(&self, entity_name: &str, chunk: &ChunkRef) -> Result<()> {
        let mut state = self.lock()?;
        if !state.entities.contains(entity_name) || !state.chunks.contains_key(chunk) {
            return Err(DocGraphError::StoreTransient(format!(
                "mention {entity_name} -> {chunk}: entity or chunk node missing"
            )));
        }
        state.mentions.insert((entity_name.to_string(), chunk.clone()));
        Ok(())
    }

    async fn write_chunk(&self, chunk: &Chunk, entities: &BTreeSet<String>) -> Result<ChunkRef> {
        let key = chunk.chunk_ref();
        let mut state = self.lock()?;
        state.chunks.insert(key.clone(), chunk.text.clone());
        state.mentions.retain(|(_, c)| c != &key);
        for name in entities {
            state.entities.insert(name.clone());
            state.mentions.insert((name.clone(), key.clone()));
        }
        Ok(key)
    }

    async fn prune_chunks(&self, document_id: &str, keep: u64) -> Result<u64> {
        let mut state = self.lock()?;
        let stale: Vec<ChunkRef> = state
            .chunks
            .keys()
            .filter(|c| c.document_id == document_id && c.chunk_index >= keep)
            .cloned()
            .collect();

        for key in &stale {
            state.chunks.remove(key);
        }
        state.mentions.retain(|(_, c)| !stale.contains(c));

        Ok(stale.len() as u64)
    }

    async fn clear_all(&self) -> Result<()> {
        let mut state = self.lock()?;
        *state = State::default();
        Ok(())
    }

    async fn statistics(&self) -> Result<GraphStatistics> {
        let state = self.lock()?;
        let num_entities = state.entities.len() as u64;
        let num_chunks = state.chunks.len() as u64;
        Ok(GraphStatistics {
            total_nodes: num_entities + num_chunks,
            total_relationships: state.mentions.len() as u64,
            num_entities,
            num_chunks,
        })
    }
}
