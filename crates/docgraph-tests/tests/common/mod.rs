//! Fault-injecting `GraphStore` and helpers to build a coordinator over it.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use docgraph_core::chunk::{Chunk, ChunkRef};
use docgraph_core::error::{DocGraphError, Result};
use docgraph_core::graph::{GraphStatistics, GraphStore};
use docgraph_extraction::CapitalizedWordExtractor;
use docgraph_graph::{GraphWriter, InMemoryGraphStore};
use docgraph_pipeline::{IngestionCoordinator, RetryPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    Transient,
    Fatal,
}

#[derive(Debug, Clone, Copy)]
struct ChunkFault {
    fault: Fault,
    /// `None` fails forever.
    remaining: Option<u32>,
}

/// `InMemoryGraphStore` with scripted failures and instrumentation.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: InMemoryGraphStore,
    chunk_faults: Mutex<HashMap<u64, ChunkFault>>,
    mention_faults: Mutex<HashMap<String, u32>>,
    chunk_attempts: Mutex<HashMap<u64, u32>>,
    chunk_delay: Mutex<Option<Duration>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every write of `chunk_index` fails with `fault`.
    pub fn fail_chunk_always(&self, chunk_index: u64, fault: Fault) {
        self.chunk_faults.lock().unwrap().insert(
            chunk_index,
            ChunkFault {
                fault,
                remaining: None,
            },
        );
    }

    /// The next `times` writes of `chunk_index` fail with `fault`.
    pub fn fail_chunk_times(&self, chunk_index: u64, times: u32, fault: Fault) {
        self.chunk_faults.lock().unwrap().insert(
            chunk_index,
            ChunkFault {
                fault,
                remaining: Some(times),
            },
        );
    }

    /// The next `times` chunk writes that mention `entity_name` fail
    /// transiently.
    pub fn fail_mention_times(&self, entity_name: &str, times: u32) {
        self.mention_faults
            .lock()
            .unwrap()
            .insert(entity_name.to_string(), times);
    }

    pub fn delay_chunk_writes(&self, delay: Duration) {
        *self.chunk_delay.lock().unwrap() = Some(delay);
    }

    pub fn chunk_attempts(&self, chunk_index: u64) -> u32 {
        self.chunk_attempts
            .lock()
            .unwrap()
            .get(&chunk_index)
            .copied()
            .unwrap_or(0)
    }

    /// Highest number of chunk writes observed running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn take_chunk_fault(&self, chunk_index: u64) -> Option<Fault> {
        let mut faults = self.chunk_faults.lock().unwrap();
        let entry = faults.get_mut(&chunk_index)?;
        match entry.remaining {
            None => Some(entry.fault),
            Some(0) => None,
            Some(n) => {
                entry.remaining = Some(n - 1);
                Some(entry.fault)
            }
        }
    }

    fn take_mention_fault(&self, entities: &BTreeSet<String>) -> Option<String> {
        let mut faults = self.mention_faults.lock().unwrap();
        entities.iter().find_map(|name| match faults.get_mut(name) {
            Some(n) if *n > 0 => {
                *n -= 1;
                Some(name.clone())
            }
            _ => None,
        })
    }
}

fn fault_error(fault: Fault, what: &str) -> DocGraphError {
    match fault {
        Fault::Transient => DocGraphError::StoreTransient(format!("injected connection reset on {what}")),
        Fault::Fatal => DocGraphError::StoreFatal(format!("injected authentication failure on {what}")),
    }
}

#[async_trait]
impl GraphStore for FlakyStore {
    fn backend(&self) -> &'static str {
        "flaky"
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.inner.ensure_schema().await
    }

    async fn ensure_chunk(&self, chunk: &Chunk) -> Result<ChunkRef> {
        self.inner.ensure_chunk(chunk).await
    }

    async fn ensure_entity(&self, name: &str) -> Result<()> {
        self.inner.ensure_entity(name).await
    }

    async fn ensure_mention(&self, entity_name: &str, chunk: &ChunkRef) -> Result<()> {
        self.inner.ensure_mention(entity_name, chunk).await
    }

    async fn write_chunk(&self, chunk: &Chunk, entities: &BTreeSet<String>) -> Result<ChunkRef> {
        *self
            .chunk_attempts
            .lock()
            .unwrap()
            .entry(chunk.chunk_index)
            .or_insert(0) += 1;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self.chunk_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let result = match self.take_chunk_fault(chunk.chunk_index) {
            Some(fault) => Err(fault_error(fault, &format!("chunk {}", chunk.chunk_index))),
            None => match self.take_mention_fault(entities) {
                Some(name) => Err(fault_error(Fault::Transient, &format!("mention {name}"))),
                None => self.inner.write_chunk(chunk, entities).await,
            },
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn prune_chunks(&self, document_id: &str, keep: u64) -> Result<u64> {
        self.inner.prune_chunks(document_id, keep).await
    }

    async fn clear_all(&self) -> Result<()> {
        self.inner.clear_all().await
    }

    async fn statistics(&self) -> Result<GraphStatistics> {
        self.inner.statistics().await
    }
}

/// Retry quickly so failure tests stay fast.
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(2))
}

pub fn coordinator_over(store: Arc<dyn GraphStore>, max_concurrency: usize) -> IngestionCoordinator {
    let writer = Arc::new(GraphWriter::new(store, Duration::from_secs(5)));
    IngestionCoordinator::new(writer, Arc::new(CapitalizedWordExtractor::new()))
        .with_retry_policy(fast_retry())
        .with_max_concurrency(max_concurrency)
        .expect("test pools are non-empty")
}

/// Text with exactly `chunks` chunks at size 100 / overlap 0, where chunk `i`
/// mentions `Shared` and `Unique{letter}`.
pub fn document_with_chunks(chunks: usize) -> String {
    (0..chunks)
        .map(|i| {
            let unique = (b'A' + i as u8) as char;
            let sentence = format!("Shared met Unique{unique} today. ");
            let mut block = sentence.clone();
            while block.len() + sentence.len() <= 100 {
                block.push_str(&sentence);
            }
            format!("{block:<100}")
        })
        .collect()
}
