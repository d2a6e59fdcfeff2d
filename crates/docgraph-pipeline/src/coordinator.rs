use std::collections::{BTreeSet, HashSet};
use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use docgraph_core::config::{validate_concurrency, IngestConfig};
use docgraph_core::error::{DocGraphError, Result};
use docgraph_core::extraction::EntityExtractor;
use docgraph_core::ingest::{ChunkFailure, IngestionOutcome, IngestionSummary};
use docgraph_extraction::Chunker;
use docgraph_graph::GraphWriter;

use crate::retry::RetryPolicy;

/// Drives Chunker -> EntityExtractor -> GraphWriter over a whole document.
///
/// Chunks are processed independently on a bounded worker pool. A chunk that
/// keeps failing with transient errors is recorded and skipped; a fatal store
/// error stops scheduling and aborts the run. Because every write is an
/// upsert, re-running the same document repairs a partial ingestion without
/// touching chunks that were already written.
///
/// Runs for the same `document_id` are serialized, prune included, so one
/// run never interleaves its chunk writes with another version's.
pub struct IngestionCoordinator {
    writer: Arc<GraphWriter>,
    extractor: Arc<dyn EntityExtractor>,
    retry: RetryPolicy,
    max_concurrency: usize,
    document_locks: DashMap<String, Arc<Mutex<()>>>,
}

enum ChunkOutcome {
    Written {
        chunk_index: u64,
        entities: BTreeSet<String>,
    },
    Failed(ChunkFailure),
    Fatal {
        failure: ChunkFailure,
        error: DocGraphError,
    },
}

/// Everything one chunk task needs; shared by all tasks of a run.
struct ChunkWorker {
    writer: Arc<GraphWriter>,
    extractor: Arc<dyn EntityExtractor>,
    retry: RetryPolicy,
    document_id: String,
    abort: CancellationToken,
}

impl IngestionCoordinator {
    pub fn new(writer: Arc<GraphWriter>, extractor: Arc<dyn EntityExtractor>) -> Self {
        let defaults = IngestConfig::default();
        Self {
            writer,
            extractor,
            retry: RetryPolicy::from_config(&defaults),
            max_concurrency: defaults.max_concurrency,
            document_locks: DashMap::new(),
        }
    }

    pub fn from_config(
        writer: Arc<GraphWriter>,
        extractor: Arc<dyn EntityExtractor>,
        config: &IngestConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            writer,
            extractor,
            retry: RetryPolicy::from_config(config),
            max_concurrency: config.max_concurrency,
            document_locks: DashMap::new(),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Size the worker pool; should not exceed the store's connection limit.
    /// Zero is rejected the same way `IngestConfig::validate` rejects it.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Result<Self> {
        validate_concurrency(max_concurrency)?;
        self.max_concurrency = max_concurrency;
        Ok(self)
    }

    pub fn writer(&self) -> &Arc<GraphWriter> {
        &self.writer
    }

    pub async fn ingest(
        &self,
        document_id: &str,
        text: &str,
        chunk_size: usize,
        chunk_overlap: usize,
    ) -> Result<IngestionSummary> {
        self.ingest_with_cancel(
            document_id,
            text,
            chunk_size,
            chunk_overlap,
            &CancellationToken::new(),
        )
        .await
    }

    /// Like [`IngestionCoordinator::ingest`], but stops scheduling new chunks
    /// once `cancel` fires. Chunk writes already in flight run to the end of
    /// their current attempt.
    ///
    /// Waits for any other run of the same `document_id` to finish first.
    pub async fn ingest_with_cancel(
        &self,
        document_id: &str,
        text: &str,
        chunk_size: usize,
        chunk_overlap: usize,
        cancel: &CancellationToken,
    ) -> Result<IngestionSummary> {
        if document_id.trim().is_empty() {
            return Err(DocGraphError::Config("document_id must not be empty".into()));
        }
        let chunker = Chunker::new(chunk_size, chunk_overlap)?;

        let lock = self.document_lock(document_id);
        let result = {
            let _guard = lock.lock().await;
            self.run(document_id, text, &chunker, chunk_size, chunk_overlap, cancel)
                .await
        };
        drop(lock);
        // Only the map holds the lock now unless another run is waiting on it.
        self.document_locks
            .remove_if(document_id, |_, held| Arc::strong_count(held) == 1);
        result
    }

    fn document_lock(&self, document_id: &str) -> Arc<Mutex<()>> {
        self.document_locks
            .entry(document_id.to_string())
            .or_default()
            .value()
            .clone()
    }

    async fn run(
        &self,
        document_id: &str,
        text: &str,
        chunker: &Chunker,
        chunk_size: usize,
        chunk_overlap: usize,
        cancel: &CancellationToken,
    ) -> Result<IngestionSummary> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        let chunks = chunker.split(text);
        let chunks_total = chunks.len() as u64;

        info!(
            %run_id,
            document_id = %document_id,
            chars = text.chars().count(),
            chunks = chunks_total,
            chunk_size,
            chunk_overlap,
            extractor = self.extractor.name(),
            "Starting document ingestion"
        );

        // Fires on caller cancellation or on the first fatal error.
        let abort = cancel.child_token();
        let worker = Arc::new(ChunkWorker {
            writer: self.writer.clone(),
            extractor: self.extractor.clone(),
            retry: self.retry,
            document_id: document_id.to_string(),
            abort: abort.clone(),
        });

        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();
        let mut scheduled: BTreeSet<u64> = BTreeSet::new();

        for (index, chunk_text) in chunks.into_iter().enumerate() {
            let chunk_index = index as u64;
            let permit = tokio::select! {
                biased;
                _ = abort.cancelled() => break,
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(e) => {
                        error!(error = %e, "Worker pool closed unexpectedly");
                        break;
                    }
                },
            };

            scheduled.insert(chunk_index);
            let worker = worker.clone();
            let chunk_text = chunk_text.to_string();
            tasks.spawn(async move {
                let _permit = permit;
                worker.run(chunk_index, chunk_text).await
            });
        }

        let chunks_attempted = scheduled.len() as u64;
        if chunks_attempted < chunks_total {
            warn!(
                %run_id,
                document_id = %document_id,
                scheduled = chunks_attempted,
                total = chunks_total,
                "Stopped scheduling chunks"
            );
        }

        let mut chunks_written = 0u64;
        let mut failures: Vec<ChunkFailure> = Vec::new();
        let mut entities_seen: HashSet<String> = HashSet::new();
        let mut fatal: Option<DocGraphError> = None;
        let mut reported: HashSet<u64> = HashSet::new();

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(ChunkOutcome::Written {
                    chunk_index,
                    entities,
                }) => {
                    reported.insert(chunk_index);
                    chunks_written += 1;
                    entities_seen.extend(entities);
                }
                Ok(ChunkOutcome::Failed(failure)) => {
                    reported.insert(failure.chunk_index);
                    failures.push(failure);
                }
                Ok(ChunkOutcome::Fatal { failure, error }) => {
                    reported.insert(failure.chunk_index);
                    failures.push(failure);
                    fatal.get_or_insert(error);
                }
                Err(join_err) => {
                    error!(%run_id, error = %join_err, "Chunk task panicked");
                }
            }
        }

        // A panicked task never reports; account for it by index.
        for chunk_index in scheduled.iter().filter(|i| !reported.contains(i)) {
            failures.push(ChunkFailure {
                chunk_index: *chunk_index,
                attempts: 0,
                error: "chunk task panicked".to_string(),
            });
        }
        failures.sort_by_key(|f| f.chunk_index);

        let mut summary = IngestionSummary {
            run_id,
            document_id: document_id.to_string(),
            outcome: IngestionOutcome::Complete,
            chunks_total,
            chunks_attempted,
            chunks_written,
            chunks_failed: failures.len() as u64,
            distinct_entities_seen: entities_seen.len() as u64,
            failures,
            stale_chunks_removed: None,
            started_at,
            finished_at: started_at,
        };

        if let Some(error) = fatal {
            return Err(aborted(summary, error));
        }

        if chunks_attempted == chunks_total {
            match self.prune(&worker, chunks_total).await {
                Ok(removed) => summary.stale_chunks_removed = removed,
                Err(error) => return Err(aborted(summary, error)),
            }
        }

        summary.outcome = if chunks_attempted < chunks_total {
            IngestionOutcome::Cancelled
        } else if summary.chunks_failed > 0 {
            IngestionOutcome::Partial {
                failed: summary.chunks_failed,
            }
        } else {
            IngestionOutcome::Complete
        };
        summary.finished_at = Utc::now();

        info!(
            %run_id,
            document_id = %document_id,
            outcome = ?summary.outcome,
            attempted = summary.chunks_attempted,
            written = summary.chunks_written,
            failed = summary.chunks_failed,
            entities = summary.distinct_entities_seen,
            "Document ingestion finished"
        );

        Ok(summary)
    }

    /// Drop chunks left over from a longer previous version of the document.
    /// Returns `None` when pruning kept failing transiently.
    async fn prune(&self, worker: &ChunkWorker, chunk_count: u64) -> Result<Option<u64>> {
        let (result, attempts) = retry_store_op(&self.retry, &worker.abort, "prune_document", || {
            self.writer.prune_document(&worker.document_id, chunk_count)
        })
        .await;

        match result {
            Ok(removed) => Ok(Some(removed)),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(
                    document_id = %worker.document_id,
                    attempts,
                    error = %e,
                    "Could not prune stale chunks"
                );
                Ok(None)
            }
        }
    }
}

fn aborted(mut summary: IngestionSummary, error: DocGraphError) -> DocGraphError {
    summary.outcome = IngestionOutcome::Aborted {
        reason: error.to_string(),
    };
    summary.finished_at = Utc::now();
    error!(
        run_id = %summary.run_id,
        document_id = %summary.document_id,
        written = summary.chunks_written,
        failed = summary.chunks_failed,
        error = %error,
        "Document ingestion aborted"
    );
    DocGraphError::Aborted {
        summary: Box::new(summary),
        source: Box::new(error),
    }
}

impl ChunkWorker {
    async fn run(&self, chunk_index: u64, text: String) -> ChunkOutcome {
        let entities = match self.extractor.extract(&text) {
            Ok(entities) => entities,
            Err(e) => {
                warn!(
                    document_id = %self.document_id,
                    chunk_index,
                    error = %e,
                    "Skipping chunk: extraction failed"
                );
                return ChunkOutcome::Failed(ChunkFailure {
                    chunk_index,
                    attempts: 0,
                    error: e.to_string(),
                });
            }
        };

        let (result, attempts) = retry_store_op(&self.retry, &self.abort, "write_chunk", || {
            self.write(chunk_index, &text, &entities)
        })
        .await;

        match result {
            Ok(()) => ChunkOutcome::Written {
                chunk_index,
                entities,
            },
            Err(e) if e.is_fatal() => {
                self.abort.cancel();
                ChunkOutcome::Fatal {
                    failure: ChunkFailure {
                        chunk_index,
                        attempts,
                        error: e.to_string(),
                    },
                    error: e,
                }
            }
            Err(e) => {
                warn!(
                    document_id = %self.document_id,
                    chunk_index,
                    attempts,
                    error = %e,
                    "Skipping chunk: write failed"
                );
                ChunkOutcome::Failed(ChunkFailure {
                    chunk_index,
                    attempts,
                    error: e.to_string(),
                })
            }
        }
    }

    /// One attempt at persisting a chunk with all its mentions. Either the
    /// whole chunk lands or the previous version stays.
    async fn write(&self, chunk_index: u64, text: &str, entities: &BTreeSet<String>) -> Result<()> {
        self.writer
            .write_chunk(&self.document_id, chunk_index, text, entities)
            .await?;
        tracing::debug!(
            document_id = %self.document_id,
            chunk_index,
            entities = entities.len(),
            "Wrote chunk"
        );
        Ok(())
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, exhausts the
/// policy, or `abort` fires. Returns the last result and the attempt count.
async fn retry_store_op<T, F, Fut>(
    policy: &RetryPolicy,
    abort: &CancellationToken,
    op_name: &str,
    mut op: F,
) -> (Result<T>, u32)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return (Ok(value), attempt),
            Err(e) if !e.is_retryable() => return (Err(e), attempt),
            Err(e) if attempt >= policy.max_attempts() || abort.is_cancelled() => {
                return (Err(e), attempt)
            }
            Err(e) => {
                let delay = policy.delay_for(attempt);
                warn!(
                    op = op_name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient store error, retrying"
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = abort.cancelled() => return (Err(e), attempt),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use docgraph_core::graph::GraphStore;
    use docgraph_extraction::CapitalizedWordExtractor;
    use docgraph_graph::InMemoryGraphStore;

    fn coordinator() -> (Arc<InMemoryGraphStore>, IngestionCoordinator) {
        let store = Arc::new(InMemoryGraphStore::new());
        let writer = Arc::new(GraphWriter::new(store.clone(), Duration::from_secs(5)));
        let coordinator = IngestionCoordinator::new(writer, Arc::new(CapitalizedWordExtractor::new()))
            .with_retry_policy(RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(2)));
        (store, coordinator)
    }

    #[tokio::test]
    async fn test_ingest_reference_sentence() {
        let (store, coordinator) = coordinator();
        let summary = coordinator
            .ingest("doc", "Alice met Bob near the Eiffel Tower.", 800, 100)
            .await
            .unwrap();

        assert!(summary.is_complete());
        assert_eq!(summary.chunks_total, 1);
        assert_eq!(summary.chunks_written, 1);
        assert_eq!(summary.distinct_entities_seen, 4);
        assert_eq!(store.chunk_indices("doc"), vec![0]);
        assert!(store.has_entity("Eiffel"));
    }

    #[tokio::test]
    async fn test_empty_document_writes_nothing() {
        let (store, coordinator) = coordinator();
        let summary = coordinator.ingest("doc", "", 800, 100).await.unwrap();

        assert!(summary.is_complete());
        assert_eq!(summary.chunks_total, 0);
        assert_eq!(summary.stale_chunks_removed, Some(0));
        assert!(store.statistics().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bad_chunking_rejected_before_writes() {
        let (store, coordinator) = coordinator();
        let err = coordinator
            .ingest("doc", "Alice met Bob.", 100, 100)
            .await
            .unwrap_err();

        assert!(matches!(err, DocGraphError::Config(_)));
        assert!(store.statistics().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_document_id_rejected() {
        let (_store, coordinator) = coordinator();
        let err = coordinator.ingest("  ", "Alice", 800, 100).await.unwrap_err();
        assert!(matches!(err, DocGraphError::Config(_)));
    }

    #[tokio::test]
    async fn test_extraction_failure_skips_chunk() {
        let (store, coordinator) = coordinator();
        let text = format!("{}{}", "Alpha ".repeat(10), "Bad\0Chunk");
        let summary = coordinator.ingest("doc", &text, 60, 0).await.unwrap();

        assert_eq!(summary.chunks_total, 2);
        assert_eq!(summary.chunks_written, 1);
        assert_eq!(summary.chunks_failed, 1);
        assert_eq!(summary.failures[0].chunk_index, 1);
        assert_eq!(summary.failures[0].attempts, 0);
        assert_eq!(summary.outcome, IngestionOutcome::Partial { failed: 1 });
        assert_eq!(store.chunk_indices("doc"), vec![0]);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_policy() {
        let abort = CancellationToken::new();
        let policy = RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(1));
        let mut calls = 0;
        let (result, attempts) = retry_store_op(&policy, &abort, "test", || {
            calls += 1;
            async { Err::<(), _>(DocGraphError::StoreTransient("down".into())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts, 3);
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_retry_does_not_repeat_fatal_errors() {
        let abort = CancellationToken::new();
        let policy = RetryPolicy::new(5, Duration::from_millis(1), Duration::from_millis(1));
        let (result, attempts) = retry_store_op(&policy, &abort, "test", || async {
            Err::<(), _>(DocGraphError::StoreFatal("unauthorized".into()))
        })
        .await;

        assert!(matches!(result, Err(DocGraphError::StoreFatal(_))));
        assert_eq!(attempts, 1);
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_error() {
        let abort = CancellationToken::new();
        let policy = RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(1));
        let mut calls = 0;
        let (result, attempts) = retry_store_op(&policy, &abort, "test", || {
            calls += 1;
            let ok = calls > 1;
            async move {
                if ok {
                    Ok(7)
                } else {
                    Err(DocGraphError::StoreTransient("blip".into()))
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(attempts, 2);
    }

    #[tokio::test]
    async fn test_zero_concurrency_rejected() {
        let (_, rejected) = coordinator();
        let err = rejected.with_max_concurrency(0).err().unwrap();
        assert!(matches!(err, DocGraphError::Config(_)));

        let (_, accepted) = coordinator();
        assert!(accepted.with_max_concurrency(1).is_ok());
    }

    #[tokio::test]
    async fn test_document_lock_released_after_run() {
        let (_store, coordinator) = coordinator();
        coordinator.ingest("doc", "Alice met Bob.", 800, 100).await.unwrap();
        coordinator.ingest("doc", "", 800, 100).await.unwrap();
        assert!(coordinator.document_locks.is_empty());
    }
}
