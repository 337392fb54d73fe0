//! Batch manager: submission, lifecycle stores, dispatch and finalization

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::batch::metrics::Metrics;
use crate::batch::strategies;
use crate::batch::types::{Batch, BatchOptions, BatchOutcome, BatchStatus, EngineConfig};
use crate::batch::MetricsSnapshot;
use crate::events::{EngineEvent, EventBus};
use crate::executor::OperationExecutor;
use crate::operation::{Operation, OperationSpec, OperationStatus};
use crate::{BatchflowError, Result};

/// Owns all batch and metrics state and drives every submission through
/// exactly one execution strategy.
///
/// A batch id lives in exactly one of the pending/executing/completed
/// stores at any time; moves between stores are remove-then-insert, so a
/// batch is never visible in two stores. Multiple batches may execute
/// concurrently against the same manager; each only touches its own entry.
pub struct BatchManager {
    config: EngineConfig,
    executor: Arc<dyn OperationExecutor>,
    pending: DashMap<String, Batch>,
    executing: DashMap<String, Batch>,
    completed: DashMap<String, Batch>,
    metrics: Metrics,
    events: EventBus,
}

impl BatchManager {
    /// Create a manager around an injected operation executor
    pub fn new(executor: Arc<dyn OperationExecutor>, config: EngineConfig) -> Self {
        Self {
            config,
            executor,
            pending: DashMap::new(),
            executing: DashMap::new(),
            completed: DashMap::new(),
            metrics: Metrics::default(),
            events: EventBus::new(),
        }
    }

    /// Subscribe to engine events emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Subscribe to engine events as an async stream
    pub fn event_stream(&self) -> BroadcastStream<EngineEvent> {
        self.events.stream()
    }

    pub(crate) fn events(&self) -> &EventBus {
        &self.events
    }

    /// Submit a batch of operations and execute it under the strategy
    /// selected by `options` (resolved against the manager defaults).
    ///
    /// On success the batch lands in the completed store with status
    /// `Completed` and a `BatchCompleted` event fires. On failure the batch
    /// is finalized as `Failed` *before* the error is returned, so partial
    /// results stay queryable through [`Self::batch_status`].
    #[instrument(skip(self, operations, options), fields(operation_count = operations.len()))]
    pub async fn execute_batch(
        &self,
        operations: Vec<OperationSpec>,
        options: BatchOptions,
    ) -> Result<BatchOutcome> {
        if operations.is_empty() {
            return Err(BatchflowError::EmptyBatch);
        }
        if operations.len() > self.config.max_batch_size {
            return Err(BatchflowError::BatchTooLarge {
                size: operations.len(),
                limit: self.config.max_batch_size,
            });
        }

        let batch_id = generate_batch_id();
        let resolved = options.resolve(&self.config);
        let stamped: Vec<Operation> = operations
            .into_iter()
            .enumerate()
            .map(|(index, spec)| Operation::from_spec(spec, &batch_id, index))
            .collect();

        // Counters move at submission, before the outcome is known
        self.metrics.record_submission(stamped.len());

        let mut batch = Batch {
            id: batch_id.clone(),
            operations: stamped,
            options: resolved.clone(),
            status: BatchStatus::Pending,
            started_at: None,
            ended_at: None,
            error: None,
            results: Vec::new(),
        };
        self.pending.insert(batch_id.clone(), batch.clone());

        info!(
            batch_id = %batch_id,
            transactional = resolved.transactional,
            parallel = resolved.parallel,
            continue_on_error = resolved.continue_on_error,
            "batch submitted"
        );

        batch.status = BatchStatus::Executing;
        batch.started_at = Some(Utc::now());
        self.pending.remove(&batch_id);
        self.executing.insert(batch_id.clone(), batch.clone());

        let started = Instant::now();
        let mut outcomes = Vec::with_capacity(batch.operations.len());

        let strategy = async {
            if resolved.parallel {
                strategies::run_parallel(
                    &self.executor,
                    &self.events,
                    &mut batch.operations,
                    resolved.continue_on_error,
                    resolved.parallel_limit,
                    &mut outcomes,
                )
                .await
            } else if resolved.transactional {
                strategies::run_transactional(
                    &self.executor,
                    &self.events,
                    &batch_id,
                    &mut batch.operations,
                    &mut outcomes,
                )
                .await
            } else {
                strategies::run_sequential(
                    &self.executor,
                    &self.events,
                    &mut batch.operations,
                    resolved.continue_on_error,
                    &mut outcomes,
                )
                .await
            }
        };

        let verdict = match self.config.batch_timeout {
            Some(limit) => match tokio::time::timeout(limit, strategy).await {
                Ok(result) => result,
                Err(_) => Err(BatchflowError::Timeout {
                    batch_id: batch_id.clone(),
                    limit,
                }),
            },
            None => strategy.await,
        };

        let duration = started.elapsed();
        batch.ended_at = Some(Utc::now());
        batch.results = outcomes;

        match verdict {
            Ok(()) => {
                batch.status = BatchStatus::Completed;
                let operation_count = batch.operations.len();
                let success_count = batch
                    .operations
                    .iter()
                    .filter(|op| op.status == OperationStatus::Success)
                    .count();
                let results = batch.results.clone();

                self.metrics.record_success(duration);
                self.executing.remove(&batch_id);
                self.completed.insert(batch_id.clone(), batch);

                info!(
                    batch_id = %batch_id,
                    duration_ms = duration.as_millis(),
                    operation_count,
                    success_count,
                    "batch completed"
                );
                self.events.emit(EngineEvent::BatchCompleted {
                    batch_id: batch_id.clone(),
                    duration,
                    operation_count,
                    success_count,
                });

                Ok(BatchOutcome {
                    batch_id,
                    status: BatchStatus::Completed,
                    results,
                    duration,
                    success_count,
                })
            }
            Err(err) => {
                let message = err.to_string();
                batch.status = BatchStatus::Failed;
                batch.error = Some(message.clone());

                self.metrics.record_failure();
                self.executing.remove(&batch_id);
                self.completed.insert(batch_id.clone(), batch);

                error!(
                    batch_id = %batch_id,
                    duration_ms = duration.as_millis(),
                    error = %message,
                    "batch failed"
                );
                self.events.emit(EngineEvent::BatchFailed {
                    batch_id,
                    error: message,
                    duration,
                });

                Err(err)
            }
        }
    }

    /// Look up a batch in whichever store currently holds it
    pub fn batch_status(&self, batch_id: &str) -> Option<Batch> {
        self.pending
            .get(batch_id)
            .or_else(|| self.executing.get(batch_id))
            .or_else(|| self.completed.get(batch_id))
            .map(|entry| entry.value().clone())
    }

    /// Snapshot of process-wide counters and store occupancy
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot(
            self.pending.len(),
            self.executing.len(),
            self.completed.len(),
        )
    }

    /// Purge completed/failed batches whose `ended_at` precedes
    /// `now - older_than`. Returns the number of batches removed. This is
    /// the only eviction mechanism; completed batches are otherwise
    /// retained indefinitely.
    pub fn clear_completed(&self, older_than: Duration) -> usize {
        let cutoff = match chrono::Duration::from_std(older_than)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age))
        {
            Some(cutoff) => cutoff,
            // older_than exceeds representable time, nothing can qualify
            None => return 0,
        };

        let before = self.completed.len();
        self.completed.retain(|_, batch| match batch.ended_at {
            Some(ended_at) => ended_at >= cutoff,
            None => true,
        });
        before - self.completed.len()
    }

    /// The manager-wide configuration this instance was built with
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

fn generate_batch_id() -> String {
    format!("batch-{}", Uuid::new_v4())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::FnExecutor;
    use serde_json::json;

    fn succeeding_manager() -> BatchManager {
        let executor = Arc::new(FnExecutor::new(|_op: &OperationSpec| async move {
            Ok(json!("ok"))
        }));
        BatchManager::new(executor, EngineConfig::default())
    }

    #[tokio::test]
    async fn test_empty_batch_rejected() {
        let manager = succeeding_manager();
        let err = manager
            .execute_batch(Vec::new(), BatchOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BatchflowError::EmptyBatch));
    }

    #[tokio::test]
    async fn test_oversized_batch_rejected_before_counters() {
        let executor = Arc::new(FnExecutor::new(|_op: &OperationSpec| async move {
            Ok(json!("ok"))
        }));
        let manager = BatchManager::new(executor, EngineConfig::default().with_max_batch_size(2));

        let specs = vec![
            OperationSpec::new("a", json!({})),
            OperationSpec::new("b", json!({})),
            OperationSpec::new("c", json!({})),
        ];
        let err = manager
            .execute_batch(specs, BatchOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, BatchflowError::BatchTooLarge { size: 3, limit: 2 }));
        assert_eq!(manager.metrics().total_batches, 0);
    }

    #[tokio::test]
    async fn test_operation_ids_derive_from_batch_id() {
        let manager = succeeding_manager();
        let outcome = manager
            .execute_batch(
                vec![
                    OperationSpec::new("a", json!({})),
                    OperationSpec::new("b", json!({})),
                ],
                BatchOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.results[0].id, format!("{}_op_0", outcome.batch_id));
        assert_eq!(outcome.results[1].id, format!("{}_op_1", outcome.batch_id));
    }

    #[tokio::test]
    async fn test_batch_timeout_enforced_when_configured() {
        let executor = Arc::new(FnExecutor::new(|_op: &OperationSpec| async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(json!("ok"))
        }));
        let manager = BatchManager::new(
            executor,
            EngineConfig::default().with_batch_timeout(Duration::from_millis(20)),
        );

        let err = manager
            .execute_batch(
                vec![OperationSpec::new("slow", json!({}))],
                BatchOptions::default(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, BatchflowError::Timeout { .. }));
        let metrics = manager.metrics();
        assert_eq!(metrics.failed_batches, 1);
    }

    #[tokio::test]
    async fn test_clear_completed_purges_old_batches() {
        let manager = succeeding_manager();
        manager
            .execute_batch(
                vec![OperationSpec::new("a", json!({}))],
                BatchOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(manager.metrics().completed_batches, 1);
        // Nothing is older than an hour yet
        assert_eq!(manager.clear_completed(Duration::from_secs(3600)), 0);
        // Everything is older than zero
        assert_eq!(manager.clear_completed(Duration::from_secs(0)), 1);
        assert_eq!(manager.metrics().completed_batches, 0);
    }
}
