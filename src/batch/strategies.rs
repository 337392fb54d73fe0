//! Execution strategies
//!
//! Exactly one strategy runs per batch: strict sequential, transactional
//! with a LIFO compensation stack, or bounded-parallel over a sliding
//! concurrency window. Strategies mutate operation statuses in place and
//! append settled outcomes to the shared accumulator, so a batch that
//! aborts mid-way still finalizes with every outcome gathered so far.

use std::sync::Arc;
use std::time::Instant;

use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::events::{EngineEvent, EventBus};
use crate::executor::OperationExecutor;
use crate::operation::{Operation, OperationOutcome, OperationSpec};
use crate::{BatchflowError, Result};

/// Run operations strictly in input order, awaiting each before the next.
pub(crate) async fn run_sequential(
    executor: &Arc<dyn OperationExecutor>,
    events: &EventBus,
    operations: &mut [Operation],
    continue_on_error: bool,
    outcomes: &mut Vec<OperationOutcome>,
) -> Result<()> {
    for op in operations.iter_mut() {
        let started = Instant::now();
        let result = executor.execute(&op.as_spec()).await;
        let duration = started.elapsed();

        match result {
            Ok(value) => {
                op.mark_success(value);
                debug!(id = %op.id, duration_ms = duration.as_millis(), "operation succeeded");
                events.emit(EngineEvent::OperationSuccess {
                    id: op.id.clone(),
                    duration,
                });
                outcomes.push(OperationOutcome::from_operation(op, duration));
            }
            Err(err) => {
                let message = err.to_string();
                op.mark_failed(message.clone());
                events.emit(EngineEvent::OperationFailed {
                    id: op.id.clone(),
                    error: message.clone(),
                    duration,
                });
                outcomes.push(OperationOutcome::from_operation(op, duration));

                if !continue_on_error {
                    // Remaining operations are never attempted and stay pending
                    return Err(abort_error(&op.id, message));
                }
                warn!(id = %op.id, error = %message, "operation failed, continuing");
            }
        }
    }

    Ok(())
}

/// Run operations in order as an all-or-nothing transaction.
///
/// Each success pushes its rollback descriptor (if any) onto the
/// compensation stack; a failure drains the stack most-recently-succeeded
/// first, attempting every registered rollback regardless of earlier
/// rollback outcomes, then re-throws the triggering error.
pub(crate) async fn run_transactional(
    executor: &Arc<dyn OperationExecutor>,
    events: &EventBus,
    batch_id: &str,
    operations: &mut [Operation],
    outcomes: &mut Vec<OperationOutcome>,
) -> Result<()> {
    let mut compensation: Vec<OperationSpec> = Vec::new();
    let mut committed = 0usize;

    for op in operations.iter_mut() {
        let started = Instant::now();
        let result = executor.execute(&op.as_spec()).await;
        let duration = started.elapsed();

        match result {
            Ok(value) => {
                op.mark_success(value);
                committed += 1;
                if let Some(rollback) = &op.rollback {
                    compensation.push((**rollback).clone());
                }
                events.emit(EngineEvent::OperationSuccess {
                    id: op.id.clone(),
                    duration,
                });
                outcomes.push(OperationOutcome::from_operation(op, duration));
            }
            Err(err) => {
                let message = err.to_string();
                op.mark_failed(message.clone());
                events.emit(EngineEvent::OperationFailed {
                    id: op.id.clone(),
                    error: message.clone(),
                    duration,
                });
                outcomes.push(OperationOutcome::from_operation(op, duration));

                warn!(
                    batch_id,
                    id = %op.id,
                    committed,
                    "transaction failed, rolling back"
                );
                events.emit(EngineEvent::TransactionRollback {
                    batch_id: batch_id.to_string(),
                    error: message.clone(),
                    completed_operations: committed,
                });

                drain_compensation(executor, events, compensation).await;

                return Err(abort_error(&op.id, message));
            }
        }
    }

    debug!(batch_id, committed, "transaction committed");
    events.emit(EngineEvent::TransactionCommitted {
        batch_id: batch_id.to_string(),
    });
    Ok(())
}

/// Drain the compensation stack LIFO relative to original execution order.
/// Rollback failures are reported via events and never halt the drain.
async fn drain_compensation(
    executor: &Arc<dyn OperationExecutor>,
    events: &EventBus,
    mut compensation: Vec<OperationSpec>,
) {
    while let Some(rollback) = compensation.pop() {
        match executor.execute(&rollback).await {
            Ok(_) => {
                debug!(tool = %rollback.tool, "rollback succeeded");
                events.emit(EngineEvent::RollbackSuccess {
                    operation: rollback,
                });
            }
            Err(err) => {
                error!(tool = %rollback.tool, error = %err, "rollback failed");
                events.emit(EngineEvent::RollbackFailed {
                    operation: rollback,
                    error: err.to_string(),
                });
            }
        }
    }
}

/// Run operations under a sliding window of at most `parallel_limit`
/// concurrently in-flight operations.
///
/// The window refills after *each* settled operation (wait-for-first, not
/// wait-for-all-N), so independent work is never serialized behind the
/// slowest operation. Operations run as detached tasks: aborting on a
/// failure drops the remaining join handles but the tasks already in
/// flight run to completion and their results are discarded.
pub(crate) async fn run_parallel(
    executor: &Arc<dyn OperationExecutor>,
    events: &EventBus,
    operations: &mut [Operation],
    continue_on_error: bool,
    parallel_limit: usize,
    outcomes: &mut Vec<OperationOutcome>,
) -> Result<()> {
    if operations.is_empty() {
        return Ok(());
    }

    let window = parallel_limit.clamp(1, operations.len());
    let mut in_flight: FuturesUnordered<JoinHandle<(usize, std::time::Duration, Result<Value>)>> =
        FuturesUnordered::new();
    let mut next = 0usize;
    let mut slots: Vec<Option<OperationOutcome>> = vec![None; operations.len()];
    let mut verdict: Result<()> = Ok(());

    loop {
        while in_flight.len() < window && next < operations.len() {
            let index = next;
            next += 1;
            let spec = operations[index].as_spec();
            let executor = Arc::clone(executor);
            in_flight.push(tokio::spawn(async move {
                let started = Instant::now();
                let result = executor.execute(&spec).await;
                (index, started.elapsed(), result)
            }));
        }

        let Some(joined) = in_flight.next().await else {
            break;
        };

        let (index, duration, result) = match joined {
            Ok(settled) => settled,
            Err(join_err) => {
                // A panicked task loses its index; with continue_on_error the
                // operation stays pending, otherwise the batch aborts.
                error!(error = %join_err, "operation task panicked");
                if !continue_on_error {
                    verdict = Err(BatchflowError::Join(join_err));
                    break;
                }
                continue;
            }
        };

        let op = &mut operations[index];
        match result {
            Ok(value) => {
                op.mark_success(value);
                events.emit(EngineEvent::OperationSuccess {
                    id: op.id.clone(),
                    duration,
                });
                slots[index] = Some(OperationOutcome::from_operation(op, duration));
            }
            Err(err) => {
                let message = err.to_string();
                op.mark_failed(message.clone());
                events.emit(EngineEvent::OperationFailed {
                    id: op.id.clone(),
                    error: message.clone(),
                    duration,
                });
                slots[index] = Some(OperationOutcome::from_operation(op, duration));

                if !continue_on_error {
                    warn!(id = %op.id, "aborting batch, in-flight operations left to settle");
                    verdict = Err(abort_error(&op.id, message));
                    break;
                }
            }
        }
    }

    outcomes.extend(slots.into_iter().flatten());
    verdict
}

fn abort_error(id: &str, message: String) -> BatchflowError {
    BatchflowError::BatchAbort {
        id: id.to_string(),
        source: Box::new(BatchflowError::Operation {
            id: id.to_string(),
            message,
        }),
    }
}
