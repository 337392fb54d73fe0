//! Typed engine events
//!
//! Every lifecycle transition the engine reports is a variant of
//! [`EngineEvent`], so subscribers pattern-match exhaustively instead of
//! dispatching on string keys. Fan-out uses a broadcast channel: emission
//! never blocks and never fails the engine, and a subscriber that falls
//! behind only lags its own receiver.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::trace;

use crate::operation::{OperationOutcome, OperationSpec};

/// Default broadcast capacity for the event bus
const DEFAULT_EVENT_CAPACITY: usize = 1000;

/// Events emitted by the engine as batches, operations, transactions and
/// pipelines progress through their lifecycles.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A batch finished successfully (possibly with partial operation
    /// failures when `continue_on_error` allowed them)
    BatchCompleted {
        /// Id of the completed batch
        batch_id: String,
        /// Wall time spent executing
        duration: Duration,
        /// Total operations in the batch
        operation_count: usize,
        /// Operations that individually succeeded
        success_count: usize,
    },
    /// A batch was finalized as failed
    BatchFailed {
        /// Id of the failed batch
        batch_id: String,
        /// Terminal error message
        error: String,
        /// Wall time spent before failing
        duration: Duration,
    },
    /// A single operation's executor returned a result
    OperationSuccess {
        /// Operation id
        id: String,
        /// Time spent in the executor
        duration: Duration,
    },
    /// A single operation's executor rejected
    OperationFailed {
        /// Operation id
        id: String,
        /// Executor-reported failure
        error: String,
        /// Time spent in the executor
        duration: Duration,
    },
    /// A transactional batch committed every operation
    TransactionCommitted {
        /// Id of the committed batch
        batch_id: String,
    },
    /// A transactional batch failed and compensation is about to run
    TransactionRollback {
        /// Id of the rolling-back batch
        batch_id: String,
        /// The triggering operation failure
        error: String,
        /// How many operations had already committed
        completed_operations: usize,
    },
    /// One compensation operation succeeded
    RollbackSuccess {
        /// The rollback descriptor that ran
        operation: OperationSpec,
    },
    /// One compensation operation failed (the drain continues regardless)
    RollbackFailed {
        /// The rollback descriptor that ran
        operation: OperationSpec,
        /// Why it failed
        error: String,
    },
    /// A pipeline started
    PipelineStart {
        /// Pipeline id
        pipeline_id: String,
        /// Total number of stages
        stages: usize,
    },
    /// A pipeline stage completed
    PipelineStage {
        /// Pipeline id
        pipeline_id: String,
        /// Zero-based index of the completed stage
        stage: usize,
        /// Total number of stages
        total_stages: usize,
    },
    /// A pipeline ran every stage to completion
    PipelineComplete {
        /// Pipeline id
        pipeline_id: String,
        /// Number of stages executed
        stages: usize,
        /// Final stage's results
        results: Vec<OperationOutcome>,
    },
    /// A pipeline aborted at a stage
    PipelineFailed {
        /// Pipeline id
        pipeline_id: String,
        /// Zero-based index of the failing stage
        stage: usize,
        /// Terminal error message
        error: String,
    },
}

/// Broadcast fan-out for [`EngineEvent`]s.
///
/// Cloning the bus clones the sender; all clones feed the same subscribers.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    /// Create a bus with the default capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    /// Create a bus retaining up to `capacity` undelivered events per
    /// subscriber before old ones are dropped as lagged
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to all events emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    /// Subscribe as an async stream
    pub fn stream(&self) -> BroadcastStream<EngineEvent> {
        BroadcastStream::new(self.sender.subscribe())
    }

    /// Emit an event. A bus with no subscribers drops the event silently.
    pub(crate) fn emit(&self, event: EngineEvent) {
        trace!(?event, "emitting engine event");
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
