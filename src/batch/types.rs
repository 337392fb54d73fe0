//! Batch records, submission options and engine configuration

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::operation::{Operation, OperationOutcome};

/// Status of a batch.
///
/// Transitions only ever move forward: pending → executing →
/// {completed | failed}. Terminal states are exclusive and final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    /// Submitted, not yet dispatched to a strategy
    Pending,
    /// A strategy is running its operations
    Executing,
    /// Finalized; includes batches with partial operation failures under
    /// `continue_on_error`
    Completed,
    /// Finalized with a terminal error
    Failed,
}

/// A submitted group of operations executed under one strategy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    /// Unique id, generated at submission time
    pub id: String,
    /// Ordered operations. Order is semantically meaningful for the
    /// sequential and transactional strategies.
    pub operations: Vec<Operation>,
    /// Options resolved against manager defaults and frozen for the
    /// batch's lifetime
    pub options: ResolvedBatchOptions,
    /// Lifecycle status
    pub status: BatchStatus,
    /// Wall-clock start of the executing state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// Wall-clock end of the executing state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    /// Terminal error message for failed batches
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Per-operation outcomes, populated at finalization
    pub results: Vec<OperationOutcome>,
}

/// Caller-side execution options. Unset fields fall back to the manager's
/// [`EngineConfig`] defaults at submission time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchOptions {
    /// Run as an all-or-nothing transaction with compensation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transactional: Option<bool>,
    /// Run under the bounded-parallel strategy. Takes precedence over
    /// `transactional` when both are set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel: Option<bool>,
    /// Capture operation failures as results instead of aborting
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continue_on_error: Option<bool>,
    /// Maximum concurrently in-flight operations for the parallel strategy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel_limit: Option<usize>,
}

impl BatchOptions {
    /// Request transactional execution
    pub fn transactional(mut self, value: bool) -> Self {
        self.transactional = Some(value);
        self
    }

    /// Request bounded-parallel execution
    pub fn parallel(mut self, value: bool) -> Self {
        self.parallel = Some(value);
        self
    }

    /// Continue past individual operation failures
    pub fn continue_on_error(mut self, value: bool) -> Self {
        self.continue_on_error = Some(value);
        self
    }

    /// Override the concurrency window for this batch
    pub fn parallel_limit(mut self, limit: usize) -> Self {
        self.parallel_limit = Some(limit);
        self
    }

    /// Resolve unset fields against the manager configuration
    pub fn resolve(&self, config: &EngineConfig) -> ResolvedBatchOptions {
        ResolvedBatchOptions {
            transactional: self.transactional.unwrap_or(config.enable_transactions),
            parallel: self.parallel.unwrap_or(config.parallel_by_default),
            continue_on_error: self.continue_on_error.unwrap_or(config.continue_on_error),
            parallel_limit: self.parallel_limit.unwrap_or(config.parallel_limit).max(1),
        }
    }
}

/// Options after resolution against manager defaults, frozen on the batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedBatchOptions {
    /// All-or-nothing with compensation
    pub transactional: bool,
    /// Bounded-parallel strategy selected
    pub parallel: bool,
    /// Capture failures as results instead of aborting
    pub continue_on_error: bool,
    /// Concurrency window for the parallel strategy
    pub parallel_limit: usize,
}

/// What `execute_batch` returns on success
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOutcome {
    /// Id of the executed batch
    pub batch_id: String,
    /// Terminal status (`Completed` for every returned outcome)
    pub status: BatchStatus,
    /// Per-operation outcomes
    pub results: Vec<OperationOutcome>,
    /// Wall time spent executing
    pub duration: Duration,
    /// Operations that individually succeeded
    pub success_count: usize,
}

/// Engine-wide configuration, resolved once at manager construction
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Hard cap on operations per batch; oversized submissions are
    /// rejected before any counter is touched
    pub max_batch_size: usize,
    /// Whole-batch execution timeout. `None` leaves batches unbounded.
    pub batch_timeout: Option<Duration>,
    /// Default for `BatchOptions::transactional`
    pub enable_transactions: bool,
    /// Declared for configuration-surface compatibility; retry-with-backoff
    /// is out of scope and this field is never read by the engine
    pub retry_attempts: u32,
    /// Default concurrency window for the parallel strategy
    pub parallel_limit: usize,
    /// Default for `BatchOptions::continue_on_error`
    pub continue_on_error: bool,
    /// Default for `BatchOptions::parallel`
    pub parallel_by_default: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 100,
            batch_timeout: None,
            enable_transactions: false,
            retry_attempts: 0,
            parallel_limit: num_cpus::get(),
            continue_on_error: false,
            parallel_by_default: false,
        }
    }
}

impl EngineConfig {
    /// Set the per-batch operation cap
    pub fn with_max_batch_size(mut self, limit: usize) -> Self {
        self.max_batch_size = limit.max(1);
        self
    }

    /// Enforce a whole-batch execution timeout
    pub fn with_batch_timeout(mut self, timeout: Duration) -> Self {
        self.batch_timeout = Some(timeout);
        self
    }

    /// Set the default concurrency window
    pub fn with_parallel_limit(mut self, limit: usize) -> Self {
        self.parallel_limit = limit.max(1);
        self
    }

    /// Default new batches to transactional execution
    pub fn with_transactions_enabled(mut self, enabled: bool) -> Self {
        self.enable_transactions = enabled;
        self
    }

    /// Default new batches to continue past operation failures
    pub fn with_continue_on_error(mut self, enabled: bool) -> Self {
        self.continue_on_error = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_resolve_against_defaults() {
        let config = EngineConfig::default()
            .with_transactions_enabled(true)
            .with_parallel_limit(3);

        let resolved = BatchOptions::default().resolve(&config);
        assert!(resolved.transactional);
        assert!(!resolved.parallel);
        assert!(!resolved.continue_on_error);
        assert_eq!(resolved.parallel_limit, 3);
    }

    #[test]
    fn test_explicit_options_override_defaults() {
        let config = EngineConfig::default().with_transactions_enabled(true);

        let resolved = BatchOptions::default()
            .transactional(false)
            .parallel(true)
            .parallel_limit(7)
            .resolve(&config);

        assert!(!resolved.transactional);
        assert!(resolved.parallel);
        assert_eq!(resolved.parallel_limit, 7);
    }

    #[test]
    fn test_parallel_limit_never_zero() {
        let resolved = BatchOptions::default()
            .parallel_limit(0)
            .resolve(&EngineConfig::default());
        assert_eq!(resolved.parallel_limit, 1);
    }
}
