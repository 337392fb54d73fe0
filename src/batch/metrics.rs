//! Process-wide engine metrics
//!
//! Counters are recorded at submission time (`total_batches`,
//! `total_operations`) and on completion (`successful_batches`,
//! `failed_batches`, running mean). The mean is incremental: only the
//! previous average and the success count are needed, so purging historical
//! batches never affects future reads.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Point-in-time view of engine metrics plus store occupancy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Batches ever submitted
    pub total_batches: u64,
    /// Batches finalized as completed
    pub successful_batches: u64,
    /// Batches finalized as failed
    pub failed_batches: u64,
    /// Operations ever submitted
    pub total_operations: u64,
    /// Running mean execution time of successful batches, in milliseconds
    pub average_execution_time_ms: f64,
    /// Batches currently in the pending store
    pub pending_batches: usize,
    /// Batches currently in the executing store
    pub executing_batches: usize,
    /// Batches retained in the completed store
    pub completed_batches: usize,
}

#[derive(Debug, Default)]
struct Counters {
    total_batches: u64,
    successful_batches: u64,
    failed_batches: u64,
    total_operations: u64,
    average_execution_time_ms: f64,
}

impl Counters {
    fn record_submission(&mut self, operation_count: usize) {
        self.total_batches += 1;
        self.total_operations += operation_count as u64;
    }

    /// Incremental mean: `newAvg = (oldAvg * (n - 1) + duration) / n`
    fn record_success(&mut self, duration: Duration) {
        self.successful_batches += 1;
        let n = self.successful_batches as f64;
        let millis = duration.as_secs_f64() * 1000.0;
        self.average_execution_time_ms =
            (self.average_execution_time_ms * (n - 1.0) + millis) / n;
    }

    fn record_failure(&mut self) {
        self.failed_batches += 1;
    }
}

/// Shared mutable metrics state.
///
/// Updates must be atomic with respect to interleaved batch completions on a
/// multi-threaded runtime, so everything sits behind one mutex.
#[derive(Debug, Default)]
pub(crate) struct Metrics {
    inner: Mutex<Counters>,
}

impl Metrics {
    pub(crate) fn record_submission(&self, operation_count: usize) {
        self.inner.lock().record_submission(operation_count);
    }

    pub(crate) fn record_success(&self, duration: Duration) {
        self.inner.lock().record_success(duration);
    }

    pub(crate) fn record_failure(&self) {
        self.inner.lock().record_failure();
    }

    pub(crate) fn snapshot(
        &self,
        pending_batches: usize,
        executing_batches: usize,
        completed_batches: usize,
    ) -> MetricsSnapshot {
        let inner = self.inner.lock();
        MetricsSnapshot {
            total_batches: inner.total_batches,
            successful_batches: inner.successful_batches,
            failed_batches: inner.failed_batches,
            total_operations: inner.total_operations,
            average_execution_time_ms: inner.average_execution_time_ms,
            pending_batches,
            executing_batches,
            completed_batches,
        }
    }
}
