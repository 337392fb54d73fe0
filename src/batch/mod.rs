//! Batch execution
//!
//! The [`BatchManager`] accepts operation lists, tracks each batch through
//! pending → executing → completed/failed, and dispatches to exactly one of
//! the three execution strategies. [`merge_operations`] is the opt-in
//! pre-execution optimizer.

pub mod manager;
pub mod merge;
pub(crate) mod metrics;
pub(crate) mod strategies;
pub mod types;

pub use manager::BatchManager;
pub use merge::merge_operations;
pub use metrics::MetricsSnapshot;
pub use types::{Batch, BatchOptions, BatchOutcome, BatchStatus, EngineConfig, ResolvedBatchOptions};
