//! # Batchflow
//!
//! A batch and pipeline execution engine for Rust. Batchflow accepts groups of
//! operations and runs them under one of three strategies — sequential,
//! bounded-parallel, or transactional with compensation — while tracking each
//! batch through its lifecycle and publishing progress over a typed event
//! stream.
//!
//! ## Overview
//!
//! Batchflow is strategy-oriented: callers describe *what* to run as a list of
//! `{tool, params}` operation descriptors and plug in an
//! [`executor::OperationExecutor`] that knows *how* to run a single operation.
//! The engine owns everything in between: identity assignment, lifecycle
//! stores, concurrency windows, rollback compensation, metrics, and event
//! emission.
//!
//! ## Quick Start
//!
//! ```rust
//! use batchflow::batch::{BatchManager, BatchOptions, EngineConfig};
//! use batchflow::executor::FnExecutor;
//! use batchflow::operation::OperationSpec;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn example() -> batchflow::Result<()> {
//! // An executor that echoes the tool it was asked to run
//! let executor = Arc::new(FnExecutor::new(|op: &OperationSpec| {
//!     let tool = op.tool.clone();
//!     async move { Ok(json!({ "ran": tool })) }
//! }));
//!
//! let manager = BatchManager::new(executor, EngineConfig::default());
//!
//! let outcome = manager
//!     .execute_batch(
//!         vec![OperationSpec::new("noop", json!({}))],
//!         BatchOptions::default(),
//!     )
//!     .await?;
//!
//! assert_eq!(outcome.results.len(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Key Features
//!
//! - **Three execution strategies**: strict sequential, bounded-parallel with
//!   a sliding concurrency window, and transactional all-or-nothing with a
//!   LIFO compensation stack
//! - **Lifecycle tracking**: every batch moves pending → executing →
//!   completed/failed through exclusive stores, queryable at any time
//! - **Typed events**: each lifecycle transition is a variant of a single
//!   event enum, fanned out over a broadcast channel
//! - **Pipelines**: chain batches so each stage's results feed the next
//!   stage's operation list
//! - **Merge optimization**: coalesce equivalent operations before execution
//!
//! ## Modules
//!
//! - [`operation`]: operation descriptors, statuses and outcomes
//! - [`executor`]: the pluggable operation executor seam
//! - [`events`]: the typed event bus
//! - [`batch`]: the batch manager, strategies, merge optimizer and metrics
//! - [`pipeline`]: multi-stage pipeline execution

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

use std::time::Duration;
use thiserror::Error;

/// Result type for batchflow operations
pub type Result<T> = std::result::Result<T, BatchflowError>;

/// Main error type for batchflow operations
#[derive(Error, Debug)]
pub enum BatchflowError {
    /// An individual operation's executor rejected or threw
    #[error("Operation {id} failed: {message}")]
    Operation {
        /// Engine-assigned id of the failing operation
        id: String,
        /// Executor-reported failure message
        message: String,
    },

    /// A strategy stopped processing further operations; wraps the trigger
    #[error("Batch aborted after operation {id} failed")]
    BatchAbort {
        /// Id of the operation whose failure triggered the abort
        id: String,
        /// The triggering operation error
        #[source]
        source: Box<BatchflowError>,
    },

    /// Batch exceeded its configured execution timeout
    #[error("Batch {batch_id} exceeded timeout of {limit:?}")]
    Timeout {
        /// Id of the batch that timed out
        batch_id: String,
        /// The configured limit that was exceeded
        limit: Duration,
    },

    /// A batch was submitted with no operations
    #[error("Batch contains no operations")]
    EmptyBatch,

    /// A batch was submitted with more operations than the configured cap
    #[error("Batch size {size} exceeds configured maximum {limit}")]
    BatchTooLarge {
        /// Number of operations submitted
        size: usize,
        /// Configured `max_batch_size`
        limit: usize,
    },

    /// Pipeline-level failure with stage context
    #[error("Pipeline error: {0}")]
    Pipeline(String),

    /// Generic failure reported by an executor implementation
    #[error("Executor error: {0}")]
    Executor(String),

    /// Join error from async tasks
    #[error("Async join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Operation descriptors, statuses and per-operation outcomes
pub mod operation;

/// The pluggable operation executor seam
pub mod executor;

/// Typed engine events and the broadcast event bus
pub mod events;

/// Batch manager, execution strategies, merge optimizer and metrics
pub mod batch;

/// Multi-stage pipeline execution
pub mod pipeline;
