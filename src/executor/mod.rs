//! The operation executor seam
//!
//! The engine is strategy-agnostic about what an operation *does*: every side
//! effect goes through [`OperationExecutor`]. There is no default
//! implementation — callers inject one, and [`FnExecutor`] adapts a plain
//! async closure for the common case (and for tests).

use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;

use crate::operation::OperationSpec;
use crate::Result;

/// Executes a single operation and returns its result.
///
/// Both forward operations and rollback descriptors are dispatched through
/// the same `execute` call; implementations see only `{tool, params}` and
/// should not assume anything about batching or ordering.
#[async_trait]
pub trait OperationExecutor: Send + Sync {
    /// Perform the operation's side effect and return its result.
    ///
    /// Errors are recorded as the operation's failure; use
    /// [`crate::BatchflowError::Executor`] for implementation-level failures.
    async fn execute(&self, operation: &OperationSpec) -> Result<Value>;
}

/// Adapter turning an async closure into an [`OperationExecutor`].
///
/// The closure receives the operation by reference and must return a future
/// that owns its captures (clone what you need out of the operation before
/// the `async move` block).
pub struct FnExecutor<F> {
    f: F,
}

impl<F> FnExecutor<F> {
    /// Wrap an async closure
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> OperationExecutor for FnExecutor<F>
where
    F: Fn(&OperationSpec) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    async fn execute(&self, operation: &OperationSpec) -> Result<Value> {
        (self.f)(operation).await
    }
}
