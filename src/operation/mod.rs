//! Operation data model
//!
//! Operations come in two shapes: the [`OperationSpec`] a caller submits
//! (tool + params, optionally a rollback descriptor) and the [`Operation`]
//! the engine owns once a batch has stamped identities onto it.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Caller-side operation descriptor, pre-submission.
///
/// `id` is an optional hint used for merge provenance; the engine always
/// assigns the canonical id when the batch is submitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationSpec {
    /// Optional caller-supplied id, overwritten at submission
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Which external capability to invoke
    pub tool: String,
    /// Opaque payload passed verbatim to the executor
    pub params: Value,
    /// Compensation descriptor to invoke if the batch must be reversed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback: Option<Box<OperationSpec>>,
    /// Additional metadata (merge provenance lands here)
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

impl OperationSpec {
    /// Create a spec for `tool` with the given params
    pub fn new(tool: impl Into<String>, params: Value) -> Self {
        Self {
            id: None,
            tool: tool.into(),
            params,
            rollback: None,
            metadata: HashMap::new(),
        }
    }

    /// Set a caller-supplied id hint
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Attach a rollback descriptor
    pub fn with_rollback(mut self, rollback: OperationSpec) -> Self {
        self.rollback = Some(Box::new(rollback));
        self
    }
}

/// Status of a single operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    /// Not yet attempted
    Pending,
    /// Executor returned a result
    Success,
    /// Executor rejected or threw
    Failed,
}

/// An engine-owned operation inside a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    /// Engine-assigned id, `<batchId>_op_<index>`, immutable
    pub id: String,
    /// Which external capability to invoke
    pub tool: String,
    /// Opaque payload passed verbatim to the executor
    pub params: Value,
    /// Compensation descriptor, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback: Option<Box<OperationSpec>>,
    /// Metadata carried over from the spec
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
    /// Current status, mutated in place as execution proceeds
    pub status: OperationStatus,
    /// Executor result, populated on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Failure message, populated on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Operation {
    /// Stamp a spec with its engine identity. Any caller-supplied id hint
    /// is discarded here.
    pub fn from_spec(spec: OperationSpec, batch_id: &str, index: usize) -> Self {
        Self {
            id: format!("{}_op_{}", batch_id, index),
            tool: spec.tool,
            params: spec.params,
            rollback: spec.rollback,
            metadata: spec.metadata,
            status: OperationStatus::Pending,
            result: None,
            error: None,
        }
    }

    /// Executor-facing view of this operation
    pub fn as_spec(&self) -> OperationSpec {
        OperationSpec {
            id: Some(self.id.clone()),
            tool: self.tool.clone(),
            params: self.params.clone(),
            rollback: None,
            metadata: self.metadata.clone(),
        }
    }

    /// Mark success and record the executor result
    pub(crate) fn mark_success(&mut self, result: Value) {
        self.status = OperationStatus::Success;
        self.result = Some(result);
        self.error = None;
    }

    /// Mark failure and record the error message
    pub(crate) fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = OperationStatus::Failed;
        self.result = None;
        self.error = Some(error.into());
    }
}

/// Per-operation outcome aggregated into a batch's results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationOutcome {
    /// Id of the operation this outcome belongs to
    pub id: String,
    /// Terminal status (`Success` or `Failed`)
    pub status: OperationStatus,
    /// Executor result, if successful
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Failure message, if failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall time the operation spent in the executor
    pub duration: Duration,
}

impl OperationOutcome {
    /// Build an outcome from a settled operation
    pub(crate) fn from_operation(op: &Operation, duration: Duration) -> Self {
        Self {
            id: op.id.clone(),
            status: op.status,
            result: op.result.clone(),
            error: op.error.clone(),
            duration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_spec_stamping() {
        let spec = OperationSpec::new("file_write", json!({"path": "/tmp/a"})).with_id("hint");
        let op = Operation::from_spec(spec, "batch-7", 3);

        assert_eq!(op.id, "batch-7_op_3");
        assert_eq!(op.tool, "file_write");
        assert_eq!(op.status, OperationStatus::Pending);
        assert!(op.result.is_none());
        assert!(op.error.is_none());
    }

    #[test]
    fn test_result_and_error_are_exclusive() {
        let spec = OperationSpec::new("noop", json!({}));
        let mut op = Operation::from_spec(spec, "batch-1", 0);

        op.mark_success(json!(42));
        assert_eq!(op.status, OperationStatus::Success);
        assert!(op.error.is_none());

        op.mark_failed("late failure");
        assert_eq!(op.status, OperationStatus::Failed);
        assert!(op.result.is_none());
        assert_eq!(op.error.as_deref(), Some("late failure"));
    }

    #[test]
    fn test_rollback_round_trip() {
        let spec = OperationSpec::new("create", json!({"type": "dir"}))
            .with_rollback(OperationSpec::new("delete", json!({"type": "dir"})));
        let op = Operation::from_spec(spec, "batch-2", 0);

        let rollback = op.rollback.expect("rollback should survive stamping");
        assert_eq!(rollback.tool, "delete");
    }
}
