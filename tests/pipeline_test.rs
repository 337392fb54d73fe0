//! Pipeline Tests
//!
//! Covers stage-to-stage result threading, per-stage parallel overrides,
//! abort-on-stage-failure and the pipeline event sequence.

use batchflow::batch::{BatchManager, EngineConfig};
use batchflow::events::EngineEvent;
use batchflow::executor::FnExecutor;
use batchflow::operation::OperationSpec;
use batchflow::pipeline::PipelineStage;
use batchflow::BatchflowError;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;

fn echo_manager() -> BatchManager {
    let executor = Arc::new(FnExecutor::new(|op: &OperationSpec| {
        let tool = op.tool.clone();
        let params = op.params.clone();
        let fails = op.tool == "fail";
        async move {
            if fails {
                Err(BatchflowError::Executor("stage failure".to_string()))
            } else {
                Ok(json!({ "tool": tool, "params": params }))
            }
        }
    }));
    BatchManager::new(executor, EngineConfig::default())
}

/// Stage 2's transform receives exactly the results array produced by
/// stage 1's batch
#[tokio::test]
async fn test_stage_results_thread_into_next_transform() {
    let manager = echo_manager();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_ref = Arc::clone(&seen);

    let outcome = manager
        .execute_pipeline(vec![
            PipelineStage::operations(vec![
                OperationSpec::new("extract_a", json!({})),
                OperationSpec::new("extract_b", json!({})),
            ]),
            PipelineStage::transform(move |previous| {
                seen_ref.lock().extend(previous.iter().cloned());
                // Fan out one operation per upstream result
                previous
                    .iter()
                    .map(|r| {
                        OperationSpec::new(
                            "load",
                            json!({ "source": r.result.clone() }),
                        )
                    })
                    .collect()
            }),
        ])
        .await
        .unwrap();

    let seen = seen.lock();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].result.as_ref().unwrap()["tool"], "extract_a");
    assert_eq!(seen[1].result.as_ref().unwrap()["tool"], "extract_b");

    assert_eq!(outcome.stages, 2);
    assert_eq!(outcome.stage_results.len(), 2);
    assert_eq!(outcome.results.len(), 2);
    assert_eq!(
        outcome.results[0].result.as_ref().unwrap()["params"]["source"]["tool"],
        "extract_a"
    );
}

#[tokio::test]
async fn test_stage_failure_aborts_pipeline() {
    let manager = echo_manager();
    let third_stage_ran = Arc::new(Mutex::new(false));
    let flag = Arc::clone(&third_stage_ran);

    let err = manager
        .execute_pipeline(vec![
            PipelineStage::operations(vec![OperationSpec::new("ok", json!({}))]),
            PipelineStage::operations(vec![OperationSpec::new("fail", json!({}))]),
            PipelineStage::transform(move |_| {
                *flag.lock() = true;
                vec![OperationSpec::new("never", json!({}))]
            }),
        ])
        .await
        .unwrap_err();

    assert!(matches!(err, BatchflowError::Pipeline(_)));
    assert!(err.to_string().contains("stage 1"));
    assert!(!*third_stage_ran.lock(), "stages after a failure must not run");
}

#[tokio::test]
async fn test_pipeline_event_sequence() {
    let manager = echo_manager();
    let mut events = manager.subscribe();

    manager
        .execute_pipeline(vec![
            PipelineStage::operations(vec![OperationSpec::new("a", json!({}))]),
            PipelineStage::operations(vec![OperationSpec::new("b", json!({}))]),
        ])
        .await
        .unwrap();

    let mut stages_seen = Vec::new();
    let mut started = false;
    loop {
        match events.recv().await.unwrap() {
            EngineEvent::PipelineStart { stages, .. } => {
                assert_eq!(stages, 2);
                started = true;
            }
            EngineEvent::PipelineStage { stage, total_stages, .. } => {
                assert!(started, "stage events must follow pipeline:start");
                assert_eq!(total_stages, 2);
                stages_seen.push(stage);
            }
            EngineEvent::PipelineComplete { stages, results, .. } => {
                assert_eq!(stages, 2);
                assert_eq!(results.len(), 1);
                break;
            }
            _ => continue,
        }
    }
    assert_eq!(stages_seen, vec![0, 1]);
}

#[tokio::test]
async fn test_failed_pipeline_emits_pipeline_failed() {
    let manager = echo_manager();
    let mut events = manager.subscribe();

    let _ = manager
        .execute_pipeline(vec![PipelineStage::operations(vec![OperationSpec::new(
            "fail",
            json!({}),
        )])])
        .await;

    loop {
        match events.recv().await.unwrap() {
            EngineEvent::PipelineFailed { stage, error, .. } => {
                assert_eq!(stage, 0);
                assert!(!error.is_empty());
                break;
            }
            _ => continue,
        }
    }
}

/// A per-stage parallel override runs that stage under the parallel
/// strategy without affecting the others
#[tokio::test]
async fn test_per_stage_parallel_override() {
    let executor = Arc::new(FnExecutor::new(|_op: &OperationSpec| async move {
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        Ok(json!("ok"))
    }));
    let manager = BatchManager::new(executor, EngineConfig::default());

    let outcome = manager
        .execute_pipeline(vec![
            PipelineStage::operations(
                (0..6)
                    .map(|i| OperationSpec::new(format!("op_{}", i), json!({})))
                    .collect(),
            )
            .with_parallel(true),
            PipelineStage::transform(|previous| {
                vec![OperationSpec::new(
                    "aggregate",
                    json!({ "count": previous.len() }),
                )]
            }),
        ])
        .await
        .unwrap();

    assert_eq!(outcome.stage_results[0].len(), 6);
    assert_eq!(outcome.results.len(), 1);
}
