//! Multi-stage pipeline execution
//!
//! A pipeline is an ephemeral chain of batch submissions: stage *i*'s
//! results feed stage *i+1*'s operation-producing transform (or a literal
//! operation list). A stage failure aborts the whole pipeline; rollback is
//! only available *within* a transactional batch, never across stages.

use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::batch::{BatchManager, BatchOptions};
use crate::operation::{OperationOutcome, OperationSpec};
use crate::events::EngineEvent;
use crate::{BatchflowError, Result};

type StageTransform = Box<dyn Fn(&[OperationOutcome]) -> Vec<OperationSpec> + Send + Sync>;

enum StageSource {
    Literal(Vec<OperationSpec>),
    Transform(StageTransform),
}

/// One stage of a pipeline: either a literal operation list or a transform
/// over the previous stage's results, with an optional per-stage parallel
/// override.
pub struct PipelineStage {
    source: StageSource,
    parallel: Option<bool>,
}

impl PipelineStage {
    /// A stage with a fixed operation list
    pub fn operations(operations: Vec<OperationSpec>) -> Self {
        Self {
            source: StageSource::Literal(operations),
            parallel: None,
        }
    }

    /// A stage whose operations are derived from the previous stage's
    /// results. The first stage of a pipeline receives an empty slice.
    pub fn transform<F>(transform: F) -> Self
    where
        F: Fn(&[OperationOutcome]) -> Vec<OperationSpec> + Send + Sync + 'static,
    {
        Self {
            source: StageSource::Transform(Box::new(transform)),
            parallel: None,
        }
    }

    /// Override the parallel strategy selection for this stage
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = Some(parallel);
        self
    }
}

impl std::fmt::Debug for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let source = match &self.source {
            StageSource::Literal(ops) => format!("Literal({} ops)", ops.len()),
            StageSource::Transform(_) => "Transform".to_string(),
        };
        f.debug_struct("PipelineStage")
            .field("source", &source)
            .field("parallel", &self.parallel)
            .finish()
    }
}

/// What `execute_pipeline` returns on success
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    /// Generated pipeline id
    pub pipeline_id: String,
    /// Number of stages executed
    pub stages: usize,
    /// Results of every stage, in stage order
    pub stage_results: Vec<Vec<OperationOutcome>>,
    /// Final stage's results
    pub results: Vec<OperationOutcome>,
}

impl BatchManager {
    /// Run a pipeline of batch submissions, threading each stage's results
    /// into the next stage's transform.
    ///
    /// The first failing stage aborts the pipeline immediately; there is no
    /// partial continuation and no pipeline-level rollback.
    #[instrument(skip(self, stages), fields(stage_count = stages.len()))]
    pub async fn execute_pipeline(&self, stages: Vec<PipelineStage>) -> Result<PipelineOutcome> {
        if stages.is_empty() {
            return Err(BatchflowError::Pipeline("pipeline has no stages".to_string()));
        }

        let pipeline_id = format!("pipeline-{}", Uuid::new_v4());
        let total_stages = stages.len();

        info!(pipeline_id = %pipeline_id, total_stages, "pipeline started");
        self.events().emit(EngineEvent::PipelineStart {
            pipeline_id: pipeline_id.clone(),
            stages: total_stages,
        });

        let mut previous: Vec<OperationOutcome> = Vec::new();
        let mut stage_results: Vec<Vec<OperationOutcome>> = Vec::with_capacity(total_stages);

        for (stage, definition) in stages.into_iter().enumerate() {
            let operations = match definition.source {
                StageSource::Literal(operations) => operations,
                StageSource::Transform(transform) => transform(&previous),
            };

            let options = BatchOptions {
                parallel: definition.parallel,
                ..Default::default()
            };

            match self.execute_batch(operations, options).await {
                Ok(outcome) => {
                    previous = outcome.results;
                    stage_results.push(previous.clone());
                    self.events().emit(EngineEvent::PipelineStage {
                        pipeline_id: pipeline_id.clone(),
                        stage,
                        total_stages,
                    });
                }
                Err(err) => {
                    warn!(
                        pipeline_id = %pipeline_id,
                        stage,
                        error = %err,
                        "pipeline aborted"
                    );
                    self.events().emit(EngineEvent::PipelineFailed {
                        pipeline_id: pipeline_id.clone(),
                        stage,
                        error: err.to_string(),
                    });
                    return Err(BatchflowError::Pipeline(format!(
                        "stage {} failed: {}",
                        stage, err
                    )));
                }
            }
        }

        info!(pipeline_id = %pipeline_id, total_stages, "pipeline complete");
        self.events().emit(EngineEvent::PipelineComplete {
            pipeline_id: pipeline_id.clone(),
            stages: total_stages,
            results: previous.clone(),
        });

        Ok(PipelineOutcome {
            pipeline_id,
            stages: total_stages,
            stage_results,
            results: previous,
        })
    }
}
