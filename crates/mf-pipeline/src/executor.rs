//! Pipeline executor: runs the ordered [`Stage`] list for one job with
//! per-stage budgets, cooperative cancellation, and monotonic progress.

use mf_core::{DerivedMetadata, StageFault};

use crate::context::{StageContext, StageReport};
use crate::stage::{AnalysisState, Stage};

/// A stage fault together with what the run had produced before it.
#[derive(Debug, Clone)]
pub struct StageFailure {
    /// Name of the stage that faulted, or `"executor"` for cancellation
    /// observed between stages.
    pub stage: &'static str,
    pub fault: StageFault,
    /// Partial metadata applied by the stages that did complete.
    pub partial: DerivedMetadata,
}

impl StageFailure {
    /// Diagnostic text recorded on the failed job.
    pub fn detail(&self) -> String {
        format!("{}: {}", self.stage, self.fault)
    }
}

impl std::fmt::Display for StageFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.detail())
    }
}

/// Runs stages strictly in sequence.
pub struct PipelineExecutor {
    stages: Vec<Box<dyn Stage>>,
}

impl PipelineExecutor {
    /// Create a new executor from an ordered list of stages.
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Self {
        Self { stages }
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Execute every stage in order.
    ///
    /// `floor` is the progress already recorded for the job; no report goes
    /// below it. After each stage a [`StageReport`] carrying the highest
    /// percentage so far is sent through the context's progress sender.
    ///
    /// # Errors
    ///
    /// Returns the first stage fault, a [`StageFault::StageTimeout`] when a
    /// stage exceeds the context's budget, or [`StageFault::Cancelled`] when
    /// the cancellation token fires before a stage starts. No stage runs
    /// after a failure.
    pub async fn execute(&self, ctx: &StageContext, floor: u8) -> Result<AnalysisState, StageFailure> {
        let mut state = AnalysisState::default();
        let mut high_water = floor.min(100);

        for stage in &self.stages {
            if ctx.cancellation.is_cancelled() {
                tracing::info!(job_id = %ctx.job.job_id, before = stage.name(), "Pipeline cancelled");
                return Err(StageFailure {
                    stage: "executor",
                    fault: StageFault::Cancelled,
                    partial: state.metadata,
                });
            }

            tracing::debug!(job_id = %ctx.job.job_id, stage = stage.name(), "Starting stage");
            let outcome = tokio::time::timeout(ctx.stage_timeout, stage.execute(ctx, &mut state)).await;

            let fault = match outcome {
                Ok(Ok(())) => None,
                Ok(Err(fault)) => Some(fault),
                Err(_elapsed) => Some(StageFault::StageTimeout {
                    stage: stage.name().to_string(),
                    budget_secs: ctx.stage_timeout.as_secs(),
                }),
            };

            if let Some(fault) = fault {
                tracing::warn!(
                    job_id = %ctx.job.job_id,
                    stage = stage.name(),
                    code = fault.code(),
                    "Stage failed: {fault}"
                );
                return Err(StageFailure {
                    stage: stage.name(),
                    fault,
                    partial: state.metadata,
                });
            }

            high_water = high_water.max(stage.target_percent().min(100));
            ctx.progress.send(&StageReport {
                percent: high_water,
                label: stage.label(),
                partial: state.metadata.clone(),
            });
            tracing::info!(job_id = %ctx.job.job_id, "[{high_water}%] Completed: {}", stage.label());
        }

        Ok(state)
    }
}
