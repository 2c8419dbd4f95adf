//! Assemble the terminal outcome.

use async_trait::async_trait;
use mf_core::StageFault;

use crate::context::StageContext;
use crate::stage::{AnalysisState, JobOutcome, Stage};

/// Freeze the metadata snapshot and verdict into a [`JobOutcome`].
///
/// The caller persists the outcome in a single terminal write.
#[derive(Debug, Default)]
pub struct FinalizeStage;

#[async_trait]
impl Stage for FinalizeStage {
    fn name(&self) -> &'static str {
        "finalize"
    }

    fn label(&self) -> &'static str {
        "Finalizing processing"
    }

    fn target_percent(&self) -> u8 {
        95
    }

    async fn execute(&self, _ctx: &StageContext, state: &mut AnalysisState) -> Result<(), StageFault> {
        let classification = state.classification.ok_or_else(|| {
            StageFault::ClassificationUnavailable("pipeline reached finalize without a verdict".into())
        })?;

        state.outcome = Some(JobOutcome {
            metadata: state.metadata.clone(),
            verdict: classification.verdict,
            score: classification.score,
        });
        Ok(())
    }
}
