//! Payload integrity check.

use async_trait::async_trait;
use mf_core::{Error, StageFault};

use crate::context::StageContext;
use crate::stage::{AnalysisState, Stage};

/// Compare the declared size with what the media store actually holds.
#[derive(Debug, Default)]
pub struct ValidateStage;

#[async_trait]
impl Stage for ValidateStage {
    fn name(&self) -> &'static str {
        "validate"
    }

    fn label(&self) -> &'static str {
        "Validating video file"
    }

    fn target_percent(&self) -> u8 {
        10
    }

    async fn execute(&self, ctx: &StageContext, state: &mut AnalysisState) -> Result<(), StageFault> {
        let observed = ctx.store.size(&ctx.job.blob_ref).await.map_err(|e| match e {
            Error::NotFound { .. } => StageFault::CorruptUpload("stored payload is missing".into()),
            other => StageFault::CorruptUpload(format!("cannot stat stored payload: {other}")),
        })?;

        if observed == 0 {
            return Err(StageFault::CorruptUpload("stored payload is empty".into()));
        }
        if observed != ctx.job.size_bytes {
            return Err(StageFault::CorruptUpload(format!(
                "declared {} bytes but store holds {observed}",
                ctx.job.size_bytes
            )));
        }

        state.observed_size = Some(observed);
        Ok(())
    }
}
