//! Analysis input sampling.

use async_trait::async_trait;
use mf_core::StageFault;

use crate::context::StageContext;
use crate::sampler::sample_blob;
use crate::stage::{AnalysisState, Stage};

/// Read evenly spaced windows from the payload.
#[derive(Debug)]
pub struct SampleStage {
    windows: usize,
    window_bytes: usize,
}

impl SampleStage {
    pub fn new(windows: usize, window_bytes: usize) -> Self {
        Self {
            windows,
            window_bytes,
        }
    }
}

#[async_trait]
impl Stage for SampleStage {
    fn name(&self) -> &'static str {
        "sample"
    }

    fn label(&self) -> &'static str {
        "Analyzing video frames"
    }

    fn target_percent(&self) -> u8 {
        40
    }

    async fn execute(&self, ctx: &StageContext, state: &mut AnalysisState) -> Result<(), StageFault> {
        let size = state.observed_size.unwrap_or(ctx.job.size_bytes);
        let sample = sample_blob(
            ctx.store.as_ref(),
            &ctx.job.blob_ref,
            size,
            self.windows,
            self.window_bytes,
        )
        .await
        .map_err(StageFault::AnalysisInputError)?;

        state.sample = Some(sample);
        Ok(())
    }
}
