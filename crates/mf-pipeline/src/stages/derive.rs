//! Final metadata derivation.

use async_trait::async_trait;
use mf_core::StageFault;

use crate::context::StageContext;
use crate::stage::{AnalysisState, Stage};

/// Fill in values computed from earlier findings (bitrate).
#[derive(Debug, Default)]
pub struct DeriveStage;

/// Average bitrate in kbit/s, when the duration is known.
pub fn bitrate_kbps(size_bytes: u64, duration_secs: Option<f64>) -> Option<u64> {
    let secs = duration_secs.filter(|d| d.is_finite() && *d > 0.0)?;
    Some(((size_bytes as f64 * 8.0) / secs / 1000.0).round() as u64)
}

#[async_trait]
impl Stage for DeriveStage {
    fn name(&self) -> &'static str {
        "derive"
    }

    fn label(&self) -> &'static str {
        "Evaluating content safety"
    }

    fn target_percent(&self) -> u8 {
        80
    }

    async fn execute(&self, ctx: &StageContext, state: &mut AnalysisState) -> Result<(), StageFault> {
        let size = state.observed_size.unwrap_or(ctx.job.size_bytes);
        state.metadata.bitrate_kbps = bitrate_kbps(size, state.metadata.duration_secs);
        Ok(())
    }
}
