//! Container and codec metadata extraction.

use async_trait::async_trait;
use mf_core::StageFault;

use crate::context::StageContext;
use crate::probe::{probe_blob, ProbeError};
use crate::stage::{AnalysisState, Stage};

#[derive(Debug, Default)]
pub struct ExtractMetadataStage;

#[async_trait]
impl Stage for ExtractMetadataStage {
    fn name(&self) -> &'static str {
        "extract_metadata"
    }

    fn label(&self) -> &'static str {
        "Extracting metadata"
    }

    fn target_percent(&self) -> u8 {
        25
    }

    async fn execute(&self, ctx: &StageContext, state: &mut AnalysisState) -> Result<(), StageFault> {
        let size = state.observed_size.unwrap_or(ctx.job.size_bytes);
        let report = probe_blob(ctx.store.as_ref(), &ctx.job.blob_ref, size)
            .await
            .map_err(|e| match e {
                ProbeError::Unsupported(msg) => StageFault::UnsupportedFormat(msg),
                store @ ProbeError::Store(_) => StageFault::UnsupportedFormat(store.to_string()),
            })?;

        tracing::debug!(
            job_id = %ctx.job.job_id,
            container = %report.container,
            codec = ?report.movie.codec,
            "probed payload"
        );

        let meta = &mut state.metadata;
        meta.container = Some(report.container);
        meta.codec = report.movie.codec.clone();
        meta.duration_secs = report.movie.duration_secs;
        meta.width = report.movie.width;
        meta.height = report.movie.height;
        meta.frame_rate = report.movie.frame_rate;
        state.probe = Some(report);
        Ok(())
    }
}
