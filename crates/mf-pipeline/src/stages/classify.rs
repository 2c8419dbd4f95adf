//! Content classification.

use async_trait::async_trait;
use mf_core::StageFault;

use crate::classifier::SafetyClassifier;
use crate::context::StageContext;
use crate::stage::{AnalysisState, Stage};

#[derive(Debug)]
pub struct ClassifyStage {
    classifier: SafetyClassifier,
}

impl ClassifyStage {
    pub fn new(classifier: SafetyClassifier) -> Self {
        Self { classifier }
    }
}

#[async_trait]
impl Stage for ClassifyStage {
    fn name(&self) -> &'static str {
        "classify"
    }

    fn label(&self) -> &'static str {
        "Running sensitivity detection"
    }

    fn target_percent(&self) -> u8 {
        60
    }

    async fn execute(&self, ctx: &StageContext, state: &mut AnalysisState) -> Result<(), StageFault> {
        let sample = state.sample.as_ref().ok_or_else(|| {
            StageFault::ClassificationUnavailable("no analysis sample was taken".into())
        })?;

        let classification = self.classifier.classify(sample).await?;
        tracing::info!(
            job_id = %ctx.job.job_id,
            scorer = self.classifier.scorer_name(),
            score = classification.score,
            verdict = %classification.verdict,
            "content classified"
        );
        state.classification = Some(classification);
        Ok(())
    }
}
