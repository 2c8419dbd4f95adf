//! The [`Stage`] trait and the state threaded through a run.

use async_trait::async_trait;
use mf_core::{DerivedMetadata, SafetyVerdict, StageFault};

use crate::classifier::Classification;
use crate::context::StageContext;
use crate::probe::ProbeReport;
use crate::sampler::AnalysisSample;

/// A single step of the analysis pipeline.
///
/// Stages run strictly in order. Each one reads what earlier stages left in
/// [`AnalysisState`] and adds its own findings. A returned fault ends the
/// run; no later stage executes.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Short identifier used in logs and failure records (e.g. "validate").
    fn name(&self) -> &'static str;

    /// Human-readable label shown to the job owner.
    fn label(&self) -> &'static str;

    /// Progress percentage reached once this stage completes.
    fn target_percent(&self) -> u8;

    async fn execute(&self, ctx: &StageContext, state: &mut AnalysisState) -> Result<(), StageFault>;
}

/// Everything the stages of one run have produced so far.
#[derive(Debug, Clone, Default)]
pub struct AnalysisState {
    /// Size reported by the media store.
    pub observed_size: Option<u64>,
    pub probe: Option<ProbeReport>,
    pub sample: Option<AnalysisSample>,
    pub classification: Option<Classification>,
    /// Partial metadata, filled in stage by stage.
    pub metadata: DerivedMetadata,
    /// Set by the finalize stage.
    pub outcome: Option<JobOutcome>,
}

/// The terminal result of a successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    pub metadata: DerivedMetadata,
    pub verdict: SafetyVerdict,
    pub score: f64,
}
