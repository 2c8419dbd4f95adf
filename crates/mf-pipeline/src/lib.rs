//! # mf-pipeline
//!
//! The media analysis pipeline.
//!
//! This crate provides:
//!
//! - **[`Stage`]** trait: one step of the pipeline with its own fault domain
//!   and a target progress percentage.
//! - **[`StageContext`]**: what every stage sees (job input, media store,
//!   cancellation, progress, budget).
//! - **Built-in stages** ([`stages`]): validate, extract metadata, sample,
//!   classify, derive, finalize.
//! - **[`probe`]**: container sniffing and ISO-BMFF `moov` parsing.
//! - **[`classifier`]**: the `classify` capability and its scorers.
//! - **[`PipelineExecutor`]**: runs the stages in order with per-stage
//!   timeouts, cooperative cancellation, and monotonic progress.
//! - **[`default_stages`]**: the fixed production stage list.

pub mod classifier;
pub mod context;
pub mod executor;
pub mod factory;
pub mod probe;
pub mod sampler;
pub mod stage;
pub mod stages;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export key types at the crate root.
pub use classifier::{Classification, ContentScorer, SafetyClassifier};
pub use context::{JobInput, ProgressSender, StageContext, StageReport};
pub use executor::{PipelineExecutor, StageFailure};
pub use factory::{build_classifier, default_stages};
pub use stage::{AnalysisState, JobOutcome, Stage};
