//! Built-in pipeline stages, in execution order.

pub mod classify;
pub mod derive;
pub mod extract;
pub mod finalize;
pub mod sample;
pub mod validate;

pub use classify::ClassifyStage;
pub use derive::DeriveStage;
pub use extract::ExtractMetadataStage;
pub use finalize::FinalizeStage;
pub use sample::SampleStage;
pub use validate::ValidateStage;
