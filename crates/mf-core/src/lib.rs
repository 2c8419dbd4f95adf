//! mf-core: shared types, IDs, errors, configuration, and the progress
//! broadcaster.
//!
//! Every other mf-* crate depends on this one for typed identifiers, the
//! unified error type, job-domain enums, application configuration, and the
//! owner-scoped event bus.

pub mod config;
pub mod error;
pub mod events;
pub mod ids;
pub mod job;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, Result, StageFault};
pub use ids::*;
pub use job::*;
