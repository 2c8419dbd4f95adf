//! Unified error type for mediaflow.
//!
//! All crates funnel their failures into [`Error`], which carries enough
//! context for API handlers to derive an HTTP status code via
//! [`Error::http_status`]. Faults raised inside a pipeline stage are
//! described by [`StageFault`]; they end the job and are recorded on it
//! rather than surfacing to callers.

use std::fmt;

/// Unified error type covering all failure modes in mediaflow.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested entity could not be found, or belongs to someone else.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "job", "blob").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// The caller is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The caller lacks the capability for the requested action.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Request data failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The operation conflicts with the current job state.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The job exists but has not finished processing.
    #[error("Not ready: {0}")]
    NotReady(String),

    /// The requested byte range cannot be served.
    #[error("Range not satisfiable for {total} bytes")]
    RangeNotSatisfiable {
        /// Total size of the blob in bytes.
        total: u64,
    },

    /// The media store could not be read or written. Retryable by the caller.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A database operation failed.
    #[error("Database error: {source}")]
    Database {
        /// The underlying database error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// A pipeline stage faulted.
    #[error("Stage fault: {0}")]
    Stage(#[from] StageFault),

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map this error to an appropriate HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::NotFound { .. } => 404,
            Error::Unauthorized(_) => 401,
            Error::Forbidden(_) => 403,
            Error::Validation(_) => 400,
            Error::Conflict(_) => 409,
            Error::NotReady(_) => 400,
            Error::RangeNotSatisfiable { .. } => 416,
            Error::StorageUnavailable(_) => 503,
            Error::Database { .. } => 500,
            Error::Io { .. } => 500,
            Error::Stage(_) => 500,
            Error::Internal(_) => 500,
        }
    }

    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Database`].
    pub fn database(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Error::Database {
            source: source.into(),
        }
    }

    /// Convenience constructor for [`Error::StorageUnavailable`].
    pub fn storage(message: impl fmt::Display) -> Self {
        Error::StorageUnavailable(message.to_string())
    }

    /// Convenience constructor for [`Error::Stage`].
    pub fn stage(fault: StageFault) -> Self {
        Error::Stage(fault)
    }
}

/// Convenience alias used throughout the mf-* crates.
pub type Result<T> = std::result::Result<T, Error>;

/// A fault raised by one pipeline stage. Terminal for the job.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StageFault {
    /// Stored payload does not match what was declared at intake.
    #[error("corrupt upload: {0}")]
    CorruptUpload(String),

    /// The container could not be recognised or parsed.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Analysis samples could not be taken from the payload.
    #[error("analysis input error: {0}")]
    AnalysisInputError(String),

    /// The content scorer did not produce a score.
    #[error("classification unavailable: {0}")]
    ClassificationUnavailable(String),

    /// The stage ran past its budget.
    #[error("stage '{stage}' exceeded its {budget_secs}s budget")]
    StageTimeout { stage: String, budget_secs: u64 },

    /// The job was cancelled at a stage boundary.
    #[error("cancelled")]
    Cancelled,
}

impl StageFault {
    /// Stable machine-readable code for this fault kind.
    pub fn code(&self) -> &'static str {
        match self {
            StageFault::CorruptUpload(_) => "corrupt_upload",
            StageFault::UnsupportedFormat(_) => "unsupported_format",
            StageFault::AnalysisInputError(_) => "analysis_input_error",
            StageFault::ClassificationUnavailable(_) => "classification_unavailable",
            StageFault::StageTimeout { .. } => "stage_timeout",
            StageFault::Cancelled => "cancelled",
        }
    }
}
