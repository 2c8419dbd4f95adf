//! Execution context shared by all stages in a pipeline run.

use std::sync::Arc;
use std::time::Duration;

use mf_core::{BlobRef, DerivedMetadata, JobId, OwnerId};
use mf_storage::MediaStore;
use tokio_util::sync::CancellationToken;

/// Progress report emitted after each completed stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StageReport {
    /// Never lower than any earlier report of the same run.
    pub percent: u8,
    /// Human-readable label of the stage that just finished.
    pub label: &'static str,
    /// Metadata gathered so far.
    pub partial: DerivedMetadata,
}

/// Sender for reporting progress out of the executor.
pub struct ProgressSender {
    callback: Box<dyn Fn(&StageReport) + Send + Sync>,
}

impl ProgressSender {
    /// Create a new sender from the given callback.
    pub fn new(callback: impl Fn(&StageReport) + Send + Sync + 'static) -> Self {
        Self {
            callback: Box::new(callback),
        }
    }

    /// Create a no-op sender that discards all progress reports.
    pub fn noop() -> Self {
        Self {
            callback: Box::new(|_| {}),
        }
    }

    /// Report progress.
    pub fn send(&self, report: &StageReport) {
        (self.callback)(report);
    }
}

impl std::fmt::Debug for ProgressSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressSender").finish_non_exhaustive()
    }
}

/// The immutable facts about the job being analysed.
#[derive(Debug, Clone)]
pub struct JobInput {
    pub job_id: JobId,
    pub owner_id: OwnerId,
    pub blob_ref: BlobRef,
    /// Size declared at intake.
    pub size_bytes: u64,
    pub content_type: String,
    pub file_name: Option<String>,
}

/// Context passed to every stage.
pub struct StageContext {
    pub job: JobInput,
    pub store: Arc<dyn MediaStore>,
    /// Checked between stages; when cancelled the executor stops.
    pub cancellation: CancellationToken,
    pub progress: Arc<ProgressSender>,
    /// Budget for each individual stage.
    pub stage_timeout: Duration,
}

impl StageContext {
    /// Create a new context with a fresh token, no-op progress, and a
    /// two-minute stage budget.
    pub fn new(job: JobInput, store: Arc<dyn MediaStore>) -> Self {
        Self {
            job,
            store,
            cancellation: CancellationToken::new(),
            progress: Arc::new(ProgressSender::noop()),
            stage_timeout: Duration::from_secs(120),
        }
    }

    /// Builder: attach a cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Builder: attach a progress sender.
    pub fn with_progress(mut self, progress: ProgressSender) -> Self {
        self.progress = Arc::new(progress);
        self
    }

    /// Builder: set the per-stage budget.
    pub fn with_stage_timeout(mut self, timeout: Duration) -> Self {
        self.stage_timeout = timeout;
        self
    }
}
