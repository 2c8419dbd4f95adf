//! Batched view counting.
//!
//! Streaming records a view in memory and moves on; a background task folds
//! the pending counts into the job table every `view_flush_interval_ms`.
//! Counts are eventually consistent and a crash loses at most one interval.

use std::time::Duration;

use dashmap::DashMap;
use mf_core::JobId;
use mf_db::pool::DbPool;
use tokio_util::sync::CancellationToken;

use crate::context::AppContext;

#[derive(Debug, Default)]
pub struct ViewCounter {
    pending: DashMap<JobId, u64>,
}

impl ViewCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one view. Never blocks on I/O.
    pub fn record(&self, id: JobId) {
        *self.pending.entry(id).or_insert(0) += 1;
    }

    /// Drop any pending count for a job that no longer exists.
    pub fn forget(&self, id: JobId) {
        self.pending.remove(&id);
    }

    /// Views recorded but not yet flushed.
    pub fn pending(&self, id: JobId) -> u64 {
        self.pending.get(&id).map(|n| *n).unwrap_or(0)
    }

    /// Write pending counts to the database. Returns the number of views
    /// persisted; counts that fail to write are kept for the next flush.
    pub fn flush(&self, db: &DbPool) -> mf_core::Result<u64> {
        let ids: Vec<JobId> = self.pending.iter().map(|e| *e.key()).collect();
        if ids.is_empty() {
            return Ok(0);
        }

        let conn = mf_db::pool::get_conn(db)?;
        let mut flushed = 0;
        for id in ids {
            let Some((_, n)) = self.pending.remove(&id) else {
                continue;
            };
            match mf_db::queries::jobs::add_views(&conn, id, n) {
                Ok(_) => flushed += n,
                Err(e) => {
                    tracing::warn!(job_id = %id, "Failed to flush view count: {e}");
                    *self.pending.entry(id).or_insert(0) += n;
                }
            }
        }
        Ok(flushed)
    }
}

/// Flush view counts periodically until cancelled, then once more.
pub async fn run_view_flusher(ctx: AppContext, cancel: CancellationToken) {
    let period = Duration::from_millis(ctx.config.streaming.view_flush_interval_ms.max(100));
    let mut ticker = tokio::time::interval(period);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = cancel.cancelled() => break,
        }
        if let Err(e) = ctx.views.flush(&ctx.db) {
            tracing::warn!("View flush failed: {e}");
        }
    }

    match ctx.views.flush(&ctx.db) {
        Ok(n) if n > 0 => tracing::info!(views = n, "Flushed pending views on shutdown"),
        Ok(_) => {}
        Err(e) => tracing::warn!("Final view flush failed: {e}"),
    }
}
