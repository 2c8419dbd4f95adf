//! Job processor.
//!
//! Each submitted job gets its own task running [`run`]. Runs coordinate
//! only through the conditional status updates in the job table: whichever
//! caller wins the `queued -> processing` claim executes the pipeline, every
//! other trigger is a no-op. A run that dies mid-pipeline leaves its job in
//! `processing`; the stale sweep re-triggers such jobs and [`run`] takes
//! them over once their heartbeat is older than `pipeline.stale_after_secs`.

use std::time::Duration;

use chrono::{Datelike, TimeDelta, Utc};
use tokio_util::sync::CancellationToken;

use mf_core::events::JobEvent;
use mf_core::{Error, JobId, JobStatus, OwnerId, Result, StageFault};
use mf_db::models::{Job, NewJob};
use mf_db::pool::{get_conn, PooledConnection};
use mf_db::queries::jobs;
use mf_pipeline::{JobInput, ProgressSender, StageContext, StageReport};

use crate::context::AppContext;

/// A pipeline run owned by this process.
#[derive(Debug, Clone)]
pub struct ActiveRun {
    /// The job's attempt counter at claim time.
    pub attempt: i64,
    pub token: CancellationToken,
}

/// What a call to [`run`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The job was not eligible, or another run got it first.
    Skipped,
    Completed,
    Failed,
}

/// Persist a new `queued` job and trigger its pipeline in the background.
pub fn submit(ctx: &AppContext, new: &NewJob) -> Result<Job> {
    let job = {
        let conn = get_conn(&ctx.db)?;
        jobs::create_job(&conn, new)?
    };
    tracing::info!(
        job_id = %job.id,
        owner_id = %job.owner_id,
        size_bytes = job.size_bytes,
        "Job submitted"
    );
    trigger(ctx, job.id);
    Ok(job)
}

/// Spawn [`run`] for a job without waiting for it.
pub fn trigger(ctx: &AppContext, id: JobId) {
    let ctx = ctx.clone();
    tokio::spawn(async move {
        if let Err(e) = run(&ctx, id).await {
            tracing::warn!(job_id = %id, "Run trigger failed: {e}");
        }
    });
}

/// Heartbeats older than this timestamp are stale.
fn stale_cutoff(after: Duration) -> String {
    TimeDelta::from_std(after)
        .ok()
        .and_then(|d| Utc::now().checked_sub_signed(d))
        .filter(|ts| ts.year() >= 1)
        .map(mf_db::format_timestamp)
        .unwrap_or_else(|| "0001-01-01T00:00:00.000Z".to_string())
}

/// Idempotent pipeline trigger.
///
/// A missing job is `NotFound`. A `queued` job is claimed and executed. A
/// `processing` job is taken over only when its heartbeat is stale; a fresh
/// one is left alone. Terminal jobs are never touched.
pub async fn run(ctx: &AppContext, id: JobId) -> Result<RunOutcome> {
    let job = {
        let conn = get_conn(&ctx.db)?;
        jobs::get_job(&conn, id)?
    }
    .ok_or_else(|| Error::not_found("job", id))?;

    let cutoff = stale_cutoff(ctx.config.pipeline.stale_after());
    let eligible = match job.status {
        JobStatus::Queued => true,
        JobStatus::Processing => job.updated_at.as_str() < cutoff.as_str(),
        JobStatus::Completed | JobStatus::Failed => false,
    };
    if !eligible {
        tracing::debug!(job_id = %id, status = %job.status, "Run skipped; job not eligible");
        return Ok(RunOutcome::Skipped);
    }

    let _permit = ctx
        .run_slots
        .acquire()
        .await
        .map_err(|_| Error::Internal("run slots closed".into()))?;

    let claimed = {
        let conn = get_conn(&ctx.db)?;
        match job.status {
            JobStatus::Queued => jobs::claim_job(&conn, id)?,
            _ => {
                let job = jobs::reclaim_stale_job(&conn, id, &cutoff)?;
                if job.is_some() {
                    tracing::warn!(job_id = %id, "Restarting stale job");
                }
                job
            }
        }
    };
    let Some(job) = claimed else {
        tracing::debug!(job_id = %id, "Run skipped; job was claimed elsewhere");
        return Ok(RunOutcome::Skipped);
    };

    let token = CancellationToken::new();
    let previous = ctx.active_runs.insert(
        id,
        ActiveRun {
            attempt: job.attempt,
            token: token.clone(),
        },
    );
    if let Some(previous) = previous {
        previous.token.cancel();
    }

    let outcome = execute_claimed(ctx, &job, token).await;
    ctx.active_runs.remove_if(&id, |_, run| run.attempt == job.attempt);
    outcome
}

fn progress_sender(ctx: &AppContext, job: &Job) -> ProgressSender {
    let db = ctx.db.clone();
    let event_bus = ctx.event_bus.clone();
    let job_id = job.id;
    let owner_id = job.owner_id.clone();
    let attempt = job.attempt;

    ProgressSender::new(move |report: &StageReport| {
        let recorded = (|| -> Result<bool> {
            let conn = get_conn(&db)?;
            jobs::record_progress(
                &conn,
                job_id,
                attempt,
                report.percent,
                report.label,
                &report.partial,
            )
        })();

        match recorded {
            Ok(false) => {
                tracing::debug!(job_id = %job_id, attempt, "Progress dropped; run superseded");
                return;
            }
            Ok(true) => {}
            Err(e) => tracing::warn!(job_id = %job_id, "Failed to record progress: {e}"),
        }

        event_bus.publish(JobEvent::progress(
            job_id,
            owner_id.clone(),
            report.percent,
            report.label,
        ));
    })
}

async fn execute_claimed(ctx: &AppContext, job: &Job, token: CancellationToken) -> Result<RunOutcome> {
    tracing::info!(
        job_id = %job.id,
        attempt = job.attempt,
        resume_percent = job.progress,
        "Processing job"
    );

    let input = JobInput {
        job_id: job.id,
        owner_id: job.owner_id.clone(),
        blob_ref: job.blob_ref.clone(),
        size_bytes: job.size_bytes,
        content_type: job.content_type.clone(),
        file_name: job.file_name.clone(),
    };
    let stage_ctx = StageContext::new(input, ctx.store.clone())
        .with_cancellation(token)
        .with_progress(progress_sender(ctx, job))
        .with_stage_timeout(ctx.config.pipeline.stage_timeout());

    let result = ctx.executor.execute(&stage_ctx, job.progress).await;

    let conn = get_conn(&ctx.db)?;
    match result {
        Ok(state) => match state.outcome {
            Some(outcome) => {
                let stored = jobs::complete_job(
                    &conn,
                    job.id,
                    job.attempt,
                    &outcome.metadata,
                    outcome.verdict,
                    outcome.score,
                )?;
                if !stored {
                    tracing::warn!(job_id = %job.id, attempt = job.attempt, "Completion dropped; run superseded");
                    return Ok(RunOutcome::Skipped);
                }
                tracing::info!(
                    job_id = %job.id,
                    verdict = %outcome.verdict,
                    score = outcome.score,
                    "Job completed"
                );
                ctx.event_bus.publish(JobEvent::completed(
                    job.id,
                    job.owner_id.clone(),
                    outcome.verdict,
                    outcome.score,
                ));
                Ok(RunOutcome::Completed)
            }
            None => finish_failed(ctx, &conn, job, "finalize: pipeline produced no outcome"),
        },
        Err(failure) => finish_failed(ctx, &conn, job, &failure.detail()),
    }
}

fn finish_failed(
    ctx: &AppContext,
    conn: &PooledConnection,
    job: &Job,
    detail: &str,
) -> Result<RunOutcome> {
    if !jobs::fail_job(conn, job.id, job.attempt, detail)? {
        tracing::warn!(job_id = %job.id, attempt = job.attempt, "Failure dropped; run superseded");
        return Ok(RunOutcome::Skipped);
    }
    tracing::error!(job_id = %job.id, error = %detail, "Job failed");
    ctx.event_bus
        .publish(JobEvent::failed(job.id, job.owner_id.clone(), detail));
    Ok(RunOutcome::Failed)
}

/// Cancel an owned job.
///
/// A `queued` job fails immediately. A `processing` job is signalled and
/// fails at its next stage boundary. Terminal jobs are a conflict.
pub fn cancel(ctx: &AppContext, owner: &OwnerId, id: JobId) -> Result<Job> {
    let conn = get_conn(&ctx.db)?;
    let reason = StageFault::Cancelled.to_string();

    // A queued job may be claimed between the read and the update; one
    // retry sees it as processing.
    for _ in 0..2 {
        let job = jobs::get_owned_job(&conn, id, owner)?
            .ok_or_else(|| Error::not_found("job", id))?;

        match job.status {
            JobStatus::Queued => {
                if jobs::fail_queued_job(&conn, id, &reason)? {
                    tracing::info!(job_id = %id, "Queued job cancelled");
                    ctx.event_bus
                        .publish(JobEvent::failed(id, job.owner_id.clone(), reason.as_str()));
                    return jobs::get_job(&conn, id)?.ok_or_else(|| Error::not_found("job", id));
                }
            }
            JobStatus::Processing => {
                let Some(active) = ctx.active_runs.get(&id) else {
                    return Err(Error::Conflict(
                        "job is processing but no run is active on this server".into(),
                    ));
                };
                active.token.cancel();
                tracing::info!(job_id = %id, "Cancellation requested");
                return Ok(job);
            }
            status => {
                return Err(Error::Conflict(format!("job is already {status}")));
            }
        }
    }

    Err(Error::Conflict("job changed state during cancellation".into()))
}

/// Delete an owned job that is not `processing`, then release its blob.
pub async fn delete(ctx: &AppContext, owner: &OwnerId, id: JobId) -> Result<Job> {
    let removed = {
        let conn = get_conn(&ctx.db)?;
        let job = jobs::get_owned_job(&conn, id, owner)?
            .ok_or_else(|| Error::not_found("job", id))?;
        if job.status == JobStatus::Processing {
            return Err(Error::Conflict("cannot delete a job while it is processing".into()));
        }
        jobs::delete_job(&conn, id, owner)?
            .ok_or_else(|| Error::Conflict("job started processing".into()))?
    };

    ctx.views.forget(id);
    if let Err(e) = ctx.store.remove(&removed.blob_ref).await {
        tracing::warn!(job_id = %id, blob = %removed.blob_ref, "Failed to release blob: {e}");
    }
    tracing::info!(job_id = %id, "Job deleted");
    Ok(removed)
}

/// Re-trigger every `processing` job whose heartbeat is stale.
pub fn sweep_stale(ctx: &AppContext) -> Result<usize> {
    let cutoff = stale_cutoff(ctx.config.pipeline.stale_after());
    let ids = {
        let conn = get_conn(&ctx.db)?;
        jobs::list_stale_jobs(&conn, &cutoff)?
    };
    for id in &ids {
        trigger(ctx, *id);
    }
    if !ids.is_empty() {
        tracing::info!(count = ids.len(), "Re-triggered stale jobs");
    }
    Ok(ids.len())
}

/// Startup recovery: trigger every `queued` job (its spawn died with the
/// previous process) and every stale `processing` job.
pub fn recover_on_startup(ctx: &AppContext) -> Result<usize> {
    let queued = {
        let conn = get_conn(&ctx.db)?;
        jobs::list_job_ids_by_status(&conn, JobStatus::Queued)?
    };
    for id in &queued {
        trigger(ctx, *id);
    }
    if !queued.is_empty() {
        tracing::info!(count = queued.len(), "Re-triggered queued jobs");
    }
    Ok(queued.len() + sweep_stale(ctx)?)
}

/// Run [`sweep_stale`] every `pipeline.stale_sweep_interval_secs` until
/// cancelled.
pub async fn run_stale_sweeper(ctx: AppContext, cancel: CancellationToken) {
    let period = Duration::from_secs(ctx.config.pipeline.stale_sweep_interval_secs.max(1));
    let mut ticker = tokio::time::interval(period);
    ticker.tick().await;

    tracing::info!(interval_secs = period.as_secs(), "Stale sweeper started");
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = cancel.cancelled() => break,
        }
        if let Err(e) = sweep_stale(&ctx) {
            tracing::error!("Stale sweep failed: {e}");
        }
    }
    tracing::info!("Stale sweeper stopped");
}
