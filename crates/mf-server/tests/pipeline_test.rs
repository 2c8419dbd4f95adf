//! Integration tests for the job processor: claiming, progress, terminal
//! states, cancellation, deletion, and stale-run recovery.

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::TestHarness;

use mf_core::config::Config;
use mf_core::events::{EventKind, EventPayload};
use mf_core::{Error, JobId, JobStatus, OwnerId, SafetyVerdict, StageFault};
use mf_pipeline::classifier::FixedScorer;
use mf_pipeline::sampler::AnalysisSample;
use mf_pipeline::testing::{mp4_bytes, Mp4Fixture};
use mf_pipeline::ContentScorer;
use mf_server::processor::{self, RunOutcome};

fn clip() -> Vec<u8> {
    mp4_bytes(&Mp4Fixture::default())
}

/// Scores after a pause, so a run can be caught mid-pipeline.
struct SlowScorer(Duration);

#[async_trait]
impl ContentScorer for SlowScorer {
    fn name(&self) -> &'static str {
        "slow"
    }

    async fn score(&self, _sample: &AnalysisSample) -> Result<f64, StageFault> {
        tokio::time::sleep(self.0).await;
        Ok(5.0)
    }
}

#[tokio::test]
async fn run_completes_with_metadata_and_verdict() {
    let h = TestHarness::new().await;
    let job = h.queued_job("alice", &clip()).await;

    let outcome = processor::run(&h.ctx, job.id).await.unwrap();
    assert_eq!(outcome, RunOutcome::Completed);

    let job = h.job(&job).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.progress, 100);
    assert_eq!(job.safety_verdict, SafetyVerdict::Safe);
    assert_eq!(job.safety_score, Some(10.0));
    assert!(job.completed_at.is_some());
    assert!(job.error_detail.is_none());

    let meta = job.metadata.expect("metadata stored");
    assert_eq!(meta.width, Some(640));
    assert_eq!(meta.height, Some(360));
    assert_eq!(meta.duration_secs, Some(4.0));
    assert_eq!(meta.codec.as_deref(), Some("h264"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_triggers_execute_once() {
    let h = TestHarness::new().await;
    let job = h.queued_job("alice", &clip()).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let ctx = h.ctx.clone();
        handles.push(tokio::spawn(async move { processor::run(&ctx, job.id).await }));
    }

    let mut completed = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            RunOutcome::Completed => completed += 1,
            RunOutcome::Skipped => {}
            RunOutcome::Failed => panic!("run failed"),
        }
    }
    assert_eq!(completed, 1);

    let job = h.job(&job).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.attempt, 1);
}

#[tokio::test]
async fn progress_events_never_decrease() {
    let h = TestHarness::new().await;
    let job = h.queued_job("alice", &clip()).await;
    let mut rx = h.ctx.event_bus.subscribe();

    processor::run(&h.ctx, job.id).await.unwrap();

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        assert_eq!(event.job_id, job.id);
        events.push(event);
    }

    let percents: Vec<u8> = events
        .iter()
        .filter_map(|e| match &e.payload {
            EventPayload::Progress { percent, .. } => Some(*percent),
            _ => None,
        })
        .collect();
    assert_eq!(percents, vec![10, 25, 40, 60, 80, 95]);
    assert!(percents.windows(2).all(|w| w[0] <= w[1]));

    let last = events.last().expect("events published");
    assert_eq!(last.kind(), EventKind::Completed);
    assert_eq!(last.owner_id, OwnerId::from("alice"));
}

#[tokio::test]
async fn retriggering_terminal_job_is_noop() {
    let h = TestHarness::new().await;
    let job = h.completed_job("alice", &clip()).await;
    let mut rx = h.ctx.event_bus.subscribe();

    let outcome = processor::run(&h.ctx, job.id).await.unwrap();
    assert_eq!(outcome, RunOutcome::Skipped);

    let after = h.job(&job).await;
    assert_eq!(after.status, JobStatus::Completed);
    assert_eq!(after.attempt, job.attempt);
    assert_eq!(after.completed_at, job.completed_at);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn missing_job_is_not_found() {
    let h = TestHarness::new().await;
    let err = processor::run(&h.ctx, JobId::new()).await.unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
}

#[tokio::test]
async fn threshold_boundary() {
    let below = TestHarness::with_scorer(Config::default(), Arc::new(FixedScorer(69.0))).await;
    let job = below.completed_job("alice", &clip()).await;
    assert_eq!(job.safety_verdict, SafetyVerdict::Safe);

    let at = TestHarness::with_scorer(Config::default(), Arc::new(FixedScorer(70.0))).await;
    let job = at.completed_job("alice", &clip()).await;
    assert_eq!(job.safety_verdict, SafetyVerdict::Flagged);
    assert_eq!(job.safety_score, Some(70.0));
}

#[tokio::test]
async fn stage_fault_fails_job_and_keeps_partial_progress() {
    let h = TestHarness::new().await;
    let job = h.queued_job("alice", &[0x42; 4096]).await;
    let mut rx = h.ctx.event_bus.subscribe();

    let outcome = processor::run(&h.ctx, job.id).await.unwrap();
    assert_eq!(outcome, RunOutcome::Failed);

    let job = h.job(&job).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.progress, 10);
    assert_eq!(job.safety_verdict, SafetyVerdict::Pending);
    assert!(job.metadata.is_none());
    let detail = job.error_detail.expect("error detail");
    assert!(detail.starts_with("extract_metadata: unsupported format"), "{detail}");

    let mut kinds = Vec::new();
    while let Ok(event) = rx.try_recv() {
        kinds.push(event.kind());
    }
    assert_eq!(kinds, vec![EventKind::Progress, EventKind::Failed]);
}

#[tokio::test]
async fn size_mismatch_is_corrupt_upload() {
    let h = TestHarness::new().await;
    let blob = h.store_blob(&clip()).await;
    let new = mf_db::models::NewJob::new(OwnerId::from("alice"), blob, 1, "video/mp4", "short");
    let job = mf_db::queries::jobs::create_job(&h.conn(), &new).unwrap();

    assert_eq!(processor::run(&h.ctx, job.id).await.unwrap(), RunOutcome::Failed);
    let job = h.job(&job).await;
    assert_eq!(job.progress, 0);
    assert!(job.error_detail.unwrap().starts_with("validate: corrupt upload"));
}

#[tokio::test]
async fn cancel_queued_job_fails_it_immediately() {
    let h = TestHarness::new().await;
    let job = h.queued_job("alice", &clip()).await;

    let cancelled = processor::cancel(&h.ctx, &OwnerId::from("alice"), job.id).unwrap();
    assert_eq!(cancelled.status, JobStatus::Failed);
    assert_eq!(cancelled.error_detail.as_deref(), Some("cancelled"));

    assert_eq!(processor::run(&h.ctx, job.id).await.unwrap(), RunOutcome::Skipped);
    assert!(matches!(
        processor::cancel(&h.ctx, &OwnerId::from("alice"), job.id),
        Err(Error::Conflict(_))
    ));
}

#[tokio::test]
async fn cancel_requires_ownership() {
    let h = TestHarness::new().await;
    let job = h.queued_job("alice", &clip()).await;
    assert!(matches!(
        processor::cancel(&h.ctx, &OwnerId::from("bob"), job.id),
        Err(Error::NotFound { .. })
    ));
    assert_eq!(h.job(&job).await.status, JobStatus::Queued);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancel_processing_job_stops_at_stage_boundary() {
    let h = TestHarness::with_scorer(
        Config::default(),
        Arc::new(SlowScorer(Duration::from_millis(500))),
    )
    .await;
    let job = h.queued_job("alice", &clip()).await;

    processor::trigger(&h.ctx, job.id);
    for _ in 0..100 {
        if h.ctx.active_runs.contains_key(&job.id) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(h.ctx.active_runs.contains_key(&job.id), "run never started");

    let signalled = processor::cancel(&h.ctx, &OwnerId::from("alice"), job.id).unwrap();
    assert_eq!(signalled.status, JobStatus::Processing);

    let job = h.wait_for_status(&job, JobStatus::Failed).await;
    assert_eq!(job.error_detail.as_deref(), Some("executor: cancelled"));
    assert!(job.progress < 100);
}

#[tokio::test]
async fn delete_refuses_processing_and_releases_blob() {
    let h = TestHarness::new().await;
    let alice = OwnerId::from("alice");

    let busy = h.queued_job("alice", &clip()).await;
    mf_db::queries::jobs::claim_job(&h.conn(), busy.id).unwrap().unwrap();
    assert!(matches!(
        processor::delete(&h.ctx, &alice, busy.id).await,
        Err(Error::Conflict(_))
    ));

    let done = h.completed_job("alice", &clip()).await;
    assert!(matches!(
        processor::delete(&h.ctx, &OwnerId::from("bob"), done.id).await,
        Err(Error::NotFound { .. })
    ));

    let removed = processor::delete(&h.ctx, &alice, done.id).await.unwrap();
    assert_eq!(removed.id, done.id);
    assert!(mf_db::queries::jobs::get_job(&h.conn(), done.id).unwrap().is_none());
    assert!(matches!(
        h.ctx.store.size(&done.blob_ref).await,
        Err(Error::NotFound { .. })
    ));
}

#[tokio::test]
async fn fresh_processing_job_is_left_alone() {
    let h = TestHarness::new().await;
    let job = h.queued_job("alice", &clip()).await;
    mf_db::queries::jobs::claim_job(&h.conn(), job.id).unwrap().unwrap();

    assert_eq!(processor::run(&h.ctx, job.id).await.unwrap(), RunOutcome::Skipped);
    assert_eq!(processor::sweep_stale(&h.ctx).unwrap(), 0);
    assert_eq!(h.job(&job).await.attempt, 1);
}

#[tokio::test]
async fn stale_processing_job_is_restarted() {
    let mut config = Config::default();
    config.pipeline.stale_after_secs = 0;
    let h = TestHarness::with_config(config).await;

    let job = h.queued_job("alice", &clip()).await;
    // A run that claimed the job and then died.
    mf_db::queries::jobs::claim_job(&h.conn(), job.id).unwrap().unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(processor::run(&h.ctx, job.id).await.unwrap(), RunOutcome::Completed);
    let job = h.job(&job).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.attempt, 2);

    // The abandoned run can no longer write.
    assert!(!mf_db::queries::jobs::fail_job(&h.conn(), job.id, 1, "late").unwrap());
}

#[tokio::test]
async fn startup_recovery_triggers_queued_jobs() {
    let h = TestHarness::new().await;
    let a = h.queued_job("alice", &clip()).await;
    let b = h.queued_job("bob", &clip()).await;

    assert_eq!(processor::recover_on_startup(&h.ctx).unwrap(), 2);
    h.wait_for_status(&a, JobStatus::Completed).await;
    h.wait_for_status(&b, JobStatus::Completed).await;
}
