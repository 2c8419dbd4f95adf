//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`] which creates a temp-dir SQLite database and
//! media store, a fixed-score classifier, and a full [`AppContext`]. The
//! [`TestHarness::with_server`] constructor starts Axum on a random port for
//! HTTP-level testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tempfile::TempDir;

use mf_core::config::Config;
use mf_core::{BlobRef, JobStatus, OwnerId};
use mf_db::models::{Job, NewJob};
use mf_db::pool::{init_pool, DbPool};
use mf_pipeline::classifier::FixedScorer;
use mf_pipeline::{ContentScorer, SafetyClassifier};
use mf_server::processor::{self, RunOutcome};
use mf_server::router::build_router;
use mf_server::AppContext;
use mf_storage::FsMediaStore;

/// Test harness wrapping a fully-constructed [`AppContext`].
pub struct TestHarness {
    pub ctx: AppContext,
    pub db: DbPool,
    _dir: TempDir,
}

impl TestHarness {
    /// Default configuration, scorer fixed at 10 (safe).
    pub async fn new() -> Self {
        Self::with_config(Config::default()).await
    }

    pub async fn with_config(config: Config) -> Self {
        Self::with_scorer(config, Arc::new(FixedScorer(10.0))).await
    }

    pub async fn with_scorer(config: Config, scorer: Arc<dyn ContentScorer>) -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        // On disk rather than in memory: concurrent runs need WAL and the
        // busy timeout.
        let db_path = dir.path().join("mediaflow.db");
        let db = init_pool(&db_path.to_string_lossy()).expect("failed to create pool");
        let store = FsMediaStore::open(dir.path().join("media"))
            .await
            .expect("failed to open media store");
        let classifier = SafetyClassifier::new(scorer, config.classification.threshold);
        let ctx = AppContext::new(config, db.clone(), Arc::new(store), classifier);

        Self { ctx, db, _dir: dir }
    }

    /// Start an Axum server on a random port and return the harness together
    /// with the bound socket address.
    pub async fn with_server() -> (Self, SocketAddr) {
        Self::serve(Self::new().await).await
    }

    /// Start an Axum server with custom config on a random port.
    pub async fn with_server_config(config: Config) -> (Self, SocketAddr) {
        Self::serve(Self::with_config(config).await).await
    }

    async fn serve(harness: Self) -> (Self, SocketAddr) {
        let app = harness.router();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        (harness, addr)
    }

    pub fn router(&self) -> Router {
        build_router(self.ctx.clone())
    }

    /// Get a database connection from the pool.
    pub fn conn(&self) -> mf_db::pool::PooledConnection {
        mf_db::pool::get_conn(&self.db).expect("failed to get db connection")
    }

    /// Write and seal a blob.
    pub async fn store_blob(&self, bytes: &[u8]) -> BlobRef {
        let mut writer = self.ctx.store.create().await.expect("create blob");
        writer.append(bytes).await.expect("append blob");
        writer.seal().await.expect("seal blob").blob_ref
    }

    /// Persist a `queued` job without triggering it.
    pub async fn queued_job(&self, owner: &str, bytes: &[u8]) -> Job {
        let blob = self.store_blob(bytes).await;
        let new = NewJob::new(
            OwnerId::from(owner),
            blob,
            bytes.len() as u64,
            "video/mp4",
            "test clip",
        );
        mf_db::queries::jobs::create_job(&self.conn(), &new).expect("create job")
    }

    /// Persist a job and run its pipeline to completion.
    pub async fn completed_job(&self, owner: &str, bytes: &[u8]) -> Job {
        let job = self.queued_job(owner, bytes).await;
        let outcome = processor::run(&self.ctx, job.id).await.expect("run job");
        assert_eq!(outcome, RunOutcome::Completed);
        self.job(&job).await
    }

    /// Reload a job.
    pub async fn job(&self, job: &Job) -> Job {
        mf_db::queries::jobs::get_job(&self.conn(), job.id)
            .expect("load job")
            .expect("job exists")
    }

    /// Poll until the job reaches `status` or a few seconds pass.
    pub async fn wait_for_status(&self, job: &Job, status: JobStatus) -> Job {
        for _ in 0..200 {
            let current = self.job(job).await;
            if current.status == status {
                return current;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        panic!("job {} never reached {status}", job.id);
    }
}
