//! Shared application state passed to all route handlers and background
//! tasks.

use std::sync::Arc;

use dashmap::DashMap;
use mf_core::config::Config;
use mf_core::events::EventBus;
use mf_core::JobId;
use mf_db::pool::DbPool;
use mf_pipeline::{default_stages, PipelineExecutor, SafetyClassifier};
use mf_storage::MediaStore;
use tokio::sync::Semaphore;

use crate::processor::ActiveRun;
use crate::views::ViewCounter;

/// Shared application state available to every Axum handler via
/// `State<AppContext>`.
///
/// All fields are cheaply cloneable (`Arc` or pool handles).
#[derive(Clone)]
pub struct AppContext {
    /// Database connection pool.
    pub db: DbPool,
    /// Immutable application configuration snapshot.
    pub config: Arc<Config>,
    /// Broadcast event bus for SSE.
    pub event_bus: Arc<EventBus>,
    /// Blob storage for uploaded media.
    pub store: Arc<dyn MediaStore>,
    /// The fixed stage sequence every job runs through.
    pub executor: Arc<PipelineExecutor>,
    /// Runs owned by this process, keyed by job, for cancellation.
    pub active_runs: Arc<DashMap<JobId, ActiveRun>>,
    /// Caps the number of pipelines executing at once.
    pub run_slots: Arc<Semaphore>,
    /// Pending view increments awaiting a flush.
    pub views: Arc<ViewCounter>,
}

impl AppContext {
    /// Assemble a context, building the stage list from `config.pipeline`.
    pub fn new(
        config: Config,
        db: DbPool,
        store: Arc<dyn MediaStore>,
        classifier: SafetyClassifier,
    ) -> Self {
        let executor = PipelineExecutor::new(default_stages(&config.pipeline, classifier));
        let slots = config.pipeline.max_concurrent_jobs.max(1);

        Self {
            db,
            config: Arc::new(config),
            event_bus: Arc::new(EventBus::default()),
            store,
            executor: Arc::new(executor),
            active_runs: Arc::new(DashMap::new()),
            run_slots: Arc::new(Semaphore::new(slots)),
            views: Arc::new(ViewCounter::new()),
        }
    }
}
