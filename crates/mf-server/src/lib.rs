//! mf-server: HTTP API, job processor, and streaming.
//!
//! This crate ties together all other mf-* crates into a running server
//! application. It provides:
//!
//! - Axum-based HTTP API with authentication and SSE progress
//! - Per-job pipeline runs with cancellation and stale-run recovery
//! - Range-addressable streaming with a batched view counter
//! - Graceful shutdown via signal handling

pub mod context;
pub mod error;
pub mod middleware;
pub mod processor;
pub mod router;
pub mod routes;
pub mod streaming;
pub mod views;

use std::net::SocketAddr;
use std::sync::Arc;

use mf_core::config::Config;
use mf_storage::{FsMediaStore, MediaStore};
use tokio_util::sync::CancellationToken;

pub use crate::context::AppContext;

/// Start the mediaflow server.
///
/// Initializes the database and media store, constructs the [`AppContext`],
/// recovers jobs left behind by a previous process, and serves HTTP until a
/// shutdown signal arrives.
pub async fn start(config: Config) -> mf_core::Result<()> {
    for warning in config.validate() {
        tracing::warn!("Config warning: {warning}");
    }

    // Initialize database.
    let db_path = &config.server.db_path;
    let existed = db_path.exists();
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
            tracing::info!("Created database directory {}", parent.display());
        }
    }
    let db_str = db_path.to_string_lossy();
    let db = mf_db::pool::init_pool(&db_str)?;
    if existed {
        tracing::info!("Database opened (existing) at {db_str}");
    } else {
        tracing::info!("Database created (new) at {db_str}");
    }

    let store: Arc<dyn MediaStore> = Arc::new(FsMediaStore::open(&config.server.storage_dir).await?);
    tracing::info!("Media store at {}", config.server.storage_dir.display());

    let classifier = mf_pipeline::build_classifier(&config.classification)?;
    tracing::info!(
        scorer = classifier.scorer_name(),
        threshold = classifier.threshold(),
        "Classifier ready"
    );

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| mf_core::Error::Internal(format!("Invalid server address: {e}")))?;

    let ctx = AppContext::new(config, db, store, classifier);

    match processor::recover_on_startup(&ctx) {
        Ok(0) => {}
        Ok(n) => tracing::info!(jobs = n, "Recovered unfinished jobs"),
        Err(e) => tracing::error!("Startup recovery failed: {e}"),
    }

    let cancel = CancellationToken::new();

    let sweeper_handle = tokio::spawn(processor::run_stale_sweeper(ctx.clone(), cancel.clone()));
    let views_handle = tokio::spawn(views::run_view_flusher(ctx.clone(), cancel.clone()));

    let app = router::build_router(ctx.clone());

    tracing::info!("Starting server on {addr}");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| mf_core::Error::Internal(format!("Failed to bind to {addr}: {e}")))?;

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await;

    // Signal all background tasks to stop; in-flight runs stop at their
    // next stage boundary and are recovered on the next start.
    cancel.cancel();
    for run in ctx.active_runs.iter() {
        run.token.cancel();
    }

    let _ = tokio::join!(sweeper_handle, views_handle);

    served.map_err(|e| mf_core::Error::Internal(format!("Server error: {e}")))?;
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C, SIGTERM, or the cancellation token.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
        _ = cancel.cancelled() => {}
    }

    tracing::info!("Shutdown signal received");
}
