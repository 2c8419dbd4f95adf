//! Axum router construction.

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::context::AppContext;
use crate::middleware::auth::auth_middleware;
use crate::middleware::request_id::request_id_middleware;
use crate::routes;

/// Build the complete Axum router.
pub fn build_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Uploads enforce `server.max_upload_bytes` while streaming.
    let uploads = Router::new()
        .route("/uploads", post(routes::uploads::upload))
        .layer(DefaultBodyLimit::disable());

    let protected_routes = Router::new()
        .route("/jobs", get(routes::jobs::list_jobs))
        .route(
            "/jobs/{id}",
            get(routes::jobs::get_job)
                .put(routes::jobs::update_job)
                .delete(routes::jobs::delete_job),
        )
        .route("/jobs/{id}/run", post(routes::jobs::run_job))
        .route("/jobs/{id}/cancel", post(routes::jobs::cancel_job))
        .route("/jobs/{id}/stream", get(routes::stream::stream_job))
        .route("/events", get(routes::events::events_handler))
        .merge(uploads)
        .layer(middleware::from_fn_with_state(ctx.clone(), auth_middleware));

    Router::new()
        .route("/health", get(routes::health::health_check))
        .nest("/api", protected_routes)
        .layer(middleware::from_fn(request_id_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}
