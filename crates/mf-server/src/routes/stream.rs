//! Streaming route handler.

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap};
use axum::response::Response;
use axum::Extension;

use crate::context::AppContext;
use crate::error::AppError;
use crate::middleware::auth::Identity;
use crate::routes::jobs::parse_job_id;
use crate::streaming;

/// GET /api/jobs/{id}/stream
///
/// Serve the job's blob with HTTP range request support.
pub async fn stream_job(
    State(ctx): State<AppContext>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let id = parse_job_id(&id)?;
    // An unreadable Range header is present but unparseable, never absent.
    let range = headers
        .get(header::RANGE)
        .map(|v| v.to_str().unwrap_or_default());
    Ok(streaming::serve(&ctx, &identity.owner_id, id, range).await?)
}
