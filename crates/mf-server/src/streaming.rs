//! Range-addressable streaming of completed jobs' blobs.
//!
//! Bodies are streamed from the media store in `streaming.chunk_size` reads
//! via `ReaderStream`, so memory stays bounded regardless of blob size.

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use tokio_util::io::ReaderStream;

use mf_core::{Error, JobId, JobStatus, OwnerId, Result};
use mf_db::pool::get_conn;
use mf_db::queries::jobs;

use crate::context::AppContext;

/// An inclusive byte range within a blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// Resolve a `Range` header against a blob of `total` bytes.
///
/// `None` means "serve everything". Accepted forms are `bytes=S-E`,
/// `bytes=S-` and the suffix form `bytes=-N`. An end past the last byte is
/// clamped to it. Anything else, including multiple ranges, is
/// [`Error::RangeNotSatisfiable`].
pub fn resolve_range(header: Option<&str>, total: u64) -> Result<Option<ByteRange>> {
    let Some(value) = header else {
        return Ok(None);
    };
    let unsatisfiable = || Error::RangeNotSatisfiable { total };

    let ranges = value.trim().strip_prefix("bytes=").ok_or_else(unsatisfiable)?;
    if ranges.contains(',') || total == 0 {
        return Err(unsatisfiable());
    }
    let (start_str, end_str) = ranges.split_once('-').ok_or_else(unsatisfiable)?;
    let (start_str, end_str) = (start_str.trim(), end_str.trim());
    let last = total - 1;

    if start_str.is_empty() {
        let suffix: u64 = end_str.parse().map_err(|_| unsatisfiable())?;
        if suffix == 0 {
            return Err(unsatisfiable());
        }
        return Ok(Some(ByteRange {
            start: total.saturating_sub(suffix),
            end: last,
        }));
    }

    let start: u64 = start_str.parse().map_err(|_| unsatisfiable())?;
    let end = if end_str.is_empty() {
        last
    } else {
        let end: u64 = end_str.parse().map_err(|_| unsatisfiable())?;
        if end < start {
            return Err(unsatisfiable());
        }
        end.min(last)
    };
    if start > last {
        return Err(unsatisfiable());
    }

    Ok(Some(ByteRange { start, end }))
}

/// Serve a completed job's blob to its owner.
///
/// Someone else's job is indistinguishable from a missing one. A job that
/// has not completed is [`Error::NotReady`]. Store failures surface as
/// [`Error::StorageUnavailable`]. Every successful serve counts one view.
pub async fn serve(
    ctx: &AppContext,
    owner: &OwnerId,
    id: JobId,
    range_header: Option<&str>,
) -> Result<Response> {
    let job = {
        let conn = get_conn(&ctx.db)?;
        jobs::get_owned_job(&conn, id, owner)?
    }
    .ok_or_else(|| Error::not_found("job", id))?;

    if job.status != JobStatus::Completed {
        return Err(Error::NotReady(format!("job is {}", job.status)));
    }

    let total = ctx
        .store
        .size(&job.blob_ref)
        .await
        .map_err(|e| storage_fault(id, e))?;
    let range = resolve_range(range_header, total)?;
    let (start, len) = match range {
        Some(r) => (r.start, r.len()),
        None => (0, total),
    };

    let reader = ctx
        .store
        .open_range(&job.blob_ref, start, len)
        .await
        .map_err(|e| storage_fault(id, e))?;
    let body = Body::from_stream(ReaderStream::with_capacity(
        reader,
        ctx.config.streaming.chunk_size.max(1),
    ));

    ctx.views.record(id);

    let mut headers = vec![
        (header::CONTENT_TYPE, job.content_type.clone()),
        (header::CONTENT_LENGTH, len.to_string()),
        (header::ACCEPT_RANGES, "bytes".to_string()),
        (header::CACHE_CONTROL, "no-cache".to_string()),
    ];

    let status = match range {
        Some(r) => {
            tracing::debug!(job_id = %id, start = r.start, end = r.end, total, "Serving range");
            headers.push((
                header::CONTENT_RANGE,
                format!("bytes {}-{}/{total}", r.start, r.end),
            ));
            StatusCode::PARTIAL_CONTENT
        }
        None => StatusCode::OK,
    };

    let mut response = (status, body).into_response();
    for (name, value) in headers {
        if let Ok(value) = value.parse() {
            response.headers_mut().insert(name, value);
        }
    }
    Ok(response)
}

fn storage_fault(id: JobId, err: Error) -> Error {
    match err {
        Error::RangeNotSatisfiable { .. } | Error::StorageUnavailable(_) => err,
        other => {
            tracing::error!(job_id = %id, "Blob unreadable: {other}");
            Error::storage(format!("blob for job {id} is unreadable"))
        }
    }
}
