//! Upload intake.
//!
//! The raw request body is streamed chunk by chunk into a new blob, sealed,
//! and handed to the processor as a `queued` job. Bad input is rejected
//! before any job exists and the partial blob is discarded.

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::{Extension, Json};
use futures::StreamExt;
use serde::Deserialize;

use mf_core::{Error, Result};
use mf_db::models::{Job, NewJob};
use mf_storage::BlobWriter;

use crate::context::AppContext;
use crate::error::AppError;
use crate::middleware::auth::Identity;
use crate::middleware::request_id::RequestId;
use crate::processor;
use crate::routes::jobs::JobResponse;

/// Original client-side file name, used as the fallback title.
pub const X_FILE_NAME: &str = "x-file-name";

/// Descriptive fields supplied alongside the body.
#[derive(Debug, Default, Deserialize)]
pub struct UploadParams {
    pub title: Option<String>,
    pub description: Option<String>,
    /// Comma separated.
    pub tags: Option<String>,
}

/// POST /api/uploads
pub async fn upload(
    State(ctx): State<AppContext>,
    Extension(identity): Extension<Identity>,
    Extension(request_id): Extension<RequestId>,
    Query(params): Query<UploadParams>,
    headers: HeaderMap,
    body: Body,
) -> std::result::Result<impl IntoResponse, AppError> {
    let job = intake(&ctx, &identity, params, &headers, body)
        .await
        .map_err(|e| AppError::from(e).with_request_id(request_id.0))?;
    Ok((StatusCode::CREATED, Json(JobResponse::from_model(&job))))
}

fn header_str<'a>(headers: &'a HeaderMap, name: impl header::AsHeaderName) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Media type without parameters, lowercased.
fn media_type(headers: &HeaderMap) -> String {
    header_str(headers, header::CONTENT_TYPE)
        .and_then(|v| v.split(';').next())
        .map(|v| v.trim().to_ascii_lowercase())
        .unwrap_or_default()
}

fn parse_tags(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect()
    })
    .unwrap_or_default()
}

async fn intake(
    ctx: &AppContext,
    identity: &Identity,
    params: UploadParams,
    headers: &HeaderMap,
    body: Body,
) -> Result<Job> {
    identity.require_editor()?;

    let content_type = media_type(headers);
    if !content_type.starts_with("video/") {
        return Err(Error::Validation(format!(
            "unsupported content type '{content_type}', expected video/*"
        )));
    }

    let max = ctx.config.server.max_upload_bytes;
    if let Some(declared) = header_str(headers, header::CONTENT_LENGTH).and_then(|v| v.parse::<u64>().ok()) {
        if declared == 0 {
            return Err(Error::Validation("upload body is empty".into()));
        }
        if declared > max {
            return Err(Error::Validation(format!("upload exceeds the {max} byte limit")));
        }
    }

    let mut writer = ctx.store.create().await?;
    let copied = match copy_body(writer.as_mut(), body, max).await {
        Ok(()) if writer.written() == 0 => Err(Error::Validation("upload body is empty".into())),
        other => other,
    };
    if let Err(e) = copied {
        let blob = writer.blob_ref().clone();
        if let Err(abort_err) = writer.abort().await {
            tracing::warn!(blob = %blob, "Failed to discard rejected upload: {abort_err}");
        }
        return Err(e);
    }
    let sealed = writer.seal().await?;

    let file_name = header_str(headers, X_FILE_NAME).map(String::from);
    let title = params
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .or_else(|| file_name.clone())
        .unwrap_or_else(|| "untitled".to_string());

    let mut new = NewJob::new(
        identity.owner_id.clone(),
        sealed.blob_ref.clone(),
        sealed.size,
        content_type,
        title,
    );
    new.description = params.description.unwrap_or_default();
    new.tags = parse_tags(params.tags.as_deref());
    new.file_name = file_name;

    match processor::submit(ctx, &new) {
        Ok(job) => Ok(job),
        Err(e) => {
            if let Err(rm) = ctx.store.remove(&sealed.blob_ref).await {
                tracing::warn!(blob = %sealed.blob_ref, "Failed to release orphaned blob: {rm}");
            }
            Err(e)
        }
    }
}

async fn copy_body(writer: &mut dyn BlobWriter, body: Body, max: u64) -> Result<()> {
    let mut stream = body.into_data_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| Error::Validation(format!("upload interrupted: {e}")))?;
        if writer.written() + chunk.len() as u64 > max {
            return Err(Error::Validation(format!("upload exceeds the {max} byte limit")));
        }
        writer.append(&chunk).await?;
    }
    Ok(())
}
