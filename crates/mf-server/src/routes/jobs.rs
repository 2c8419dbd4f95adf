//! Job management route handlers.
//!
//! Every handler is scoped to the caller's own jobs; someone else's job
//! answers exactly like a missing one.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use mf_core::{DerivedMetadata, Error, JobId, JobStatus, SafetyVerdict};
use mf_db::models::{Job, JobFilter};
use mf_db::pool::get_conn;
use mf_db::queries::jobs;

use crate::context::AppContext;
use crate::error::AppError;
use crate::middleware::auth::Identity;
use crate::processor;

const MAX_PAGE_SIZE: u32 = 100;

/// Parse a path id. Malformed ids are reported as not found.
pub fn parse_job_id(raw: &str) -> mf_core::Result<JobId> {
    raw.parse().map_err(|_| Error::not_found("job", raw))
}

/// Job response. The blob reference stays internal.
#[derive(Debug, Serialize)]
pub struct JobResponse {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub file_name: Option<String>,
    pub size_bytes: u64,
    pub content_type: String,
    pub status: JobStatus,
    pub progress: u8,
    pub stage_label: Option<String>,
    pub safety_verdict: SafetyVerdict,
    pub safety_score: Option<f64>,
    /// Final snapshot once completed, otherwise whatever the stages that
    /// ran have gathered.
    pub metadata: Option<DerivedMetadata>,
    pub error_detail: Option<String>,
    pub view_count: i64,
    pub created_at: String,
    pub started_at: Option<String>,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

impl JobResponse {
    pub fn from_model(job: &Job) -> Self {
        let metadata = match job.status {
            JobStatus::Completed => job.metadata.clone(),
            _ => job.partial_metadata.clone(),
        };
        Self {
            id: job.id.to_string(),
            owner_id: job.owner_id.to_string(),
            title: job.title.clone(),
            description: job.description.clone(),
            tags: job.tags.clone(),
            file_name: job.file_name.clone(),
            size_bytes: job.size_bytes,
            content_type: job.content_type.clone(),
            status: job.status,
            progress: job.progress,
            stage_label: job.stage_label.clone(),
            safety_verdict: job.safety_verdict,
            safety_score: job.safety_score,
            metadata,
            error_detail: job.error_detail.clone(),
            view_count: job.view_count,
            created_at: job.created_at.clone(),
            started_at: job.started_at.clone(),
            updated_at: job.updated_at.clone(),
            completed_at: job.completed_at.clone(),
        }
    }
}

/// Query parameters for listing jobs.
#[derive(Debug, Deserialize)]
pub struct ListJobsParams {
    pub status: Option<String>,
    pub safety: Option<String>,
    pub search: Option<String>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_page() -> u32 {
    1
}

fn default_limit() -> u32 {
    20
}

#[derive(Debug, Serialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: i64,
    pub pages: i64,
}

#[derive(Debug, Serialize)]
pub struct JobListResponse {
    pub jobs: Vec<JobResponse>,
    pub pagination: Pagination,
}

impl ListJobsParams {
    fn filter(&self) -> mf_core::Result<JobFilter> {
        let status = self
            .status
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<JobStatus>().map_err(Error::Validation))
            .transpose()?;
        let verdict = self
            .safety
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<SafetyVerdict>().map_err(Error::Validation))
            .transpose()?;
        Ok(JobFilter {
            status,
            verdict,
            search: self.search.clone(),
        })
    }
}

/// GET /api/jobs
pub async fn list_jobs(
    State(ctx): State<AppContext>,
    Extension(identity): Extension<Identity>,
    Query(params): Query<ListJobsParams>,
) -> Result<Json<JobListResponse>, AppError> {
    let filter = params.filter()?;
    let page = params.page.max(1);
    let limit = params.limit.clamp(1, MAX_PAGE_SIZE);

    let conn = get_conn(&ctx.db)?;
    let (rows, total) = jobs::list_jobs_for_owner(&conn, &identity.owner_id, &filter, page, limit)?;

    let pages = (total + i64::from(limit) - 1) / i64::from(limit);
    Ok(Json(JobListResponse {
        jobs: rows.iter().map(JobResponse::from_model).collect(),
        pagination: Pagination {
            page,
            limit,
            total,
            pages,
        },
    }))
}

/// GET /api/jobs/{id}
pub async fn get_job(
    State(ctx): State<AppContext>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<Json<JobResponse>, AppError> {
    let id = parse_job_id(&id)?;
    let conn = get_conn(&ctx.db)?;
    let job = jobs::get_owned_job(&conn, id, &identity.owner_id)?
        .ok_or_else(|| Error::not_found("job", id))?;
    Ok(Json(JobResponse::from_model(&job)))
}

/// Request body for updating a job's descriptive fields.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateJobRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
}

/// PUT /api/jobs/{id}
pub async fn update_job(
    State(ctx): State<AppContext>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateJobRequest>,
) -> Result<Json<JobResponse>, AppError> {
    identity.require_editor()?;
    let id = parse_job_id(&id)?;

    let title = payload.title.as_deref().map(str::trim);
    if title.is_some_and(str::is_empty) {
        return Err(Error::Validation("title must not be empty".into()).into());
    }
    let tags = payload.tags.map(|tags| {
        tags.iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
    });

    let conn = get_conn(&ctx.db)?;
    let job = jobs::update_details(
        &conn,
        id,
        &identity.owner_id,
        title,
        payload.description.as_deref(),
        tags.as_deref(),
    )?
    .ok_or_else(|| Error::not_found("job", id))?;
    Ok(Json(JobResponse::from_model(&job)))
}

/// DELETE /api/jobs/{id}
pub async fn delete_job(
    State(ctx): State<AppContext>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    identity.require_editor()?;
    let id = parse_job_id(&id)?;
    processor::delete(&ctx, &identity.owner_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/jobs/{id}/run
///
/// Re-trigger the pipeline. Accepted even when the job turns out not to be
/// eligible; the trigger is then a no-op.
pub async fn run_job(
    State(ctx): State<AppContext>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    identity.require_editor()?;
    let id = parse_job_id(&id)?;
    let job = {
        let conn = get_conn(&ctx.db)?;
        jobs::get_owned_job(&conn, id, &identity.owner_id)?
    }
    .ok_or_else(|| Error::not_found("job", id))?;

    processor::trigger(&ctx, id);
    Ok((StatusCode::ACCEPTED, Json(JobResponse::from_model(&job))))
}

/// POST /api/jobs/{id}/cancel
pub async fn cancel_job(
    State(ctx): State<AppContext>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    identity.require_editor()?;
    let id = parse_job_id(&id)?;
    let job = processor::cancel(&ctx, &identity.owner_id, id)?;
    Ok((StatusCode::ACCEPTED, Json(JobResponse::from_model(&job))))
}
