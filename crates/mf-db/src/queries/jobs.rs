//! Job record operations.
//!
//! Status transitions are compare-and-set updates: each one names the status
//! it expects and reports whether a row actually changed. A `false` return
//! means another writer got there first.

use mf_core::{DerivedMetadata, Error, JobId, JobStatus, OwnerId, Result, SafetyVerdict};
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::{Job, JobFilter, NewJob};
use crate::now_timestamp;

pub(crate) const COLS: &str = "id, owner_id, title, description, tags, file_name, blob_ref,
    size_bytes, content_type, status, progress, stage_label, safety_verdict, safety_score,
    metadata, partial_metadata, error_detail, view_count, attempt, created_at, started_at,
    updated_at, completed_at";

fn db_err(e: rusqlite::Error) -> Error {
    Error::database(e.to_string())
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| Error::Internal(format!("json encode: {e}")))
}

fn query_one(conn: &Connection, sql: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Option<Job>> {
    conn.query_row(sql, params, Job::from_row)
        .optional()
        .map_err(db_err)
}

/// Create a new `queued` job.
pub fn create_job(conn: &Connection, new: &NewJob) -> Result<Job> {
    let id = JobId::new();
    let now = now_timestamp();
    let tags = to_json(&new.tags)?;

    conn.execute(
        "INSERT INTO jobs (id, owner_id, title, description, tags, file_name, blob_ref,
             size_bytes, content_type, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 'queued', ?10, ?10)",
        params![
            id.to_string(),
            new.owner_id.as_str(),
            new.title,
            new.description,
            tags,
            new.file_name,
            new.blob_ref.as_str(),
            new.size_bytes as i64,
            new.content_type,
            now,
        ],
    )
    .map_err(db_err)?;

    get_job(conn, id)?.ok_or_else(|| Error::Internal(format!("job {id} vanished after insert")))
}

/// Get a job by ID.
pub fn get_job(conn: &Connection, id: JobId) -> Result<Option<Job>> {
    let q = format!("SELECT {COLS} FROM jobs WHERE id = ?1");
    query_one(conn, &q, &[&id.to_string()])
}

/// Get a job by ID only if `owner` owns it.
pub fn get_owned_job(conn: &Connection, id: JobId, owner: &OwnerId) -> Result<Option<Job>> {
    let q = format!("SELECT {COLS} FROM jobs WHERE id = ?1 AND owner_id = ?2");
    query_one(conn, &q, &[&id.to_string(), &owner.as_str()])
}

/// Atomically move a `queued` job to `processing`.
///
/// Returns the claimed job, or `None` if it was not `queued` when the update
/// ran. Of any number of concurrent callers, at most one gets `Some`.
pub fn claim_job(conn: &Connection, id: JobId) -> Result<Option<Job>> {
    let now = now_timestamp();
    let q = format!(
        "UPDATE jobs SET status = 'processing', attempt = attempt + 1,
             started_at = ?2, updated_at = ?2
         WHERE id = ?1 AND status = 'queued'
         RETURNING {COLS}"
    );
    query_one(conn, &q, &[&id.to_string(), &now])
}

/// Take over a `processing` job whose heartbeat is older than `cutoff`.
///
/// The attempt counter moves on, so the abandoned run can no longer write.
pub fn reclaim_stale_job(conn: &Connection, id: JobId, cutoff: &str) -> Result<Option<Job>> {
    let now = now_timestamp();
    let q = format!(
        "UPDATE jobs SET attempt = attempt + 1, started_at = ?3, updated_at = ?3
         WHERE id = ?1 AND status = 'processing' AND updated_at < ?2
         RETURNING {COLS}"
    );
    query_one(conn, &q, &[&id.to_string(), &cutoff, &now])
}

/// Persist stage progress for the run holding `attempt`.
///
/// Progress never moves backwards: the stored value is the maximum of the
/// current and reported percentages. Also refreshes the heartbeat.
pub fn record_progress(
    conn: &Connection,
    id: JobId,
    attempt: i64,
    percent: u8,
    stage_label: &str,
    partial: &DerivedMetadata,
) -> Result<bool> {
    let partial = to_json(partial)?;
    let n = conn
        .execute(
            "UPDATE jobs SET progress = MAX(progress, ?3), stage_label = ?4,
                 partial_metadata = ?5, updated_at = ?6
             WHERE id = ?1 AND attempt = ?2 AND status = 'processing'",
            params![id.to_string(), attempt, percent.min(100), stage_label, partial, now_timestamp()],
        )
        .map_err(db_err)?;
    Ok(n > 0)
}

/// Terminal success: `processing -> completed` with the final snapshot.
pub fn complete_job(
    conn: &Connection,
    id: JobId,
    attempt: i64,
    metadata: &DerivedMetadata,
    verdict: SafetyVerdict,
    score: f64,
) -> Result<bool> {
    let metadata = to_json(metadata)?;
    let now = now_timestamp();
    let n = conn
        .execute(
            "UPDATE jobs SET status = 'completed', progress = 100,
                 stage_label = 'Completed', metadata = ?3, partial_metadata = ?3,
                 safety_verdict = ?4, safety_score = ?5, error_detail = NULL,
                 updated_at = ?6, completed_at = ?6
             WHERE id = ?1 AND attempt = ?2 AND status = 'processing'",
            params![id.to_string(), attempt, metadata, verdict.as_str(), score, now],
        )
        .map_err(db_err)?;
    Ok(n > 0)
}

/// Terminal failure for the run holding `attempt`: `processing -> failed`.
///
/// Progress and partial metadata are left as they were.
pub fn fail_job(conn: &Connection, id: JobId, attempt: i64, error: &str) -> Result<bool> {
    let now = now_timestamp();
    let n = conn
        .execute(
            "UPDATE jobs SET status = 'failed', error_detail = ?3,
                 updated_at = ?4, completed_at = ?4
             WHERE id = ?1 AND attempt = ?2 AND status = 'processing'",
            params![id.to_string(), attempt, error, now],
        )
        .map_err(db_err)?;
    Ok(n > 0)
}

/// Cancel a job that never started: `queued -> failed`.
pub fn fail_queued_job(conn: &Connection, id: JobId, error: &str) -> Result<bool> {
    let now = now_timestamp();
    let n = conn
        .execute(
            "UPDATE jobs SET status = 'failed', error_detail = ?2,
                 updated_at = ?3, completed_at = ?3
             WHERE id = ?1 AND status = 'queued'",
            params![id.to_string(), error, now],
        )
        .map_err(db_err)?;
    Ok(n > 0)
}

fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// List an owner's jobs, newest first, with optional filters.
///
/// `page` is 1-based. Returns the page and the total number of matching
/// rows.
pub fn list_jobs_for_owner(
    conn: &Connection,
    owner: &OwnerId,
    filter: &JobFilter,
    page: u32,
    limit: u32,
) -> Result<(Vec<Job>, i64)> {
    let mut clauses = vec!["owner_id = ?".to_string()];
    let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(owner.as_str().to_string())];

    if let Some(status) = filter.status {
        clauses.push("status = ?".into());
        params_vec.push(Box::new(status.as_str()));
    }
    if let Some(verdict) = filter.verdict {
        clauses.push("safety_verdict = ?".into());
        params_vec.push(Box::new(verdict.as_str()));
    }
    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        clauses.push(
            "(title LIKE ? ESCAPE '\\' OR description LIKE ? ESCAPE '\\')".into(),
        );
        let pattern = format!("%{}%", escape_like(search));
        params_vec.push(Box::new(pattern.clone()));
        params_vec.push(Box::new(pattern));
    }

    let where_sql = clauses.join(" AND ");
    let filter_refs: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|b| b.as_ref()).collect();

    let total: i64 = conn
        .query_row(
            &format!("SELECT COUNT(*) FROM jobs WHERE {where_sql}"),
            filter_refs.as_slice(),
            |row| row.get(0),
        )
        .map_err(db_err)?;

    let limit = i64::from(limit.max(1));
    let offset = i64::from(page.max(1) - 1) * limit;
    let q = format!(
        "SELECT {COLS} FROM jobs WHERE {where_sql}
         ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?"
    );
    let mut page_refs = filter_refs;
    page_refs.push(&limit);
    page_refs.push(&offset);

    let mut stmt = conn.prepare(&q).map_err(db_err)?;
    let rows = stmt
        .query_map(page_refs.as_slice(), Job::from_row)
        .map_err(db_err)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(db_err)?;
    Ok((rows, total))
}

/// Update the descriptive fields of an owned job. `None` leaves a field as is.
pub fn update_details(
    conn: &Connection,
    id: JobId,
    owner: &OwnerId,
    title: Option<&str>,
    description: Option<&str>,
    tags: Option<&[String]>,
) -> Result<Option<Job>> {
    let tags = tags.map(to_json).transpose()?;
    let q = format!(
        "UPDATE jobs SET title = COALESCE(?3, title),
             description = COALESCE(?4, description),
             tags = COALESCE(?5, tags)
         WHERE id = ?1 AND owner_id = ?2
         RETURNING {COLS}"
    );
    conn.query_row(
        &q,
        params![id.to_string(), owner.as_str(), title, description, tags],
        Job::from_row,
    )
    .optional()
    .map_err(db_err)
}

/// Add `n` to a job's view counter.
pub fn add_views(conn: &Connection, id: JobId, n: u64) -> Result<bool> {
    let changed = conn
        .execute(
            "UPDATE jobs SET view_count = view_count + ?2 WHERE id = ?1",
            params![id.to_string(), n as i64],
        )
        .map_err(db_err)?;
    Ok(changed > 0)
}

/// Delete an owned job unless it is `processing`. Returns the removed row.
pub fn delete_job(conn: &Connection, id: JobId, owner: &OwnerId) -> Result<Option<Job>> {
    let q = format!(
        "DELETE FROM jobs WHERE id = ?1 AND owner_id = ?2 AND status != 'processing'
         RETURNING {COLS}"
    );
    query_one(conn, &q, &[&id.to_string(), &owner.as_str()])
}

/// IDs of `processing` jobs whose heartbeat is older than `cutoff`.
pub fn list_stale_jobs(conn: &Connection, cutoff: &str) -> Result<Vec<JobId>> {
    list_ids(
        conn,
        "SELECT id FROM jobs WHERE status = 'processing' AND updated_at < ?1
         ORDER BY updated_at ASC",
        &[&cutoff],
    )
}

/// IDs of all jobs in `status`, oldest first.
pub fn list_job_ids_by_status(conn: &Connection, status: JobStatus) -> Result<Vec<JobId>> {
    list_ids(
        conn,
        "SELECT id FROM jobs WHERE status = ?1 ORDER BY created_at ASC",
        &[&status.as_str()],
    )
}

fn list_ids(conn: &Connection, sql: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<JobId>> {
    let mut stmt = conn.prepare(sql).map_err(db_err)?;
    let ids = stmt
        .query_map(params, |row| row.get::<_, String>(0))
        .map_err(db_err)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(db_err)?;
    ids.into_iter()
        .map(|s| {
            s.parse::<JobId>()
                .map_err(|e| Error::database(format!("bad job id {s}: {e}")))
        })
        .collect()
}
