//! Rust structs mapping to database tables.

use mf_core::{BlobRef, DerivedMetadata, JobId, JobStatus, OwnerId, SafetyVerdict};
use rusqlite::types::Type;
use serde::de::DeserializeOwned;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// helpers
// ---------------------------------------------------------------------------

fn conversion_error(
    idx: usize,
    err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
}

/// Parse a UUID-based ID from a text column.
fn parse_id<T: From<Uuid>>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T> {
    let s: String = row.get(idx)?;
    let uuid = Uuid::parse_str(&s).map_err(|e| conversion_error(idx, e))?;
    Ok(T::from(uuid))
}

/// Parse an enum stored by its `Display` form.
fn parse_enum<T>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    let s: String = row.get(idx)?;
    s.parse().map_err(|e: String| conversion_error(idx, e))
}

/// Parse an optional JSON text column.
fn parse_json<T: DeserializeOwned>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Option<T>> {
    let s: Option<String> = row.get(idx)?;
    match s {
        Some(v) => serde_json::from_str(&v)
            .map(Some)
            .map_err(|e| conversion_error(idx, e)),
        None => Ok(None),
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// One submitted media item and its pipeline state.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub owner_id: OwnerId,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub file_name: Option<String>,
    pub blob_ref: BlobRef,
    pub size_bytes: u64,
    pub content_type: String,
    pub status: JobStatus,
    pub progress: u8,
    pub stage_label: Option<String>,
    pub safety_verdict: SafetyVerdict,
    pub safety_score: Option<f64>,
    /// Complete snapshot, written only together with `completed`.
    pub metadata: Option<DerivedMetadata>,
    /// Facts gathered by the stages that have run so far.
    pub partial_metadata: Option<DerivedMetadata>,
    pub error_detail: Option<String>,
    pub view_count: i64,
    /// Incremented on every claim; writes from a superseded run are ignored.
    pub attempt: i64,
    pub created_at: String,
    pub started_at: Option<String>,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

impl Job {
    /// Build from a row selected as [`crate::queries::jobs::COLS`].
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: parse_id(row, 0)?,
            owner_id: OwnerId::new(row.get::<_, String>(1)?),
            title: row.get(2)?,
            description: row.get(3)?,
            tags: parse_json(row, 4)?.unwrap_or_default(),
            file_name: row.get(5)?,
            blob_ref: BlobRef::new(row.get::<_, String>(6)?),
            size_bytes: row.get::<_, i64>(7)?.max(0) as u64,
            content_type: row.get(8)?,
            status: parse_enum(row, 9)?,
            progress: row.get::<_, i64>(10)?.clamp(0, 100) as u8,
            stage_label: row.get(11)?,
            safety_verdict: parse_enum(row, 12)?,
            safety_score: row.get(13)?,
            metadata: parse_json(row, 14)?,
            partial_metadata: parse_json(row, 15)?,
            error_detail: row.get(16)?,
            view_count: row.get(17)?,
            attempt: row.get(18)?,
            created_at: row.get(19)?,
            started_at: row.get(20)?,
            updated_at: row.get(21)?,
            completed_at: row.get(22)?,
        })
    }

    pub fn is_owned_by(&self, owner: &OwnerId) -> bool {
        &self.owner_id == owner
    }
}

/// Intake data for a new job.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub owner_id: OwnerId,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub file_name: Option<String>,
    pub blob_ref: BlobRef,
    pub size_bytes: u64,
    pub content_type: String,
}

impl NewJob {
    /// Minimal intake record with empty description and tags.
    pub fn new(
        owner_id: OwnerId,
        blob_ref: BlobRef,
        size_bytes: u64,
        content_type: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            owner_id,
            title: title.into(),
            description: String::new(),
            tags: Vec::new(),
            file_name: None,
            blob_ref,
            size_bytes,
            content_type: content_type.into(),
        }
    }
}

/// Owner listing filters.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub verdict: Option<SafetyVerdict>,
    /// Free-text match over title and description.
    pub search: Option<String>,
}
