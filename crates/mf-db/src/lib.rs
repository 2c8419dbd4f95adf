//! mf-db: the job record store.
//!
//! SQLite-backed persistence with connection pooling, embedded migrations,
//! the [`models::Job`] model, and the job queries the pipeline and the HTTP
//! surface rely on. Every state transition is a single conditional `UPDATE`,
//! so concurrent pipelines coordinate without any process-wide lock.

pub mod migrations;
pub mod models;
pub mod pool;
pub mod queries;

use chrono::{DateTime, SecondsFormat, Utc};

/// Render a timestamp the way every column stores it.
///
/// Fixed-width UTC with millisecond precision, so string comparison in SQL
/// matches chronological order.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// The current time in stored form.
pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}
