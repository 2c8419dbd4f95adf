//! Error-to-HTTP response conversion.
//!
//! Implements `IntoResponse` for [`mf_core::Error`] so that route handlers
//! can return `Result<T, AppError>` and use `?` on core errors. Bodies carry
//! the id of the request being handled.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::middleware::request_id;

/// Wrapper so we can implement `IntoResponse` for an external type.
#[derive(Debug)]
pub struct AppError {
    inner: mf_core::Error,
    request_id: Option<String>,
}

impl AppError {
    pub fn new(inner: mf_core::Error) -> Self {
        Self {
            inner,
            request_id: None,
        }
    }

    pub fn with_request_id(mut self, id: String) -> Self {
        self.request_id = Some(id);
        self
    }

    pub fn inner(&self) -> &mf_core::Error {
        &self.inner
    }
}

impl From<mf_core::Error> for AppError {
    fn from(e: mf_core::Error) -> Self {
        Self::new(e)
    }
}

fn error_code(err: &mf_core::Error) -> &'static str {
    use mf_core::Error;
    match err {
        Error::NotFound { .. } => "not_found",
        Error::Unauthorized(_) => "unauthorized",
        Error::Forbidden(_) => "forbidden",
        Error::Validation(_) => "validation_error",
        Error::Conflict(_) => "conflict",
        Error::NotReady(_) => "not_ready",
        Error::RangeNotSatisfiable { .. } => "range_not_satisfiable",
        Error::StorageUnavailable(_) => "storage_unavailable",
        Error::Database { .. } => "database_error",
        Error::Io { .. } => "io_error",
        Error::Stage(fault) => fault.code(),
        Error::Internal(_) => "internal_error",
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.inner.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::error!(
                status = %status,
                error = %self.inner,
                "Server error in API handler"
            );
        }

        let body = json!({
            "error": self.inner.to_string(),
            "code": error_code(&self.inner),
            "request_id": self.request_id.clone().or_else(request_id::current),
        });

        let mut response = (status, axum::Json(body)).into_response();

        if let mf_core::Error::RangeNotSatisfiable { total } = self.inner {
            if let Ok(value) = HeaderValue::from_str(&format!("bytes */{total}")) {
                response.headers_mut().insert(header::CONTENT_RANGE, value);
            }
        }

        response
    }
}
