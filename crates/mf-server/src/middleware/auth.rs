//! Authentication middleware.
//!
//! Resolves the caller's [`Identity`] and injects it into request
//! extensions so handlers can scope every read and write to its owner.
//!
//! Resolution order:
//! 1. `Authorization: Bearer <token>` looked up in `auth.api_keys`.
//! 2. With auth disabled only: the `X-Owner-Id` header, asserted by a
//!    trusted gateway, with the `editor` role.
//!
//! A request that resolves to no identity gets 401.

use axum::extract::State;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use mf_core::config::{AuthConfig, Role};
use mf_core::{Error, OwnerId};

use crate::context::AppContext;
use crate::error::AppError;

/// Gateway-asserted owner header, honoured only when auth is disabled.
pub const X_OWNER_ID: &str = "x-owner-id";

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub owner_id: OwnerId,
    pub role: Role,
}

impl Identity {
    /// Fail with `Forbidden` unless this identity may modify jobs.
    pub fn require_editor(&self) -> mf_core::Result<()> {
        if self.role.can_edit() {
            Ok(())
        } else {
            Err(Error::Forbidden(format!(
                "owner '{}' has read-only access",
                self.owner_id
            )))
        }
    }
}

/// Resolve an identity from raw header values.
pub fn resolve_identity(
    auth: &AuthConfig,
    authorization: Option<&str>,
    owner_header: Option<&str>,
) -> Option<Identity> {
    if let Some(token) = authorization.and_then(|v| v.strip_prefix("Bearer ")) {
        if let Some(key) = auth.api_keys.get(token.trim()) {
            return Some(Identity {
                owner_id: OwnerId::new(key.owner_id.clone()),
                role: key.role,
            });
        }
    }

    if auth.enabled {
        return None;
    }

    owner_header
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|owner| Identity {
            owner_id: OwnerId::from(owner),
            role: Role::Editor,
        })
}

/// Authentication middleware. Applied to `/api` routes only.
pub async fn auth_middleware(
    State(ctx): State<AppContext>,
    mut request: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let authorization = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let owner_header = request
        .headers()
        .get(X_OWNER_ID)
        .and_then(|v| v.to_str().ok());

    match resolve_identity(&ctx.config.auth, authorization, owner_header) {
        Some(identity) => {
            request.extensions_mut().insert(identity);
            Ok(next.run(request).await)
        }
        None => Err(AppError::new(Error::Unauthorized("authentication required".into())).into_response()),
    }
}
