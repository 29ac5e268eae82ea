//! Caller identity
//!
//! Authentication happens upstream; the gateway trusts the `X-User-Id`
//! header set by the auth proxy.

use axum::{extract::FromRequestParts, http::request::Parts};
use dossier_common::errors::{AppError, Result};
use uuid::Uuid;

pub const USER_ID_HEADER: &str = "x-user-id";

/// The authenticated uploader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Uploader(pub Uuid);

impl<S> FromRequestParts<S> for Uploader
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| Uuid::parse_str(s.trim()).ok())
            .filter(|id| !id.is_nil())
            .map(Uploader)
            .ok_or_else(|| AppError::Unauthorized {
                message: "Missing or invalid X-User-Id header".to_string(),
            })
    }
}
