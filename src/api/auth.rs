use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use super::error::ApiError;

pub const USER_ID_HEADER: &str = "X-User-Id";

/// Caller identity, as asserted by the fronting gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser(pub String);

impl<S: Send + Sync> FromRequestParts<S> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty() && !id.contains(':'))
            .map(|id| AuthenticatedUser(id.to_string()))
            .ok_or(ApiError::Unauthorized("missing or invalid X-User-Id header"))
    }
}
