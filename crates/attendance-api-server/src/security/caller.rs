use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::utils::error::ApiError;

/// The caller id the upstream identity layer verified and forwarded.
/// This service never sees credentials, only the resulting identity.
pub const CALLER_ID_HEADER: &str = "X-Caller-Id";

#[derive(Debug, Clone)]
pub struct CallerIdentity(pub String);

impl<S> FromRequestParts<S> for CallerIdentity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let caller = parts
            .headers
            .get(CALLER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                ApiError::Unauthorized(format!("Missing {} header", CALLER_ID_HEADER))
            })?;

        Ok(CallerIdentity(caller.to_string()))
    }
}
