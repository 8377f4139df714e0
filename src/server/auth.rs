//! Shared-token authentication.

use super::error::ApiError;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::warn;

/// Header carrying the shared token.
pub const AUTH_HEADER: &str = "x-auth-token";

/// Rejects requests whose `x-auth-token` header does not match the
/// configured token. With no token configured every request passes.
///
/// # Errors
///
/// Returns [`ApiError::unauthorized`] when the header is missing or wrong.
pub async fn require_token(
    State(expected): State<Option<Arc<str>>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(token) = expected.as_deref() {
        let presented = request
            .headers()
            .get(AUTH_HEADER)
            .and_then(|value| value.to_str().ok());
        if presented != Some(token) {
            warn!(path = %request.uri().path(), "request rejected: bad auth token");
            return Err(ApiError::unauthorized());
        }
    }
    Ok(next.run(request).await)
}
