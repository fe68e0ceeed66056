//! Shared-secret bearer check for the trigger endpoints.
//!
//! Compares the Authorization bearer token against the configured
//! scheduler token. With no token configured the check is a no-op and the
//! endpoints are open, a deliberate convenience for non-production
//! environments.

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::state::AppState;

/// Extracts the bearer token from the Authorization header.
fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
}

/// Errors produced by the trigger token check.
#[derive(Debug)]
pub enum AuthError {
    /// The Authorization header is missing.
    MissingHeader,
    /// The presented token does not match.
    InvalidToken,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let message = match self {
            Self::MissingHeader => "missing Authorization header",
            Self::InvalidToken => "invalid trigger token",
        };
        (StatusCode::UNAUTHORIZED, message).into_response()
    }
}

/// Axum middleware guarding the scheduler and worker triggers.
pub async fn trigger_auth(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    if let Some(expected) = state.scheduler_token.as_deref() {
        let presented = extract_bearer(req.headers()).ok_or(AuthError::MissingHeader)?;
        if presented != expected {
            return Err(AuthError::InvalidToken);
        }
    }

    Ok(next.run(req).await)
}
