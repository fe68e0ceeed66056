//! Health and readiness probes.

use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};

use crate::state::AppState;

/// Full health check: verifies database connectivity.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match state.storage.health_check().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "healthy", "database": "up" }))),
        Err(err) => {
            tracing::error!(error = %err, "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unhealthy", "database": "down" })),
            )
        },
    }
}

/// Liveness probe: the process is running and serving requests.
pub async fn liveness_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "alive" })))
}

/// Readiness probe: the service can take traffic (database reachable).
pub async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match state.storage.health_check().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ready" }))),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "status": "not ready" }))),
    }
}
