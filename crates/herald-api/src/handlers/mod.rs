//! Request handlers.

pub mod health;
pub mod jobs;
pub mod scheduler;

pub use health::{health_check, liveness_check, readiness_check};
pub use jobs::{jobs_status, run_job, run_worker, worker_status};
pub use scheduler::{run_sweep, scheduler_status};

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use herald_delivery::DeliveryError;
use serde_json::json;

/// Error envelope returned by all handlers.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }

    /// An internal error with a generic message; detail goes to the logs
    /// only.
    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<DeliveryError> for ApiError {
    fn from(err: DeliveryError) -> Self {
        match &err {
            DeliveryError::JobNotFound(_) => Self::new(StatusCode::NOT_FOUND, err.to_string()),
            DeliveryError::JobNotClaimable { .. } => {
                Self::new(StatusCode::CONFLICT, err.to_string())
            },
            DeliveryError::TemplateNotFound(_) | DeliveryError::EventNotFound(_) => {
                Self::new(StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
            },
            DeliveryError::Store(_) | DeliveryError::Config(_) => {
                tracing::error!(error = %err, "delivery request failed");
                Self::internal()
            },
        }
    }
}

impl From<herald_core::CoreError> for ApiError {
    fn from(err: herald_core::CoreError) -> Self {
        tracing::error!(error = %err, "storage request failed");
        Self::internal()
    }
}
