//! Scheduler sweep trigger.

use axum::{extract::State, Json};
use serde_json::{json, Value};

use super::ApiError;
use crate::state::AppState;

/// Runs one scheduler sweep and reports what fired.
pub async fn run_sweep(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let report = state.scheduler.run_sweep().await?;
    tracing::info!(
        automations = report.automations_processed,
        follow_ups = report.follow_ups_processed,
        created = report.created_jobs.len(),
        errors = report.errors.len(),
        "scheduler sweep finished"
    );
    Ok(Json(json!({ "report": report })))
}

/// Counts of due definitions, without firing anything.
pub async fn scheduler_status(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let (automations, follow_ups) = state.scheduler.due_counts().await?;
    Ok(Json(json!({ "due_automations": automations, "due_follow_ups": follow_ups })))
}
