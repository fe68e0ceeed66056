//! Campaign job triggers.
//!
//! `POST /run-job` runs one specific pending job; `POST /worker` claims and
//! runs the oldest pending message-channel job. Both are synchronous: the
//! response carries the finished run report, so the caller's timeout bounds
//! the campaign run.

use axum::{extract::State, Json};
use herald_core::models::{CampaignJobId, JobStatus};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::ApiError;
use crate::state::AppState;

/// Body of `POST /run-job`.
#[derive(Debug, Deserialize)]
pub struct RunJobRequest {
    /// Campaign job to run. Must be pending.
    pub job_id: Uuid,
}

/// Runs one specific campaign job to completion.
pub async fn run_job(
    State(state): State<AppState>,
    Json(req): Json<RunJobRequest>,
) -> Result<Json<Value>, ApiError> {
    let report = state.worker.run_job(CampaignJobId(req.job_id)).await?;
    tracing::info!(
        job_id = %report.job_id,
        status = %report.status,
        success = report.success,
        fail = report.fail,
        "campaign job run finished"
    );
    Ok(Json(json!({ "report": report })))
}

/// Claims and runs the next pending sms/chat job, if any.
pub async fn run_worker(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    match state.worker.run_next(true).await? {
        Some(report) => {
            tracing::info!(
                job_id = %report.job_id,
                status = %report.status,
                "worker pass finished"
            );
            Ok(Json(json!({ "claimed": true, "report": report })))
        },
        None => Ok(Json(json!({ "claimed": false }))),
    }
}

/// Campaign job counts by status, without claiming anything.
pub async fn jobs_status(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let repo = &state.storage.campaign_jobs;
    let pending = repo.count_by_status(JobStatus::Pending).await?;
    let processing = repo.count_by_status(JobStatus::Processing).await?;
    let completed = repo.count_by_status(JobStatus::Completed).await?;
    let failed = repo.count_by_status(JobStatus::Failed).await?;

    Ok(Json(json!({
        "pending": pending,
        "processing": processing,
        "completed": completed,
        "failed": failed,
    })))
}

/// Worker-view status: how much pending work a trigger would find.
pub async fn worker_status(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let pending = state.storage.campaign_jobs.count_by_status(JobStatus::Pending).await?;
    Ok(Json(json!({ "pending": pending })))
}
