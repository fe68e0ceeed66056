//! Claim/run/retry orchestration over the queue store.

use std::{future::Future, pin::Pin, sync::Arc, time::Duration};

use herald_core::{
    error::Result,
    models::{QueueJob, QueueJobId},
    Clock,
};
use tracing::{info, warn};

use crate::store::QueueStore;

/// Default retry budget for jobs enqueued without an explicit limit.
pub const DEFAULT_MAX_RETRIES: i32 = 3;

/// Handler invoked with a claimed job's payload.
///
/// Returns `Err` with a human-readable message on failure; the queue treats
/// handler errors and timeouts identically (retry, then terminal failure).
/// Implemented for async closures, so tests and call sites can pass
/// `|payload| async move { ... }` directly.
pub trait JobHandler: Send + Sync {
    /// Runs the handler against one payload.
    fn run(
        &self,
        payload: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = std::result::Result<(), String>> + Send + '_>>;
}

impl<F, Fut> JobHandler for F
where
    F: Fn(serde_json::Value) -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<(), String>> + Send + 'static,
{
    fn run(
        &self,
        payload: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = std::result::Result<(), String>> + Send + '_>> {
        Box::pin(self(payload))
    }
}

/// Outcome of running one claimed job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Handler succeeded; job is `done`.
    Done,
    /// Handler failed; job went back to `queued` with this retry count.
    Retried {
        /// Retry count after the release.
        retry_count: i32,
    },
    /// Handler failed with no retries left; job is terminally `failed`.
    Failed,
}

/// The queue facade: enqueue, claim, run, drain.
#[derive(Clone)]
pub struct JobQueue {
    store: Arc<dyn QueueStore>,
    clock: Arc<dyn Clock>,
}

impl JobQueue {
    /// Creates a queue over the given store and clock.
    pub fn new(store: Arc<dyn QueueStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Enqueues a job, collapsing onto an in-flight job when the
    /// idempotency key matches one.
    ///
    /// Re-submitting a key whose job already finished (`done` or `failed`)
    /// creates a fresh job; only in-flight jobs deduplicate.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unreachable.
    pub async fn enqueue(
        &self,
        job_type: &str,
        payload: serde_json::Value,
        idempotency_key: Option<String>,
        max_retries: i32,
    ) -> Result<QueueJobId> {
        if let Some(key) = idempotency_key.as_deref() {
            if let Some(existing) = self.store.find_active_by_key(key).await? {
                info!(job_id = %existing.id, key, "enqueue collapsed onto in-flight job");
                return Ok(existing.id);
            }
        }

        let job = QueueJob::new(
            job_type,
            payload,
            idempotency_key.clone(),
            max_retries,
            self.clock.now(),
        );

        match self.store.insert(job).await {
            Ok(id) => Ok(id),
            // Lost an insert race on the unique key; the winner's job is
            // the one we should return.
            Err(herald_core::CoreError::ConstraintViolation(_)) if idempotency_key.is_some() => {
                let key = idempotency_key.as_deref().unwrap_or_default();
                match self.store.find_active_by_key(key).await? {
                    Some(existing) => Ok(existing.id),
                    None => Err(herald_core::CoreError::ConstraintViolation(format!(
                        "idempotency key {key} collided but no in-flight job found"
                    ))),
                }
            },
            Err(e) => Err(e),
        }
    }

    /// Claims the oldest queued job, optionally filtered by type.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unreachable.
    pub async fn claim_next(&self, job_type: Option<&str>) -> Result<Option<QueueJob>> {
        self.store.claim_next(job_type, self.clock.now()).await
    }

    /// Runs a claimed job's handler against a timeout and settles the job.
    ///
    /// A timeout counts as an ordinary handler failure: the job is retried
    /// while budget remains and terminally failed afterwards.
    ///
    /// # Errors
    ///
    /// Returns error only on store failures; handler failures are encoded
    /// in the returned [`RunOutcome`].
    pub async fn run(
        &self,
        job: &QueueJob,
        handler: &dyn JobHandler,
        timeout: Duration,
    ) -> Result<RunOutcome> {
        let result = tokio::select! {
            result = handler.run(job.payload.0.clone()) => result,
            () = self.clock.sleep(timeout) => {
                Err(format!("handler timed out after {}ms", timeout.as_millis()))
            },
        };

        match result {
            Ok(()) => {
                self.store.mark_done(job.id, self.clock.now()).await?;
                info!(job_id = %job.id, job_type = %job.job_type, "queue job done");
                Ok(RunOutcome::Done)
            },
            Err(error) => {
                if job.retry_count < job.max_retries {
                    let retry_count = job.retry_count + 1;
                    self.store
                        .release_for_retry(job.id, retry_count, &error, self.clock.now())
                        .await?;
                    warn!(job_id = %job.id, retry_count, %error, "queue job released for retry");
                    Ok(RunOutcome::Retried { retry_count })
                } else {
                    self.store.mark_failed(job.id, &error, self.clock.now()).await?;
                    warn!(job_id = %job.id, %error, "queue job terminally failed");
                    Ok(RunOutcome::Failed)
                }
            },
        }
    }

    /// Claims and runs up to `max_jobs` jobs of one type, sleeping
    /// `inter_run_delay` between iterations. Stops early once nothing is
    /// claimable.
    ///
    /// Returns the number of jobs run.
    ///
    /// # Errors
    ///
    /// Returns error if the store is unreachable.
    pub async fn drain(
        &self,
        job_type: &str,
        handler: &dyn JobHandler,
        max_jobs: usize,
        timeout: Duration,
        inter_run_delay: Duration,
    ) -> Result<usize> {
        let mut ran = 0;

        while ran < max_jobs {
            let Some(job) = self.claim_next(Some(job_type)).await? else {
                break;
            };

            self.run(&job, handler, timeout).await?;
            ran += 1;

            if ran < max_jobs && !inter_run_delay.is_zero() {
                self.clock.sleep(inter_run_delay).await;
            }
        }

        Ok(ran)
    }
}
