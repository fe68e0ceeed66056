//! Repository for the generic background job queue.
//!
//! The claim is a single conditional UPDATE guarded on `status = 'queued'`.
//! A losing racer affects zero rows and observes "no job claimed"; there is
//! no separate read-then-write window to exploit.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::{
    error::Result,
    models::{QueueJob, QueueJobId},
};

const QUEUE_COLUMNS: &str = "id, job_type, payload, status, idempotency_key, retry_count, \
                             max_retries, created_at, updated_at, started_at, completed_at, \
                             error_message";

/// Repository for queue job database operations.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Inserts a new queued job.
    ///
    /// # Errors
    ///
    /// Returns error if insert fails or the idempotency key collides with
    /// another in-flight job.
    pub async fn create(&self, job: &QueueJob) -> Result<QueueJobId> {
        let id = sqlx::query_scalar(
            r#"
            INSERT INTO queue_jobs (
                id, job_type, payload, status, idempotency_key, retry_count,
                max_retries, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id
            "#,
        )
        .bind(job.id)
        .bind(&job.job_type)
        .bind(&job.payload)
        .bind(job.status)
        .bind(&job.idempotency_key)
        .bind(job.retry_count)
        .bind(job.max_retries)
        .bind(job.created_at)
        .bind(job.updated_at)
        .fetch_one(&*self.pool)
        .await?;

        Ok(QueueJobId(id))
    }

    /// Finds an in-flight job (`queued` or `processing`) with the given
    /// idempotency key.
    ///
    /// Terminal jobs do not count: re-submitting a key after its job
    /// finished creates a fresh job.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_active_by_key(&self, key: &str) -> Result<Option<QueueJob>> {
        let job = sqlx::query_as::<_, QueueJob>(&format!(
            r#"
            SELECT {QUEUE_COLUMNS} FROM queue_jobs
            WHERE idempotency_key = $1 AND status IN ('queued', 'processing')
            "#
        ))
        .bind(key)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(job)
    }

    /// Atomically claims the oldest queued job, optionally filtered by
    /// type.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    pub async fn claim_next(
        &self,
        job_type: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Option<QueueJob>> {
        let job = sqlx::query_as::<_, QueueJob>(&format!(
            r#"
            UPDATE queue_jobs
            SET status = 'processing', started_at = $2, updated_at = $2
            WHERE id = (
                SELECT id FROM queue_jobs
                WHERE status = 'queued'
                  AND ($1::text IS NULL OR job_type = $1)
                ORDER BY created_at ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            AND status = 'queued'
            RETURNING {QUEUE_COLUMNS}
            "#
        ))
        .bind(job_type)
        .bind(now)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(job)
    }

    /// Marks a job as successfully completed.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    pub async fn mark_done(&self, id: QueueJobId, now: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE queue_jobs
            SET status = 'done', completed_at = $2, updated_at = $2, error_message = NULL
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    /// Returns a failed job to the queue with an incremented retry count.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    pub async fn release_for_retry(
        &self,
        id: QueueJobId,
        retry_count: i32,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE queue_jobs
            SET status = 'queued', retry_count = $2, error_message = $3, updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(retry_count)
        .bind(error)
        .bind(now)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    /// Marks a job as terminally failed after exhausting retries.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    pub async fn mark_failed(&self, id: QueueJobId, error: &str, now: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE queue_jobs
            SET status = 'failed', error_message = $2, completed_at = $3, updated_at = $3
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(now)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    /// Finds a job by id.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_by_id(&self, id: QueueJobId) -> Result<Option<QueueJob>> {
        let job = sqlx::query_as::<_, QueueJob>(&format!(
            "SELECT {QUEUE_COLUMNS} FROM queue_jobs WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(job)
    }
}
