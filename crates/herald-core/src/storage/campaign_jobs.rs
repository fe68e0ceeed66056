//! Repository for campaign job records.
//!
//! Claiming uses single-statement conditional updates so overlapping worker
//! invocations can never both move the same job into `processing`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::{
    error::Result,
    models::{CampaignJob, CampaignJobId, JobStatus},
};

const JOB_COLUMNS: &str = "id, event_id, template_id, channel, segmentation, status, \
                           total_count, processed_count, success_count, fail_count, \
                           created_at, updated_at";

/// Repository for campaign job database operations.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Returns a reference to the database pool.
    pub fn pool(&self) -> Arc<PgPool> {
        self.pool.clone()
    }

    /// Inserts a new pending job.
    ///
    /// # Errors
    ///
    /// Returns error if insert fails or constraints are violated.
    pub async fn create(&self, job: &CampaignJob) -> Result<CampaignJobId> {
        let id = sqlx::query_scalar(
            r#"
            INSERT INTO campaign_jobs (
                id, event_id, template_id, channel, segmentation, status,
                total_count, processed_count, success_count, fail_count,
                created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING id
            "#,
        )
        .bind(job.id)
        .bind(job.event_id)
        .bind(job.template_id)
        .bind(job.channel)
        .bind(&job.segmentation)
        .bind(job.status)
        .bind(job.total_count)
        .bind(job.processed_count)
        .bind(job.success_count)
        .bind(job.fail_count)
        .bind(job.created_at)
        .bind(job.updated_at)
        .fetch_one(&*self.pool)
        .await?;

        Ok(CampaignJobId(id))
    }

    /// Atomically claims the oldest pending job, moving it to `processing`.
    ///
    /// The status guard inside a single UPDATE is the concurrency
    /// mechanism: two overlapping invocations can both select the same
    /// candidate, but only one update matches `status = 'pending'` and the
    /// loser observes no claimed job. `FOR UPDATE SKIP LOCKED` on the inner
    /// select keeps concurrent claimers from serializing on one row.
    ///
    /// With `message_only` set, email jobs are skipped; the message worker
    /// endpoint only drains sms/chat campaigns.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    pub async fn claim_oldest_pending(&self, message_only: bool) -> Result<Option<CampaignJob>> {
        let job = sqlx::query_as::<_, CampaignJob>(&format!(
            r#"
            UPDATE campaign_jobs
            SET status = 'processing', updated_at = NOW()
            WHERE id = (
                SELECT id FROM campaign_jobs
                WHERE status = 'pending'
                  AND ($1 = FALSE OR channel <> 'email')
                ORDER BY created_at ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            AND status = 'pending'
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(message_only)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(job)
    }

    /// Atomically claims one specific job if it is still pending.
    ///
    /// Returns `None` when the job does not exist or has already left
    /// `pending`; the caller distinguishes the two with [`find_by_id`].
    ///
    /// [`find_by_id`]: Repository::find_by_id
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    pub async fn claim_by_id(&self, id: CampaignJobId) -> Result<Option<CampaignJob>> {
        let job = sqlx::query_as::<_, CampaignJob>(&format!(
            r#"
            UPDATE campaign_jobs
            SET status = 'processing', updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(job)
    }

    /// Records the resolved recipient count at run start.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    pub async fn set_total(&self, id: CampaignJobId, total: i32) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE campaign_jobs
            SET total_count = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(total)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    /// Persists a counter checkpoint mid-run.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    pub async fn checkpoint_counters(
        &self,
        id: CampaignJobId,
        processed: i32,
        success: i32,
        fail: i32,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE campaign_jobs
            SET processed_count = $2,
                success_count = $3,
                fail_count = $4,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(processed)
        .bind(success)
        .bind(fail)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    /// Writes the terminal status together with the final counters.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    pub async fn finish(
        &self,
        id: CampaignJobId,
        status: JobStatus,
        processed: i32,
        success: i32,
        fail: i32,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE campaign_jobs
            SET status = $2,
                processed_count = $3,
                success_count = $4,
                fail_count = $5,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(processed)
        .bind(success)
        .bind(fail)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    /// Finds a job by id.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_by_id(&self, id: CampaignJobId) -> Result<Option<CampaignJob>> {
        let job = sqlx::query_as::<_, CampaignJob>(&format!(
            "SELECT {JOB_COLUMNS} FROM campaign_jobs WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(job)
    }

    /// Counts jobs in a given status. Used by the status endpoints.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn count_by_status(&self, status: JobStatus) -> Result<i64> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM campaign_jobs WHERE status = $1")
                .bind(status)
                .fetch_one(&*self.pool)
                .await?;

        Ok(count.0)
    }

    /// Lists jobs created after a point in time, newest first.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn list_recent(&self, since: DateTime<Utc>, limit: i64) -> Result<Vec<CampaignJob>> {
        let jobs = sqlx::query_as::<_, CampaignJob>(&format!(
            r#"
            SELECT {JOB_COLUMNS} FROM campaign_jobs
            WHERE created_at >= $1
            ORDER BY created_at DESC
            LIMIT $2
            "#
        ))
        .bind(since)
        .bind(limit)
        .fetch_all(&*self.pool)
        .await?;

        Ok(jobs)
    }
}
