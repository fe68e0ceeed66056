//! Repository for per-recipient delivery logs.
//!
//! Rows are append-only; the worker writes one per attempted recipient and
//! nothing ever updates or deletes them.

use std::sync::Arc;

use sqlx::PgPool;

use crate::{
    error::Result,
    models::{CampaignJobId, DeliveryLog, DeliveryStatus, ParticipantId},
};

/// Repository for delivery log database operations.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Appends one delivery log row.
    ///
    /// # Errors
    ///
    /// Returns error if insert fails.
    pub async fn create(&self, log: &DeliveryLog) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO delivery_logs (
                id, job_id, recipient_id, address, status, error_message, sent_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(log.id)
        .bind(log.job_id)
        .bind(log.recipient_id)
        .bind(&log.address)
        .bind(log.status)
        .bind(&log.error_message)
        .bind(log.sent_at)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    /// Lists all logs for a job in insertion order.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_by_job(&self, job_id: CampaignJobId) -> Result<Vec<DeliveryLog>> {
        let logs = sqlx::query_as::<_, DeliveryLog>(
            r#"
            SELECT id, job_id, recipient_id, address, status, error_message, sent_at
            FROM delivery_logs
            WHERE job_id = $1
            ORDER BY sent_at ASC NULLS LAST, id ASC
            "#,
        )
        .bind(job_id)
        .fetch_all(&*self.pool)
        .await?;

        Ok(logs)
    }

    /// Recipient ids logged for a job, optionally filtered by outcome.
    ///
    /// `None` returns every logged recipient; used by `after_hours`
    /// follow-ups, while `on_fail`/`on_success` pass the matching status.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn recipient_ids_by_status(
        &self,
        job_id: CampaignJobId,
        status: Option<DeliveryStatus>,
    ) -> Result<Vec<ParticipantId>> {
        let ids: Vec<ParticipantId> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT recipient_id FROM delivery_logs
            WHERE job_id = $1
              AND ($2::text IS NULL OR status = $2)
            "#,
        )
        .bind(job_id)
        .bind(status.map(|s| s.to_string()))
        .fetch_all(&*self.pool)
        .await?;

        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn repository_can_be_created() {
        let pool = sqlx::PgPool::connect_lazy("postgresql://test").unwrap();
        let _repo = Repository::new(Arc::new(pool));
    }
}
