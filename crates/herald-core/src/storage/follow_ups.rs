//! Repository for follow-up definitions.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::{
    error::Result,
    models::{FollowUp, FollowUpId},
};

const FOLLOW_UP_COLUMNS: &str = "id, event_id, template_id, channel, base_job_id, \
                                 trigger_type, delay_hours, segmentation, is_active, \
                                 last_run_at, next_run_at";

/// Repository for follow-up database operations.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Active follow-ups due at or before `now`, oldest due first.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_due(&self, now: DateTime<Utc>) -> Result<Vec<FollowUp>> {
        let follow_ups = sqlx::query_as::<_, FollowUp>(&format!(
            r#"
            SELECT {FOLLOW_UP_COLUMNS} FROM follow_ups
            WHERE is_active = TRUE AND next_run_at IS NOT NULL AND next_run_at <= $1
            ORDER BY next_run_at ASC
            "#
        ))
        .bind(now)
        .fetch_all(&*self.pool)
        .await?;

        Ok(follow_ups)
    }

    /// Counts currently due follow-ups without loading them.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn count_due(&self, now: DateTime<Utc>) -> Result<i64> {
        let count: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM follow_ups
            WHERE is_active = TRUE AND next_run_at IS NOT NULL AND next_run_at <= $1
            "#,
        )
        .bind(now)
        .fetch_one(&*self.pool)
        .await?;

        Ok(count.0)
    }

    /// Records that a follow-up fired. Follow-ups are one-shot, so
    /// `next_run_at` is always cleared.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    pub async fn mark_ran(&self, id: FollowUpId, ran_at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE follow_ups
            SET last_run_at = $2, next_run_at = NULL
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(ran_at)
        .execute(&*self.pool)
        .await?;

        Ok(())
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
