//! Repository for automation definitions.
//!
//! The scheduler is the only writer here and only touches the run
//! timestamps; authoring happens in the console, out of scope.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::{
    error::Result,
    models::{Automation, AutomationId},
};

const AUTOMATION_COLUMNS: &str = "id, event_id, template_id, channel, kind, time_type, \
                                  send_at, offset_days, trigger_kind, segmentation, \
                                  is_active, last_run_at, next_run_at";

/// Repository for automation database operations.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Active automations due at or before `now`, oldest due first.
    ///
    /// Due-ness is inclusive: `next_run_at == now` counts as due.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_due(&self, now: DateTime<Utc>) -> Result<Vec<Automation>> {
        let automations = sqlx::query_as::<_, Automation>(&format!(
            r#"
            SELECT {AUTOMATION_COLUMNS} FROM automations
            WHERE is_active = TRUE AND next_run_at IS NOT NULL AND next_run_at <= $1
            ORDER BY next_run_at ASC
            "#
        ))
        .bind(now)
        .fetch_all(&*self.pool)
        .await?;

        Ok(automations)
    }

    /// Counts currently due automations without loading them.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn count_due(&self, now: DateTime<Utc>) -> Result<i64> {
        let count: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM automations
            WHERE is_active = TRUE AND next_run_at IS NOT NULL AND next_run_at <= $1
            "#,
        )
        .bind(now)
        .fetch_one(&*self.pool)
        .await?;

        Ok(count.0)
    }

    /// Records that an automation fired and schedules (or clears) its next
    /// run.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    pub async fn mark_ran(
        &self,
        id: AutomationId,
        ran_at: DateTime<Utc>,
        next_run_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE automations
            SET last_run_at = $2, next_run_at = $3
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(ran_at)
        .bind(next_run_at)
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
