//! Database access layer implementing the repository pattern for the
//! campaign pipeline.
//!
//! Repositories translate between domain models and table rows. All
//! database operations go through this module; direct SQL elsewhere is
//! forbidden so claim semantics and counter updates stay in one place.
//!
//! The design needs no multi-row transactions: the only genuine race (job
//! claiming) is handled by single-statement conditional updates inside the
//! relevant repositories.

use std::sync::Arc;

use sqlx::PgPool;

pub mod automations;
pub mod campaign_jobs;
pub mod delivery_logs;
pub mod events;
pub mod follow_ups;
pub mod participants;
pub mod queue_jobs;
pub mod templates;

use crate::error::Result;

/// Container for all repository instances sharing one connection pool.
#[derive(Clone)]
pub struct Storage {
    /// Campaign job records and their claim/counter operations.
    pub campaign_jobs: Arc<campaign_jobs::Repository>,

    /// Append-only per-recipient delivery logs.
    pub delivery_logs: Arc<delivery_logs::Repository>,

    /// Automation definitions evaluated by the scheduler.
    pub automations: Arc<automations::Repository>,

    /// Follow-up definitions evaluated by the scheduler.
    pub follow_ups: Arc<follow_ups::Repository>,

    /// Generic background queue jobs.
    pub queue_jobs: Arc<queue_jobs::Repository>,

    /// Read-side participant rows and table assignments.
    pub participants: Arc<participants::Repository>,

    /// Read-side event rows.
    pub events: Arc<events::Repository>,

    /// Read-side template rows.
    pub templates: Arc<templates::Repository>,
}

impl Storage {
    /// Creates a new storage instance over the given pool.
    pub fn new(pool: PgPool) -> Self {
        let pool = Arc::new(pool);

        Self {
            campaign_jobs: Arc::new(campaign_jobs::Repository::new(pool.clone())),
            delivery_logs: Arc::new(delivery_logs::Repository::new(pool.clone())),
            automations: Arc::new(automations::Repository::new(pool.clone())),
            follow_ups: Arc::new(follow_ups::Repository::new(pool.clone())),
            queue_jobs: Arc::new(queue_jobs::Repository::new(pool.clone())),
            participants: Arc::new(participants::Repository::new(pool.clone())),
            events: Arc::new(events::Repository::new(pool.clone())),
            templates: Arc::new(templates::Repository::new(pool)),
        }
    }

    /// Verifies database connectivity for the readiness probe.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Database` if the connection is unhealthy.
    pub async fn health_check(&self) -> Result<()> {
        let _: (i32,) =
            sqlx::query_as("SELECT 1").fetch_one(&*self.campaign_jobs.pool()).await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn storage_can_be_created() {
        // Instantiation only; queries are covered by integration tests.
        let pool = sqlx::PgPool::connect_lazy("postgresql://test").unwrap();
        let _storage = Storage::new(pool);
    }
}
