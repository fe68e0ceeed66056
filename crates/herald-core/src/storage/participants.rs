//! Read-side repository for participants and table assignments.
//!
//! The console owns these tables; the pipeline only reads them to resolve
//! recipients and build merge variables.

use std::sync::Arc;

use sqlx::PgPool;

use crate::{
    error::Result,
    models::{EventId, Participant, ParticipantId},
};

const PARTICIPANT_COLUMNS: &str =
    "id, event_id, name, email, phone, company, language, is_vip, status";

/// Repository for participant read operations.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// All participants of an event in registration order.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn list_by_event(&self, event_id: EventId) -> Result<Vec<Participant>> {
        let participants = sqlx::query_as::<_, Participant>(&format!(
            r#"
            SELECT {PARTICIPANT_COLUMNS} FROM participants
            WHERE event_id = $1
            ORDER BY name ASC
            "#
        ))
        .bind(event_id)
        .fetch_all(&*self.pool)
        .await?;

        Ok(participants)
    }

    /// The participant's confirmed table name, if seated.
    ///
    /// Looked up just-in-time per recipient during a send loop so
    /// late-breaking seating changes are reflected mid-campaign.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn confirmed_table_name(&self, id: ParticipantId) -> Result<Option<String>> {
        let name: Option<String> = sqlx::query_scalar(
            r#"
            SELECT table_name FROM table_assignments
            WHERE participant_id = $1 AND is_confirmed = TRUE
            LIMIT 1
            "#,
        )
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(name)
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
