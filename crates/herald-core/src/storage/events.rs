//! Read-side repository for events.

use std::sync::Arc;

use sqlx::PgPool;

use crate::{
    error::Result,
    models::{Event, EventId},
};

/// Repository for event read operations.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Finds an event by id.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_by_id(&self, id: EventId) -> Result<Option<Event>> {
        let event = sqlx::query_as::<_, Event>(
            "SELECT id, code, name, starts_at, ends_at FROM events WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(event)
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
