//! Read-side repository for message templates.

use std::sync::Arc;

use sqlx::PgPool;

use crate::{
    error::Result,
    models::{Template, TemplateId},
};

/// Repository for template read operations.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Finds a template by id.
    ///
    /// # Errors
    ///
    /// Returns error if the query fails.
    pub async fn find_by_id(&self, id: TemplateId) -> Result<Option<Template>> {
        let template = sqlx::query_as::<_, Template>(
            r#"
            SELECT id, event_id, channel, subject, html_body, text_body
            FROM templates
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(template)
    }
}
