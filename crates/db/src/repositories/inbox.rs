use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{InboxRepository, RepositoryError};
use crate::DbPool;

/// Webhook delivery is at-least-once; this repository de-duplicates by
/// channel message id before the orchestrator side-effects anything.
pub struct SqlInboxRepository {
    pool: DbPool,
}

impl SqlInboxRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InboxRepository for SqlInboxRepository {
    async fn insert_if_absent(
        &self,
        message_id: &str,
        received_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO processed_messages (message_id, received_at) VALUES (?1, ?2) \
             ON CONFLICT(message_id) DO NOTHING",
        )
        .bind(message_id)
        .bind(received_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
