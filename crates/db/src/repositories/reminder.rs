use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;

use agendai_core::domain::account::AccountId;
use agendai_core::domain::reminder::ReminderRecord;

use super::{ReminderRepository, RepositoryError};
use crate::DbPool;

pub struct SqlReminderRepository {
    pool: DbPool,
}

impl SqlReminderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReminderRepository for SqlReminderRepository {
    async fn create(&self, reminder: ReminderRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO reminders (id, user_id, log_id, external_event_ref, title, \
             event_at, fire_at, sent, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .bind(&reminder.id)
        .bind(&reminder.user_id.0)
        .bind(&reminder.log_id)
        .bind(&reminder.external_event_ref)
        .bind(&reminder.title)
        .bind(reminder.event_at)
        .bind(reminder.fire_at)
        .bind(reminder.sent)
        .bind(reminder.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<ReminderRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, user_id, log_id, external_event_ref, title, event_at, fire_at, \
             sent, created_at \
             FROM reminders WHERE sent = 0 AND fire_at <= ?1 ORDER BY fire_at ASC",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(reminder_from_row).collect()
    }

    async fn find_unsent_by_ref(
        &self,
        external_event_ref: &str,
    ) -> Result<Option<ReminderRecord>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, user_id, log_id, external_event_ref, title, event_at, fire_at, \
             sent, created_at \
             FROM reminders WHERE external_event_ref = ?1 AND sent = 0",
        )
        .bind(external_event_ref)
        .fetch_optional(&self.pool)
        .await?;

        row.map(reminder_from_row).transpose()
    }

    async fn mark_sent(&self, id: &str) -> Result<bool, RepositoryError> {
        // Compare-and-set: only one caller can observe sent = 0.
        let result = sqlx::query("UPDATE reminders SET sent = 1 WHERE id = ?1 AND sent = 0")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn reschedule(
        &self,
        id: &str,
        event_at: DateTime<Utc>,
        fire_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE reminders SET event_at = ?2, fire_at = ?3 WHERE id = ?1 AND sent = 0",
        )
        .bind(id)
        .bind(event_at)
        .bind(fire_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete_by_ref(&self, external_event_ref: &str) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM reminders WHERE external_event_ref = ?1")
            .bind(external_event_ref)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

fn reminder_from_row(row: sqlx::sqlite::SqliteRow) -> Result<ReminderRecord, RepositoryError> {
    Ok(ReminderRecord {
        id: row.try_get("id")?,
        user_id: AccountId(row.try_get("user_id")?),
        log_id: row.try_get("log_id")?,
        external_event_ref: row.try_get("external_event_ref")?,
        title: row.try_get("title")?,
        event_at: row.try_get::<DateTime<Utc>, _>("event_at")?,
        fire_at: row.try_get::<DateTime<Utc>, _>("fire_at")?,
        sent: row.try_get("sent")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use agendai_core::domain::account::UserAccount;
    use agendai_core::domain::reminder::ReminderRecord;

    use crate::connect_with_settings;
    use crate::migrations::run_pending;
    use crate::repositories::{
        AccountRepository, ReminderRepository, SqlAccountRepository, SqlReminderRepository,
    };

    async fn setup() -> (SqlReminderRepository, agendai_core::domain::account::AccountId) {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("migrate");

        let accounts = SqlAccountRepository::new(pool.clone());
        let account = UserAccount::first_contact("5511999990000", None, Utc::now());
        accounts.create(account.clone()).await.expect("create account");

        (SqlReminderRepository::new(pool), account.id)
    }

    fn reminder(
        user_id: &agendai_core::domain::account::AccountId,
        external_ref: &str,
        event_at: chrono::DateTime<Utc>,
    ) -> ReminderRecord {
        ReminderRecord::for_event(
            user_id,
            "Reunião",
            event_at,
            10,
            None,
            Some(external_ref.to_owned()),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn list_due_returns_only_unsent_past_fire_instants_in_order() {
        let (repo, user_id) = setup().await;
        let now = Utc.with_ymd_and_hms(2025, 12, 30, 12, 0, 0).unwrap();

        let due_late = reminder(&user_id, "evt-late", now + Duration::minutes(5));
        let due_early = reminder(&user_id, "evt-early", now - Duration::minutes(30));
        let future = reminder(&user_id, "evt-future", now + Duration::hours(4));
        repo.create(due_late.clone()).await.expect("create");
        repo.create(due_early.clone()).await.expect("create");
        repo.create(future).await.expect("create");

        let due = repo.list_due(now).await.expect("list due");
        let refs: Vec<_> =
            due.iter().filter_map(|r| r.external_event_ref.as_deref()).collect();
        assert_eq!(refs, vec!["evt-early", "evt-late"]);
    }

    #[tokio::test]
    async fn mark_sent_succeeds_exactly_once() {
        let (repo, user_id) = setup().await;
        let record = reminder(&user_id, "evt-1", Utc::now());
        repo.create(record.clone()).await.expect("create");

        assert!(repo.mark_sent(&record.id).await.expect("first mark"));
        assert!(!repo.mark_sent(&record.id).await.expect("second mark"));
    }

    #[tokio::test]
    async fn reschedule_only_touches_unsent_reminders() {
        let (repo, user_id) = setup().await;
        let record = reminder(&user_id, "evt-1", Utc::now() + Duration::hours(2));
        repo.create(record.clone()).await.expect("create");

        let new_event_at = Utc::now() + Duration::hours(5);
        assert!(repo
            .reschedule(&record.id, new_event_at, new_event_at - Duration::minutes(10))
            .await
            .expect("reschedule unsent"));

        repo.mark_sent(&record.id).await.expect("mark sent");
        assert!(!repo
            .reschedule(&record.id, new_event_at, new_event_at)
            .await
            .expect("reschedule sent"));
    }

    #[tokio::test]
    async fn delete_by_ref_removes_reminder() {
        let (repo, user_id) = setup().await;
        let record = reminder(&user_id, "evt-1", Utc::now() + Duration::hours(2));
        repo.create(record).await.expect("create");

        assert_eq!(repo.delete_by_ref("evt-1").await.expect("delete"), 1);
        assert!(repo.find_unsent_by_ref("evt-1").await.expect("find").is_none());
    }
}
