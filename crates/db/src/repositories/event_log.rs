use async_trait::async_trait;

use agendai_core::domain::event::EventLogRecord;

use super::{EventLogRepository, RepositoryError};
use crate::DbPool;

pub struct SqlEventLogRepository {
    pool: DbPool,
}

impl SqlEventLogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventLogRepository for SqlEventLogRepository {
    async fn append(&self, record: EventLogRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO event_log (id, user_id, title, start_at, end_at, all_day, \
             description, location, source_entity, event_type, external_event_ref, \
             original_text, was_audio, status, error_detail, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        )
        .bind(&record.id)
        .bind(&record.user_id.0)
        .bind(&record.title)
        .bind(record.start)
        .bind(record.end)
        .bind(record.all_day)
        .bind(&record.description)
        .bind(&record.location)
        .bind(&record.source_entity)
        .bind(record.event_type.as_str())
        .bind(&record.external_event_ref)
        .bind(&record.original_text)
        .bind(record.was_audio)
        .bind(record.status.as_str())
        .bind(&record.error_detail)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use sqlx::Row;

    use agendai_core::domain::account::AccountId;
    use agendai_core::domain::event::{EventDraft, EventLogRecord, EventType, LogStatus};

    use crate::connect_with_settings;
    use crate::migrations::run_pending;
    use crate::repositories::{
        AccountRepository, EventLogRepository, SqlAccountRepository, SqlEventLogRepository,
    };

    fn draft() -> EventDraft {
        EventDraft {
            title: "Audiência trabalhista".to_owned(),
            start: Utc.with_ymd_and_hms(2025, 12, 30, 13, 0, 0).unwrap(),
            end: None,
            all_day: false,
            description: None,
            location: Some("Fórum central".to_owned()),
            attendees: vec![],
            source_entity: Some("Empresa X".to_owned()),
            event_type: EventType::Hearing,
        }
    }

    #[tokio::test]
    async fn append_persists_status_and_fields() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("migrate");

        let accounts = SqlAccountRepository::new(pool.clone());
        let account = agendai_core::domain::account::UserAccount::first_contact(
            "5511999990000",
            None,
            Utc::now(),
        );
        accounts.create(account.clone()).await.expect("create account");

        let repo = SqlEventLogRepository::new(pool.clone());
        let record = EventLogRecord::from_draft(
            &account.id,
            &draft(),
            "audiência dia 30/12 às 10h",
            false,
            Some("cal-evt-1".to_owned()),
            LogStatus::Synced,
            None,
            Utc::now(),
        );
        repo.append(record.clone()).await.expect("append");

        let row = sqlx::query(
            "SELECT user_id, status, event_type, external_event_ref, was_audio \
             FROM event_log WHERE id = ?1",
        )
        .bind(&record.id)
        .fetch_one(&pool)
        .await
        .expect("row written");
        assert_eq!(row.get::<String, _>("user_id"), account.id.0);
        assert_eq!(row.get::<String, _>("status"), "synced");
        assert_eq!(row.get::<String, _>("event_type"), "hearing");
        assert_eq!(row.get::<Option<String>, _>("external_event_ref").as_deref(), Some("cal-evt-1"));
        assert!(!row.get::<bool, _>("was_audio"));
    }

    #[tokio::test]
    async fn every_attempt_appends_its_own_row() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("migrate");

        let accounts = SqlAccountRepository::new(pool.clone());
        let account = agendai_core::domain::account::UserAccount::first_contact(
            "5511999990000",
            None,
            Utc::now(),
        );
        accounts.create(account.clone()).await.expect("create account");

        let repo = SqlEventLogRepository::new(pool.clone());
        for n in 0..5 {
            let record = EventLogRecord::from_draft(
                &account.id,
                &draft(),
                &format!("evento {n}"),
                false,
                None,
                LogStatus::Created,
                None,
                Utc::now(),
            );
            repo.append(record).await.expect("append");
        }

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM event_log")
            .fetch_one(&pool)
            .await
            .expect("count");
        assert_eq!(count, 5);
    }

    #[test]
    fn from_draft_copies_draft_fields() {
        let user = AccountId("user-1".to_owned());
        let record = EventLogRecord::from_draft(
            &user,
            &draft(),
            "texto original",
            true,
            None,
            LogStatus::Error,
            Some("calendar 500".to_owned()),
            Utc::now(),
        );

        assert_eq!(record.title, "Audiência trabalhista");
        assert!(record.was_audio);
        assert_eq!(record.status, LogStatus::Error);
        assert_eq!(record.error_detail.as_deref(), Some("calendar 500"));
    }
}
