use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use sqlx::Row;

use agendai_core::domain::account::{AccountId, UserAccount};

use super::{AccountRepository, RepositoryError};
use crate::DbPool;

pub struct SqlAccountRepository {
    pool: DbPool,
}

impl SqlAccountRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountRepository for SqlAccountRepository {
    async fn find_by_sender(
        &self,
        sender_id: &str,
    ) -> Result<Option<UserAccount>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, sender_id, display_name, timezone, calendar_credentials, \
             knowledge_credentials, onboarding_complete, created_at \
             FROM accounts WHERE sender_id = ?1",
        )
        .bind(sender_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(account_from_row).transpose()
    }

    async fn find_by_id(&self, id: &AccountId) -> Result<Option<UserAccount>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, sender_id, display_name, timezone, calendar_credentials, \
             knowledge_credentials, onboarding_complete, created_at \
             FROM accounts WHERE id = ?1",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(account_from_row).transpose()
    }

    async fn create(&self, account: UserAccount) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO accounts (id, sender_id, display_name, timezone, \
             calendar_credentials, knowledge_credentials, onboarding_complete, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(&account.id.0)
        .bind(&account.sender_id)
        .bind(&account.display_name)
        .bind(account.timezone.name())
        .bind(account.calendar_credentials.as_ref().map(|c| c.expose_secret().to_owned()))
        .bind(account.knowledge_credentials.as_ref().map(|c| c.expose_secret().to_owned()))
        .bind(account.onboarding_complete)
        .bind(account.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_credentials(
        &self,
        id: &AccountId,
        calendar: Option<SecretString>,
        knowledge: Option<SecretString>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE accounts SET \
             calendar_credentials = COALESCE(?2, calendar_credentials), \
             knowledge_credentials = COALESCE(?3, knowledge_credentials) \
             WHERE id = ?1",
        )
        .bind(&id.0)
        .bind(calendar.as_ref().map(|c| c.expose_secret().to_owned()))
        .bind(knowledge.as_ref().map(|c| c.expose_secret().to_owned()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_onboarded(&self, id: &AccountId) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE accounts SET onboarding_complete = 1 WHERE id = ?1")
            .bind(&id.0)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

fn account_from_row(row: sqlx::sqlite::SqliteRow) -> Result<UserAccount, RepositoryError> {
    let timezone_name: String = row.try_get("timezone")?;
    let timezone = timezone_name
        .parse()
        .map_err(|_| RepositoryError::Decode(format!("unknown timezone `{timezone_name}`")))?;

    Ok(UserAccount {
        id: AccountId(row.try_get("id")?),
        sender_id: row.try_get("sender_id")?,
        display_name: row.try_get("display_name")?,
        timezone,
        calendar_credentials: row
            .try_get::<Option<String>, _>("calendar_credentials")?
            .map(SecretString::from),
        knowledge_credentials: row
            .try_get::<Option<String>, _>("knowledge_credentials")?
            .map(SecretString::from),
        onboarding_complete: row.try_get("onboarding_complete")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use secrecy::{ExposeSecret, SecretString};

    use agendai_core::domain::account::UserAccount;

    use crate::connect_with_settings;
    use crate::migrations::run_pending;
    use crate::repositories::{AccountRepository, SqlAccountRepository};

    async fn repo() -> SqlAccountRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("migrate");
        SqlAccountRepository::new(pool)
    }

    #[tokio::test]
    async fn create_then_find_by_sender_round_trips() {
        let repo = repo().await;
        let account = UserAccount::first_contact("5511999990000", Some("Ana"), Utc::now());

        repo.create(account.clone()).await.expect("create");
        let found = repo
            .find_by_sender("5511999990000")
            .await
            .expect("find")
            .expect("account should exist");

        assert_eq!(found.id, account.id);
        assert_eq!(found.sender_id, account.sender_id);
        assert_eq!(found.timezone, chrono_tz::America::Sao_Paulo);
        assert!(!found.onboarding_complete);
    }

    #[tokio::test]
    async fn duplicate_sender_id_is_rejected_by_unique_constraint() {
        let repo = repo().await;
        let first = UserAccount::first_contact("5511999990000", None, Utc::now());
        let second = UserAccount::first_contact("5511999990000", None, Utc::now());

        repo.create(first).await.expect("first create");
        assert!(repo.create(second).await.is_err());
    }

    #[tokio::test]
    async fn credentials_update_and_onboarding_mark_persist() {
        let repo = repo().await;
        let account = UserAccount::first_contact("5511999990000", None, Utc::now());
        repo.create(account.clone()).await.expect("create");

        repo.update_credentials(
            &account.id,
            Some(SecretString::from("cal-handle-1")),
            None,
        )
        .await
        .expect("update credentials");
        repo.mark_onboarded(&account.id).await.expect("mark onboarded");

        let found =
            repo.find_by_sender("5511999990000").await.expect("find").expect("account exists");
        assert_eq!(
            found.calendar_credentials.as_ref().map(|c| c.expose_secret().to_owned()),
            Some("cal-handle-1".to_owned())
        );
        assert!(found.knowledge_credentials.is_none());
        assert!(found.onboarding_complete);
    }
}
