use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use thiserror::Error;

use agendai_core::domain::account::{AccountId, UserAccount};
use agendai_core::domain::event::EventLogRecord;
use agendai_core::domain::reminder::ReminderRecord;

pub mod account;
pub mod event_log;
pub mod inbox;
pub mod memory;
pub mod reminder;

pub use account::SqlAccountRepository;
pub use event_log::SqlEventLogRepository;
pub use inbox::SqlInboxRepository;
pub use memory::{
    InMemoryAccountRepository, InMemoryEventLogRepository, InMemoryInboxRepository,
    InMemoryReminderRepository,
};
pub use reminder::SqlReminderRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn find_by_sender(&self, sender_id: &str)
        -> Result<Option<UserAccount>, RepositoryError>;
    async fn find_by_id(&self, id: &AccountId) -> Result<Option<UserAccount>, RepositoryError>;
    async fn create(&self, account: UserAccount) -> Result<(), RepositoryError>;
    async fn update_credentials(
        &self,
        id: &AccountId,
        calendar: Option<SecretString>,
        knowledge: Option<SecretString>,
    ) -> Result<(), RepositoryError>;
    async fn mark_onboarded(&self, id: &AccountId) -> Result<(), RepositoryError>;
}

/// Append-only: the log is an audit trail, nothing in the pipeline reads it
/// back.
#[async_trait]
pub trait EventLogRepository: Send + Sync {
    async fn append(&self, record: EventLogRecord) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ReminderRepository: Send + Sync {
    async fn create(&self, reminder: ReminderRecord) -> Result<(), RepositoryError>;

    /// Unsent reminders whose fire instant is at or before `now`, ordered by
    /// fire instant ascending.
    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<ReminderRecord>, RepositoryError>;

    async fn find_unsent_by_ref(
        &self,
        external_event_ref: &str,
    ) -> Result<Option<ReminderRecord>, RepositoryError>;

    /// Compare-and-set: flips `sent` to true only if it was false. Returns
    /// whether this caller won; a `false` means another dispatcher cycle got
    /// there first.
    async fn mark_sent(&self, id: &str) -> Result<bool, RepositoryError>;

    /// Moves an unsent reminder to a new event/fire instant. Sent reminders
    /// are never rescheduled.
    async fn reschedule(
        &self,
        id: &str,
        event_at: DateTime<Utc>,
        fire_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;

    async fn delete_by_ref(&self, external_event_ref: &str) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait InboxRepository: Send + Sync {
    /// Records a channel message id. Returns `false` when the id was already
    /// recorded — the caller must then skip the message entirely.
    async fn insert_if_absent(
        &self,
        message_id: &str,
        received_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;
}
