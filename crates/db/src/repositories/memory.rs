use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use tokio::sync::RwLock;

use agendai_core::domain::account::{AccountId, UserAccount};
use agendai_core::domain::event::EventLogRecord;
use agendai_core::domain::reminder::ReminderRecord;

use super::{
    AccountRepository, EventLogRepository, InboxRepository, ReminderRepository, RepositoryError,
};

#[derive(Default)]
pub struct InMemoryAccountRepository {
    accounts: RwLock<HashMap<String, UserAccount>>,
}

impl InMemoryAccountRepository {
    pub async fn count(&self) -> usize {
        self.accounts.read().await.len()
    }
}

#[async_trait::async_trait]
impl AccountRepository for InMemoryAccountRepository {
    async fn find_by_sender(
        &self,
        sender_id: &str,
    ) -> Result<Option<UserAccount>, RepositoryError> {
        let accounts = self.accounts.read().await;
        Ok(accounts.get(sender_id).cloned())
    }

    async fn find_by_id(&self, id: &AccountId) -> Result<Option<UserAccount>, RepositoryError> {
        let accounts = self.accounts.read().await;
        Ok(accounts.values().find(|account| &account.id == id).cloned())
    }

    async fn create(&self, account: UserAccount) -> Result<(), RepositoryError> {
        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(&account.sender_id) {
            return Err(RepositoryError::Decode(format!(
                "duplicate sender id `{}`",
                account.sender_id
            )));
        }
        accounts.insert(account.sender_id.clone(), account);
        Ok(())
    }

    async fn update_credentials(
        &self,
        id: &AccountId,
        calendar: Option<SecretString>,
        knowledge: Option<SecretString>,
    ) -> Result<(), RepositoryError> {
        let mut accounts = self.accounts.write().await;
        for account in accounts.values_mut() {
            if &account.id == id {
                if calendar.is_some() {
                    account.calendar_credentials = calendar;
                }
                if knowledge.is_some() {
                    account.knowledge_credentials = knowledge;
                }
                return Ok(());
            }
        }
        Ok(())
    }

    async fn mark_onboarded(&self, id: &AccountId) -> Result<(), RepositoryError> {
        let mut accounts = self.accounts.write().await;
        for account in accounts.values_mut() {
            if &account.id == id {
                account.onboarding_complete = true;
            }
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryEventLogRepository {
    records: RwLock<Vec<EventLogRecord>>,
}

impl InMemoryEventLogRepository {
    pub async fn all(&self) -> Vec<EventLogRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait::async_trait]
impl EventLogRepository for InMemoryEventLogRepository {
    async fn append(&self, record: EventLogRecord) -> Result<(), RepositoryError> {
        self.records.write().await.push(record);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryReminderRepository {
    reminders: RwLock<HashMap<String, ReminderRecord>>,
}

impl InMemoryReminderRepository {
    pub async fn all(&self) -> Vec<ReminderRecord> {
        self.reminders.read().await.values().cloned().collect()
    }

    pub async fn get(&self, id: &str) -> Option<ReminderRecord> {
        self.reminders.read().await.get(id).cloned()
    }
}

#[async_trait::async_trait]
impl ReminderRepository for InMemoryReminderRepository {
    async fn create(&self, reminder: ReminderRecord) -> Result<(), RepositoryError> {
        self.reminders.write().await.insert(reminder.id.clone(), reminder);
        Ok(())
    }

    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<ReminderRecord>, RepositoryError> {
        let reminders = self.reminders.read().await;
        let mut due: Vec<ReminderRecord> =
            reminders.values().filter(|r| !r.sent && r.fire_at <= now).cloned().collect();
        due.sort_by_key(|r| r.fire_at);
        Ok(due)
    }

    async fn find_unsent_by_ref(
        &self,
        external_event_ref: &str,
    ) -> Result<Option<ReminderRecord>, RepositoryError> {
        let reminders = self.reminders.read().await;
        Ok(reminders
            .values()
            .find(|r| !r.sent && r.external_event_ref.as_deref() == Some(external_event_ref))
            .cloned())
    }

    async fn mark_sent(&self, id: &str) -> Result<bool, RepositoryError> {
        let mut reminders = self.reminders.write().await;
        match reminders.get_mut(id) {
            Some(reminder) if !reminder.sent => {
                reminder.sent = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn reschedule(
        &self,
        id: &str,
        event_at: DateTime<Utc>,
        fire_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut reminders = self.reminders.write().await;
        match reminders.get_mut(id) {
            Some(reminder) if !reminder.sent => {
                reminder.event_at = event_at;
                reminder.fire_at = fire_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_by_ref(&self, external_event_ref: &str) -> Result<u64, RepositoryError> {
        let mut reminders = self.reminders.write().await;
        let before = reminders.len();
        reminders.retain(|_, r| r.external_event_ref.as_deref() != Some(external_event_ref));
        Ok((before - reminders.len()) as u64)
    }
}

#[derive(Default)]
pub struct InMemoryInboxRepository {
    seen: RwLock<HashSet<String>>,
}

#[async_trait::async_trait]
impl InboxRepository for InMemoryInboxRepository {
    async fn insert_if_absent(
        &self,
        message_id: &str,
        _received_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        Ok(self.seen.write().await.insert(message_id.to_owned()))
    }
}
