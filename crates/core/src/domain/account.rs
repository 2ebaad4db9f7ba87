use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use secrecy::SecretString;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AccountId(pub String);

impl AccountId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

/// One account per distinct channel sender id. Created lazily on first
/// contact; credentials are opaque handles into the provider credential
/// store, never inspected here.
#[derive(Clone, Debug)]
pub struct UserAccount {
    pub id: AccountId,
    pub sender_id: String,
    pub display_name: Option<String>,
    pub timezone: Tz,
    pub calendar_credentials: Option<SecretString>,
    pub knowledge_credentials: Option<SecretString>,
    pub onboarding_complete: bool,
    pub created_at: DateTime<Utc>,
}

impl UserAccount {
    pub fn first_contact(sender_id: &str, display_name: Option<&str>, now: DateTime<Utc>) -> Self {
        Self {
            id: AccountId::generate(),
            sender_id: sender_id.to_owned(),
            display_name: display_name.map(str::to_owned),
            timezone: chrono_tz::America::Sao_Paulo,
            calendar_credentials: None,
            knowledge_credentials: None,
            onboarding_complete: false,
            created_at: now,
        }
    }

    pub fn has_calendar_credentials(&self) -> bool {
        self.calendar_credentials.is_some()
    }

    pub fn has_knowledge_credentials(&self) -> bool {
        self.knowledge_credentials.is_some()
    }
}
