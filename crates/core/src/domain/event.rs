use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::account::AccountId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Hearing,
    Meeting,
    Deadline,
    Appointment,
    Other,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hearing => "hearing",
            Self::Meeting => "meeting",
            Self::Deadline => "deadline",
            Self::Appointment => "appointment",
            Self::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "hearing" => Self::Hearing,
            "meeting" => Self::Meeting,
            "deadline" => Self::Deadline,
            "appointment" => Self::Appointment,
            _ => Self::Other,
        }
    }
}

/// Structured, unsaved representation of an appointment the user described.
/// Produced by extraction, consumed by the calendar create call, then
/// discarded; only the log record persists.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventDraft {
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub all_day: bool,
    pub description: Option<String>,
    pub location: Option<String>,
    pub attendees: Vec<String>,
    pub source_entity: Option<String>,
    pub event_type: EventType,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogStatus {
    Created,
    Synced,
    Error,
}

impl LogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Synced => "synced",
            Self::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "created" => Some(Self::Created),
            "synced" => Some(Self::Synced),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// Durable audit entry, one per scheduling attempt (successful or not).
/// Append-only after creation.
#[derive(Clone, Debug)]
pub struct EventLogRecord {
    pub id: String,
    pub user_id: AccountId,
    pub title: String,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub all_day: bool,
    pub description: Option<String>,
    pub location: Option<String>,
    pub source_entity: Option<String>,
    pub event_type: EventType,
    pub external_event_ref: Option<String>,
    pub original_text: String,
    pub was_audio: bool,
    pub status: LogStatus,
    pub error_detail: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl EventLogRecord {
    pub fn from_draft(
        user_id: &AccountId,
        draft: &EventDraft,
        original_text: &str,
        was_audio: bool,
        external_event_ref: Option<String>,
        status: LogStatus,
        error_detail: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.clone(),
            title: draft.title.clone(),
            start: Some(draft.start),
            end: draft.end,
            all_day: draft.all_day,
            description: draft.description.clone(),
            location: draft.location.clone(),
            source_entity: draft.source_entity.clone(),
            event_type: draft.event_type,
            external_event_ref,
            original_text: original_text.to_owned(),
            was_audio,
            status,
            error_detail,
            created_at: now,
        }
    }
}
