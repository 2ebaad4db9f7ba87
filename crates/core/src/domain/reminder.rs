use chrono::{DateTime, Duration, Utc};

use super::account::AccountId;

/// A timed notification tied to a scheduled event. Marked sent exactly once
/// by the dispatcher; deleted when its event is cancelled; rescheduled only
/// while unsent.
#[derive(Clone, Debug)]
pub struct ReminderRecord {
    pub id: String,
    pub user_id: AccountId,
    pub log_id: Option<String>,
    pub external_event_ref: Option<String>,
    pub title: String,
    pub event_at: DateTime<Utc>,
    pub fire_at: DateTime<Utc>,
    pub sent: bool,
    pub created_at: DateTime<Utc>,
}

impl ReminderRecord {
    pub fn for_event(
        user_id: &AccountId,
        title: &str,
        event_at: DateTime<Utc>,
        lead_minutes: i64,
        log_id: Option<String>,
        external_event_ref: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.clone(),
            log_id,
            external_event_ref,
            title: title.to_owned(),
            event_at,
            fire_at: event_at - Duration::minutes(lead_minutes),
            sent: false,
            created_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use crate::domain::account::AccountId;

    use super::ReminderRecord;

    #[test]
    fn fire_instant_is_event_start_minus_lead_time() {
        let event_at = Utc.with_ymd_and_hms(2025, 12, 30, 14, 0, 0).unwrap();
        let reminder = ReminderRecord::for_event(
            &AccountId("user-1".to_owned()),
            "Reunião",
            event_at,
            10,
            None,
            Some("cal-evt-1".to_owned()),
            Utc::now(),
        );

        assert_eq!(reminder.fire_at, event_at - Duration::minutes(10));
        assert!(!reminder.sent);
    }
}
