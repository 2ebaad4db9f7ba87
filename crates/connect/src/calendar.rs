use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use agendai_core::domain::event::EventDraft;
use agendai_core::errors::UpstreamError;
use agendai_core::resolver::EventCandidate;

#[derive(Debug, Error)]
pub enum CalendarError {
    /// Provider said 401. Distinct variant so the orchestrator can prompt a
    /// re-link instead of the generic apology.
    #[error("calendar credentials expired")]
    CredentialExpired,
    #[error("calendar transport failure: {0}")]
    Http(#[from] reqwest::Error),
    #[error("calendar api rejected request with status {status}: {detail}")]
    Api { status: u16, detail: String },
    #[error("calendar response missing field `{0}`")]
    Decode(&'static str),
}

impl From<CalendarError> for UpstreamError {
    fn from(error: CalendarError) -> Self {
        match error {
            CalendarError::CredentialExpired => Self::CredentialExpired,
            other => Self::Calendar(other.to_string()),
        }
    }
}

#[async_trait]
pub trait CalendarConnector: Send + Sync {
    /// Creates the event and returns the provider's event reference.
    async fn create_event(
        &self,
        credentials: &SecretString,
        draft: &EventDraft,
    ) -> Result<String, CalendarError>;

    /// Upcoming events from `from`, ordered by start, at most `limit`.
    async fn list_upcoming(
        &self,
        credentials: &SecretString,
        from: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<EventCandidate>, CalendarError>;

    /// Every event starting inside `[from, to)`, ordered by start. Unlike
    /// `list_upcoming` this is exhaustive; callers mutate whole days with it.
    async fn list_window(
        &self,
        credentials: &SecretString,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<EventCandidate>, CalendarError>;

    async fn move_event(
        &self,
        credentials: &SecretString,
        external_ref: &str,
        new_start: DateTime<Utc>,
        all_day: bool,
    ) -> Result<(), CalendarError>;

    async fn delete_event(
        &self,
        credentials: &SecretString,
        external_ref: &str,
    ) -> Result<(), CalendarError>;
}

/// Google-style REST connector. The credential is the user's bearer token;
/// all calls hit the primary calendar.
pub struct RestCalendarConnector {
    http: reqwest::Client,
    api_base: String,
}

impl RestCalendarConnector {
    pub fn new(api_base: &str) -> Self {
        Self { http: reqwest::Client::new(), api_base: api_base.trim_end_matches('/').to_owned() }
    }

    fn events_url(&self) -> String {
        format!("{}/calendars/primary/events", self.api_base)
    }

    fn event_url(&self, external_ref: &str) -> String {
        format!("{}/calendars/primary/events/{external_ref}", self.api_base)
    }
}

fn event_body(start: DateTime<Utc>, end: Option<DateTime<Utc>>, all_day: bool) -> serde_json::Value {
    if all_day {
        let date = start.date_naive();
        let next = date + Duration::days(1);
        json!({
            "start": {"date": date.to_string()},
            "end": {"date": next.to_string()},
        })
    } else {
        let end = end.unwrap_or(start + Duration::hours(1));
        json!({
            "start": {"dateTime": start.to_rfc3339()},
            "end": {"dateTime": end.to_rfc3339()},
        })
    }
}

fn decode_candidate(item: &serde_json::Value) -> Option<EventCandidate> {
    let external_ref = item["id"].as_str()?;
    let title = item["summary"].as_str().unwrap_or("(sem título)").to_owned();

    let (start, all_day) = if let Some(raw) = item["start"]["dateTime"].as_str() {
        let start = DateTime::parse_from_rfc3339(raw).ok()?;
        (start.with_timezone(&Utc), false)
    } else if let Some(raw) = item["start"]["date"].as_str() {
        let date = raw.parse::<chrono::NaiveDate>().ok()?;
        (date.and_hms_opt(0, 0, 0)?.and_utc(), true)
    } else {
        return None;
    };

    Some(EventCandidate { external_ref: external_ref.to_owned(), title, start, all_day })
}

async fn checked(response: reqwest::Response) -> Result<reqwest::Response, CalendarError> {
    let status = response.status();
    if status.as_u16() == 401 {
        return Err(CalendarError::CredentialExpired);
    }
    if !status.is_success() {
        let detail = response.text().await.unwrap_or_default();
        return Err(CalendarError::Api { status: status.as_u16(), detail });
    }
    Ok(response)
}

#[async_trait]
impl CalendarConnector for RestCalendarConnector {
    async fn create_event(
        &self,
        credentials: &SecretString,
        draft: &EventDraft,
    ) -> Result<String, CalendarError> {
        let mut body = event_body(draft.start, draft.end, draft.all_day);
        body["summary"] = json!(draft.title);
        if let Some(description) = &draft.description {
            body["description"] = json!(description);
        }
        if let Some(location) = &draft.location {
            body["location"] = json!(location);
        }

        let response = self
            .http
            .post(self.events_url())
            .bearer_auth(credentials.expose_secret())
            .json(&body)
            .send()
            .await?;
        let response = checked(response).await?;

        let created: serde_json::Value = response.json().await?;
        created["id"]
            .as_str()
            .map(str::to_owned)
            .ok_or(CalendarError::Decode("id"))
    }

    async fn list_upcoming(
        &self,
        credentials: &SecretString,
        from: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<EventCandidate>, CalendarError> {
        let response = self
            .http
            .get(self.events_url())
            .bearer_auth(credentials.expose_secret())
            .query(&[
                ("timeMin", from.to_rfc3339()),
                ("maxResults", limit.to_string()),
                ("singleEvents", "true".to_owned()),
                ("orderBy", "startTime".to_owned()),
            ])
            .send()
            .await?;
        let response = checked(response).await?;

        let listing: serde_json::Value = response.json().await?;
        let candidates: Vec<EventCandidate> = listing["items"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(decode_candidate)
            .collect();

        debug!(event_name = "calendar.listed", count = candidates.len());
        Ok(candidates)
    }

    async fn list_window(
        &self,
        credentials: &SecretString,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<EventCandidate>, CalendarError> {
        let mut candidates = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .http
                .get(self.events_url())
                .bearer_auth(credentials.expose_secret())
                .query(&[
                    ("timeMin", from.to_rfc3339()),
                    ("timeMax", to.to_rfc3339()),
                    ("singleEvents", "true".to_owned()),
                    ("orderBy", "startTime".to_owned()),
                ]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let response = checked(request.send().await?).await?;
            let listing: serde_json::Value = response.json().await?;
            candidates.extend(
                listing["items"].as_array().into_iter().flatten().filter_map(decode_candidate),
            );

            match listing["nextPageToken"].as_str() {
                Some(token) => page_token = Some(token.to_owned()),
                None => break,
            }
        }

        debug!(event_name = "calendar.window_listed", count = candidates.len());
        Ok(candidates)
    }

    async fn move_event(
        &self,
        credentials: &SecretString,
        external_ref: &str,
        new_start: DateTime<Utc>,
        all_day: bool,
    ) -> Result<(), CalendarError> {
        let body = event_body(new_start, None, all_day);
        let response = self
            .http
            .patch(self.event_url(external_ref))
            .bearer_auth(credentials.expose_secret())
            .json(&body)
            .send()
            .await?;
        checked(response).await?;
        Ok(())
    }

    async fn delete_event(
        &self,
        credentials: &SecretString,
        external_ref: &str,
    ) -> Result<(), CalendarError> {
        let response = self
            .http
            .delete(self.event_url(external_ref))
            .bearer_auth(credentials.expose_secret())
            .send()
            .await?;
        checked(response).await?;
        Ok(())
    }
}

struct FakeEvent {
    external_ref: String,
    title: String,
    start: DateTime<Utc>,
    all_day: bool,
}

/// In-memory calendar for orchestrator tests: seedable, inspectable, with
/// per-ref scripted delete failures and a global expired-credentials switch.
#[derive(Default)]
pub struct FakeCalendar {
    events: Mutex<Vec<FakeEvent>>,
    counter: AtomicU64,
    failing_refs: Mutex<HashSet<String>>,
    expired: AtomicBool,
}

impl FakeCalendar {
    pub async fn seed_event(&self, title: &str, start: DateTime<Utc>, all_day: bool) -> String {
        let external_ref = format!("evt-{}", self.counter.fetch_add(1, Ordering::SeqCst) + 1);
        self.events.lock().await.push(FakeEvent {
            external_ref: external_ref.clone(),
            title: title.to_owned(),
            start,
            all_day,
        });
        external_ref
    }

    pub async fn fail_delete_of(&self, external_ref: &str) {
        self.failing_refs.lock().await.insert(external_ref.to_owned());
    }

    pub fn expire_credentials(&self) {
        self.expired.store(true, Ordering::SeqCst);
    }

    pub async fn titles(&self) -> Vec<String> {
        self.events.lock().await.iter().map(|e| e.title.clone()).collect()
    }

    pub async fn start_of(&self, external_ref: &str) -> Option<DateTime<Utc>> {
        self.events
            .lock()
            .await
            .iter()
            .find(|e| e.external_ref == external_ref)
            .map(|e| e.start)
    }

    fn gate(&self) -> Result<(), CalendarError> {
        if self.expired.load(Ordering::SeqCst) {
            Err(CalendarError::CredentialExpired)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CalendarConnector for FakeCalendar {
    async fn create_event(
        &self,
        _credentials: &SecretString,
        draft: &EventDraft,
    ) -> Result<String, CalendarError> {
        self.gate()?;
        Ok(self.seed_event(&draft.title, draft.start, draft.all_day).await)
    }

    async fn list_upcoming(
        &self,
        _credentials: &SecretString,
        from: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<EventCandidate>, CalendarError> {
        self.gate()?;
        let events = self.events.lock().await;
        let mut upcoming: Vec<EventCandidate> = events
            .iter()
            .filter(|e| e.start >= from)
            .map(|e| EventCandidate {
                external_ref: e.external_ref.clone(),
                title: e.title.clone(),
                start: e.start,
                all_day: e.all_day,
            })
            .collect();
        upcoming.sort_by_key(|c| c.start);
        upcoming.truncate(limit);
        Ok(upcoming)
    }

    async fn list_window(
        &self,
        _credentials: &SecretString,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<EventCandidate>, CalendarError> {
        self.gate()?;
        let events = self.events.lock().await;
        let mut inside: Vec<EventCandidate> = events
            .iter()
            .filter(|e| e.start >= from && e.start < to)
            .map(|e| EventCandidate {
                external_ref: e.external_ref.clone(),
                title: e.title.clone(),
                start: e.start,
                all_day: e.all_day,
            })
            .collect();
        inside.sort_by_key(|c| c.start);
        Ok(inside)
    }

    async fn move_event(
        &self,
        _credentials: &SecretString,
        external_ref: &str,
        new_start: DateTime<Utc>,
        all_day: bool,
    ) -> Result<(), CalendarError> {
        self.gate()?;
        let mut events = self.events.lock().await;
        let event = events
            .iter_mut()
            .find(|e| e.external_ref == external_ref)
            .ok_or(CalendarError::Api { status: 404, detail: "no such event".to_owned() })?;
        event.start = new_start;
        event.all_day = all_day;
        Ok(())
    }

    async fn delete_event(
        &self,
        _credentials: &SecretString,
        external_ref: &str,
    ) -> Result<(), CalendarError> {
        self.gate()?;
        if self.failing_refs.lock().await.contains(external_ref) {
            return Err(CalendarError::Api { status: 500, detail: "scripted failure".to_owned() });
        }
        let mut events = self.events.lock().await;
        let before = events.len();
        events.retain(|e| e.external_ref != external_ref);
        if events.len() == before {
            return Err(CalendarError::Api { status: 404, detail: "no such event".to_owned() });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};
    use secrecy::SecretString;

    use agendai_core::errors::UpstreamError;

    use super::{CalendarConnector, CalendarError, FakeCalendar};

    fn credentials() -> SecretString {
        SecretString::from("token")
    }

    #[tokio::test]
    async fn fake_calendar_lists_upcoming_in_start_order() {
        let calendar = FakeCalendar::default();
        let now = Utc.with_ymd_and_hms(2025, 12, 1, 12, 0, 0).unwrap();
        calendar.seed_event("Dentista", now + Duration::days(2), false).await;
        calendar.seed_event("Audiência", now + Duration::days(1), false).await;
        calendar.seed_event("Passado", now - Duration::days(1), false).await;

        let upcoming = calendar.list_upcoming(&credentials(), now, 10).await.expect("list");
        let titles: Vec<_> = upcoming.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["Audiência", "Dentista"]);
    }

    #[tokio::test]
    async fn window_listing_is_exhaustive_and_bounded() {
        let calendar = FakeCalendar::default();
        let from = Utc.with_ymd_and_hms(2025, 12, 30, 3, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2025, 12, 31, 3, 0, 0).unwrap();
        for hour in 0..12 {
            calendar.seed_event(&format!("Evento {hour}"), from + Duration::hours(hour), false).await;
        }
        calendar.seed_event("Fora", to, false).await;

        let inside = calendar.list_window(&credentials(), from, to).await.expect("list");
        assert_eq!(inside.len(), 12);
        assert!(inside.iter().all(|c| c.start >= from && c.start < to));
    }

    #[tokio::test]
    async fn scripted_delete_failure_only_hits_the_marked_ref() {
        let calendar = FakeCalendar::default();
        let now = Utc::now();
        let keep = calendar.seed_event("Mantém", now + Duration::days(1), false).await;
        let fail = calendar.seed_event("Falha", now + Duration::days(2), false).await;
        calendar.fail_delete_of(&fail).await;

        assert!(calendar.delete_event(&credentials(), &keep).await.is_ok());
        assert!(calendar.delete_event(&credentials(), &fail).await.is_err());
        assert_eq!(calendar.titles().await, vec!["Falha".to_owned()]);
    }

    #[tokio::test]
    async fn expired_credentials_map_to_the_typed_upstream_variant() {
        let calendar = FakeCalendar::default();
        calendar.expire_credentials();

        let error = calendar
            .list_upcoming(&credentials(), Utc::now(), 10)
            .await
            .expect_err("expired");
        assert!(matches!(error, CalendarError::CredentialExpired));
        assert_eq!(UpstreamError::from(error), UpstreamError::CredentialExpired);
    }
}
