use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use tracing::debug;

use agendai_core::domain::event::{EventDraft, EventType};
use agendai_core::errors::UpstreamError;

use crate::llm::{strip_code_fences, LlmClient};

const SYSTEM_PROMPT: &str = "You extract one calendar event from a short Brazilian Portuguese \
message. Answer with a single JSON object and nothing else: {\"title\": string, \"date\": \
\"YYYY-MM-DD\" or null, \"time\": \"HH:MM\" or null, \"end_time\": \"HH:MM\" or null, \
\"description\": string or null, \"location\": string or null, \"attendees\": [string], \
\"source_entity\": string or null, \"event_type\": one of \"hearing\", \"meeting\", \
\"deadline\", \"appointment\", \"other\"}. Set date to null when the message gives no usable \
day. Do not invent times.";

/// Extraction outcome. A message with no recognizable date is a legitimate
/// state that gets a clarifying prompt, not an error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Extraction {
    Draft(EventDraft),
    NoDateFound,
}

#[async_trait]
pub trait ExtractorService: Send + Sync {
    async fn extract(&self, text: &str, tz: Tz) -> Result<Extraction, UpstreamError>;
}

pub struct LlmExtractor<C> {
    client: C,
}

impl<C> LlmExtractor<C>
where
    C: LlmClient,
{
    pub fn new(client: C) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct RawExtraction {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    date: Option<NaiveDate>,
    #[serde(default)]
    time: Option<String>,
    #[serde(default)]
    end_time: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    attendees: Vec<String>,
    #[serde(default)]
    source_entity: Option<String>,
    #[serde(default)]
    event_type: Option<String>,
}

#[async_trait]
impl<C> ExtractorService for LlmExtractor<C>
where
    C: LlmClient + 'static,
{
    async fn extract(&self, text: &str, tz: Tz) -> Result<Extraction, UpstreamError> {
        let user = format!("Timezone: {tz}.\nMessage: {text}");
        let raw = self.client.complete(SYSTEM_PROMPT, &user).await?;

        let parsed: RawExtraction = serde_json::from_str(strip_code_fences(&raw))
            .map_err(|error| UpstreamError::MalformedModelOutput(error.to_string()))?;

        let Some(date) = parsed.date else {
            debug!(event_name = "extractor.no_date");
            return Ok(Extraction::NoDateFound);
        };

        let time = parsed.time.as_deref().map(parse_clock).transpose()?;
        let end_time = parsed.end_time.as_deref().map(parse_clock).transpose()?;

        // No time means the user described a whole day, not midnight.
        let all_day = time.is_none();
        let start_time = time.unwrap_or(NaiveTime::MIN);
        let start = compose_instant(tz, date, start_time)?;
        let end = end_time.map(|end| compose_instant(tz, date, end)).transpose()?;

        let title = parsed
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| fallback_title(text));

        Ok(Extraction::Draft(EventDraft {
            title,
            start,
            end,
            all_day,
            description: parsed.description,
            location: parsed.location,
            attendees: parsed.attendees,
            source_entity: parsed.source_entity,
            event_type: parsed.event_type.as_deref().map(EventType::parse).unwrap_or(EventType::Other),
        }))
    }
}

fn parse_clock(raw: &str) -> Result<NaiveTime, UpstreamError> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M").map_err(|_| {
        UpstreamError::MalformedModelOutput(format!("unparseable clock value `{raw}`"))
    })
}

fn compose_instant(tz: Tz, date: NaiveDate, time: NaiveTime) -> Result<DateTime<Utc>, UpstreamError> {
    match tz.from_local_datetime(&NaiveDateTime::new(date, time)) {
        chrono::LocalResult::Single(instant) => Ok(instant.with_timezone(&Utc)),
        chrono::LocalResult::Ambiguous(earliest, _) => Ok(earliest.with_timezone(&Utc)),
        chrono::LocalResult::None => Err(UpstreamError::MalformedModelOutput(format!(
            "local datetime {date} {time} does not exist in {tz}"
        ))),
    }
}

fn fallback_title(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= 60 {
        trimmed.to_owned()
    } else {
        let cut: String = trimmed.chars().take(57).collect();
        format!("{cut}...")
    }
}

#[cfg(test)]
mod tests {
    use chrono::Timelike;

    use agendai_core::domain::event::EventType;
    use agendai_core::errors::UpstreamError;

    use super::{Extraction, ExtractorService, LlmExtractor};
    use crate::llm::ScriptedLlmClient;

    const TZ: chrono_tz::Tz = chrono_tz::America::Sao_Paulo;

    #[tokio::test]
    async fn timed_message_yields_timed_draft_in_user_timezone() {
        let client = ScriptedLlmClient::new();
        client
            .push_ok(
                r#"{"title":"Audiência trabalhista","date":"2025-12-30","time":"10:00",
                "location":"Fórum central","attendees":[],"source_entity":"Empresa X",
                "event_type":"hearing"}"#,
            )
            .await;
        let extractor = LlmExtractor::new(client);

        let extraction = extractor
            .extract("audiência trabalhista empresa X dia 30/12 às 10h", TZ)
            .await
            .expect("extract");

        let Extraction::Draft(draft) = extraction else {
            panic!("expected a draft");
        };
        assert_eq!(draft.title, "Audiência trabalhista");
        assert!(!draft.all_day);
        assert_eq!(draft.event_type, EventType::Hearing);
        // 10:00 São Paulo is 13:00 UTC.
        assert_eq!(draft.start.hour(), 13);
    }

    #[tokio::test]
    async fn dateless_time_message_yields_all_day_draft() {
        let client = ScriptedLlmClient::new();
        client
            .push_ok(
                r#"{"title":"Folha de pagamento empresa X","date":"2025-12-30","time":null,
                "attendees":[],"event_type":"deadline"}"#,
            )
            .await;
        let extractor = LlmExtractor::new(client);

        let extraction = extractor
            .extract("folha de pagamento empresa X dia 30/12", TZ)
            .await
            .expect("extract");

        let Extraction::Draft(draft) = extraction else {
            panic!("expected a draft");
        };
        assert!(draft.all_day);
        assert!(draft.end.is_none());
    }

    #[tokio::test]
    async fn missing_date_is_the_distinguished_no_date_outcome() {
        let client = ScriptedLlmClient::new();
        client.push_ok(r#"{"title":"Reunião","date":null,"attendees":[]}"#).await;
        let extractor = LlmExtractor::new(client);

        let extraction = extractor.extract("marca uma reunião qualquer hora", TZ).await;
        assert_eq!(extraction.expect("extract"), Extraction::NoDateFound);
    }

    #[tokio::test]
    async fn bad_clock_value_fails_closed() {
        let client = ScriptedLlmClient::new();
        client.push_ok(r#"{"title":"Reunião","date":"2025-12-30","time":"às dez"}"#).await;
        let extractor = LlmExtractor::new(client);

        let result = extractor.extract("reunião dia 30/12", TZ).await;
        assert!(matches!(result, Err(UpstreamError::MalformedModelOutput(_))));
    }
}
