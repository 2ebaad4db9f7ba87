use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use chrono_tz::Tz;
use serde::Deserialize;
use tracing::debug;

use agendai_core::errors::UpstreamError;
use agendai_core::resolver::{
    deterministic_match, parse_fragments, Confidence, DeterministicMatch, EventCandidate,
    Resolution,
};

use crate::llm::{strip_code_fences, LlmClient};

const SYSTEM_PROMPT: &str = "The user wants to alter or cancel one of their upcoming calendar \
events. Decide which numbered candidate they mean. Answer with a single JSON object and \
nothing else: {\"match_index\": zero-based index or null, \"new_date\": \"YYYY-MM-DD\" or \
null, \"new_time\": \"HH:MM\" or null, \"confidence\": \"high\", \"low\" or \"none\"}. Use \
\"high\" only when the reference is unambiguous.";

#[async_trait]
pub trait ResolverService: Send + Sync {
    async fn resolve(
        &self,
        text: &str,
        candidates: &[EventCandidate],
        tz: Tz,
        today: NaiveDate,
    ) -> Result<Resolution, UpstreamError>;
}

/// Layered resolver: the deterministic rules settle the common shapes
/// (pronoun + single candidate, ordinals, unique title overlap) without a
/// model call; only inconclusive references go to the model, whose output is
/// strict-decoded and bounds-checked.
pub struct EventResolver<C> {
    client: C,
}

impl<C> EventResolver<C>
where
    C: LlmClient,
{
    pub fn new(client: C) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct RawResolution {
    #[serde(default)]
    match_index: Option<usize>,
    #[serde(default)]
    new_date: Option<NaiveDate>,
    #[serde(default)]
    new_time: Option<String>,
    confidence: String,
}

#[async_trait]
impl<C> ResolverService for EventResolver<C>
where
    C: LlmClient + 'static,
{
    async fn resolve(
        &self,
        text: &str,
        candidates: &[EventCandidate],
        tz: Tz,
        today: NaiveDate,
    ) -> Result<Resolution, UpstreamError> {
        if candidates.is_empty() {
            return Ok(Resolution::none());
        }

        let (fragment_date, fragment_time) = parse_fragments(text, today);

        if let DeterministicMatch::Matched(index) = deterministic_match(text, candidates) {
            debug!(event_name = "resolver.deterministic", index);
            return Ok(Resolution {
                matched_ref: Some(candidates[index].external_ref.clone()),
                new_date: fragment_date,
                new_time: fragment_time,
                confidence: Confidence::High,
            });
        }

        let listing = candidates
            .iter()
            .enumerate()
            .map(|(index, candidate)| {
                let local = candidate.start.with_timezone(&tz);
                format!("{index}. {} — {}", candidate.title, local.format("%d/%m/%Y %H:%M"))
            })
            .collect::<Vec<_>>()
            .join("\n");
        let user = format!("Today is {today}.\nCandidates:\n{listing}\nMessage: {text}");

        let raw = self.client.complete(SYSTEM_PROMPT, &user).await?;
        let parsed: RawResolution = serde_json::from_str(strip_code_fences(&raw))
            .map_err(|error| UpstreamError::MalformedModelOutput(error.to_string()))?;

        let confidence = match parsed.confidence.as_str() {
            "high" => Confidence::High,
            "low" => Confidence::Low,
            "none" => Confidence::None,
            other => {
                return Err(UpstreamError::MalformedModelOutput(format!(
                    "unknown confidence `{other}`"
                )))
            }
        };

        let matched_ref = match parsed.match_index {
            Some(index) if index < candidates.len() => {
                Some(candidates[index].external_ref.clone())
            }
            Some(index) => {
                return Err(UpstreamError::MalformedModelOutput(format!(
                    "match index {index} out of bounds for {} candidates",
                    candidates.len()
                )))
            }
            None => None,
        };

        let new_time = parsed
            .new_time
            .as_deref()
            .map(|raw| {
                NaiveTime::parse_from_str(raw.trim(), "%H:%M").map_err(|_| {
                    UpstreamError::MalformedModelOutput(format!("unparseable clock value `{raw}`"))
                })
            })
            .transpose()?;

        debug!(event_name = "resolver.model", confidence = ?confidence);
        Ok(Resolution {
            matched_ref,
            new_date: parsed.new_date.or(fragment_date),
            new_time: new_time.or(fragment_time),
            confidence,
        })
    }
}
