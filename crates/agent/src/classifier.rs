use async_trait::async_trait;
use chrono::NaiveDate;
use chrono_tz::Tz;
use tracing::debug;

use agendai_core::domain::intent::Classification;
use agendai_core::errors::UpstreamError;

use crate::llm::{strip_code_fences, LlmClient};

const SYSTEM_PROMPT: &str = "You classify short Brazilian Portuguese messages sent to a \
scheduling assistant. Answer with a single JSON object and nothing else: \
{\"intent\": one of \"view_agenda\", \"schedule\", \"alter\", \"cancel\", \"help\", \
\"greeting\", \"out_of_scope\", \"unclassified\", \"target_date\": \"YYYY-MM-DD\" or null}. \
Fill target_date only when the message names or implies a specific day.";

#[async_trait]
pub trait ClassifierService: Send + Sync {
    async fn classify(
        &self,
        text: &str,
        tz: Tz,
        today: NaiveDate,
    ) -> Result<Classification, UpstreamError>;
}

pub struct LlmClassifier<C> {
    client: C,
}

impl<C> LlmClassifier<C>
where
    C: LlmClient,
{
    pub fn new(client: C) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<C> ClassifierService for LlmClassifier<C>
where
    C: LlmClient + 'static,
{
    async fn classify(
        &self,
        text: &str,
        tz: Tz,
        today: NaiveDate,
    ) -> Result<Classification, UpstreamError> {
        let user = format!("Today is {today} in timezone {tz}.\nMessage: {text}");
        let raw = self.client.complete(SYSTEM_PROMPT, &user).await?;

        let classification: Classification = serde_json::from_str(strip_code_fences(&raw))
            .map_err(|error| UpstreamError::MalformedModelOutput(error.to_string()))?;

        debug!(
            event_name = "classifier.classified",
            intent = classification.intent.as_str(),
            has_target_date = classification.target_date.is_some(),
        );
        Ok(classification)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use agendai_core::domain::intent::Intent;
    use agendai_core::errors::UpstreamError;

    use super::{ClassifierService, LlmClassifier};
    use crate::llm::ScriptedLlmClient;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 11, 20).unwrap()
    }

    #[tokio::test]
    async fn valid_model_output_decodes_intent_and_date() {
        let client = ScriptedLlmClient::new();
        client.push_ok(r#"{"intent":"view_agenda","target_date":"2025-11-21"}"#).await;
        let classifier = LlmClassifier::new(client);

        let classification = classifier
            .classify("o que tenho amanhã?", chrono_tz::America::Sao_Paulo, today())
            .await
            .expect("classify");

        assert_eq!(classification.intent, Intent::ViewAgenda);
        assert_eq!(
            classification.target_date,
            NaiveDate::from_ymd_opt(2025, 11, 21)
        );
    }

    #[tokio::test]
    async fn fenced_model_output_still_decodes() {
        let client = ScriptedLlmClient::new();
        client.push_ok("```json\n{\"intent\":\"cancel\"}\n```").await;
        let classifier = LlmClassifier::new(client);

        let classification = classifier
            .classify("cancela o dentista", chrono_tz::America::Sao_Paulo, today())
            .await
            .expect("classify");

        assert_eq!(classification.intent, Intent::Cancel);
        assert!(classification.target_date.is_none());
    }

    #[tokio::test]
    async fn prose_output_fails_closed_as_malformed() {
        let client = ScriptedLlmClient::new();
        client.push_ok("The user wants to schedule something.").await;
        let classifier = LlmClassifier::new(client);

        let result =
            classifier.classify("marca reunião", chrono_tz::America::Sao_Paulo, today()).await;
        assert!(matches!(result, Err(UpstreamError::MalformedModelOutput(_))));
    }
}
