use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Map, Value};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use agendai_core::domain::event::EventDraft;
use agendai_core::errors::UpstreamError;

#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error("knowledge transport failure: {0}")]
    Http(#[from] reqwest::Error),
    #[error("knowledge api rejected request with status {status}: {detail}")]
    Api { status: u16, detail: String },
    #[error("knowledge credential is malformed: {0}")]
    Credential(String),
}

impl From<KnowledgeError> for UpstreamError {
    fn from(error: KnowledgeError) -> Self {
        Self::Knowledge(error.to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PropertyKind {
    Title,
    Date,
    RichText,
    Select,
    Other,
}

/// One column of the user's database, as reported by the provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PropertyDescriptor {
    pub name: String,
    pub kind: PropertyKind,
}

#[async_trait]
pub trait KnowledgeConnector: Send + Sync {
    /// Records the draft in the user's knowledge base. Always best-effort
    /// from the orchestrator's point of view.
    async fn record_event(
        &self,
        credentials: &SecretString,
        draft: &EventDraft,
    ) -> Result<(), KnowledgeError>;
}

fn name_matches(name: &str, hints: &[&str]) -> bool {
    let normalized = name.to_lowercase();
    hints.iter().any(|hint| normalized.contains(hint))
}

/// Maps a draft onto whatever columns the target database actually has.
/// Users rename and reshape their databases freely; the mapping keys off
/// property kinds and name hints and silently drops what has no home.
pub fn map_draft_to_properties(draft: &EventDraft, schema: &[PropertyDescriptor]) -> Value {
    let mut properties = Map::new();

    for property in schema {
        let value = match property.kind {
            PropertyKind::Title => Some(json!({
                "title": [{"text": {"content": draft.title}}]
            })),
            PropertyKind::Date => {
                let start = if draft.all_day {
                    json!({"start": draft.start.date_naive().to_string()})
                } else {
                    json!({"start": draft.start.to_rfc3339()})
                };
                Some(json!({"date": start}))
            }
            PropertyKind::Select if name_matches(&property.name, &["tipo", "type", "categoria"]) => {
                Some(json!({"select": {"name": draft.event_type.as_str()}}))
            }
            PropertyKind::RichText => {
                if name_matches(&property.name, &["local", "location", "lugar"]) {
                    draft.location.as_ref()
                } else if name_matches(
                    &property.name,
                    &["entidade", "empresa", "cliente", "source"],
                ) {
                    draft.source_entity.as_ref()
                } else if name_matches(&property.name, &["descri", "nota", "note", "detalhe"]) {
                    draft.description.as_ref()
                } else {
                    None
                }
                .map(|text| json!({"rich_text": [{"text": {"content": text}}]}))
            }
            _ => None,
        };

        if let Some(value) = value {
            properties.insert(property.name.clone(), value);
        }
    }

    Value::Object(properties)
}

/// Notion-style connector. The stored credential is `token:database_id`,
/// set when the user links their knowledge base.
pub struct RestKnowledgeConnector {
    http: reqwest::Client,
    api_base: String,
}

impl RestKnowledgeConnector {
    pub fn new(api_base: &str) -> Self {
        Self { http: reqwest::Client::new(), api_base: api_base.trim_end_matches('/').to_owned() }
    }

    async fn fetch_schema(
        &self,
        token: &str,
        database_id: &str,
    ) -> Result<Vec<PropertyDescriptor>, KnowledgeError> {
        let response = self
            .http
            .get(format!("{}/v1/databases/{database_id}", self.api_base))
            .bearer_auth(token)
            .header("Notion-Version", "2022-06-28")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(KnowledgeError::Api { status: status.as_u16(), detail });
        }

        let body: Value = response.json().await?;
        let mut schema = Vec::new();
        if let Some(properties) = body["properties"].as_object() {
            for (name, descriptor) in properties {
                let kind = match descriptor["type"].as_str() {
                    Some("title") => PropertyKind::Title,
                    Some("date") => PropertyKind::Date,
                    Some("rich_text") => PropertyKind::RichText,
                    Some("select") => PropertyKind::Select,
                    _ => PropertyKind::Other,
                };
                schema.push(PropertyDescriptor { name: name.clone(), kind });
            }
        }
        Ok(schema)
    }
}

fn split_credential(credentials: &SecretString) -> Result<(String, String), KnowledgeError> {
    let exposed = credentials.expose_secret();
    let (token, database_id) = exposed.split_once(':').ok_or_else(|| {
        KnowledgeError::Credential("expected `token:database_id`".to_owned())
    })?;
    if token.is_empty() || database_id.is_empty() {
        return Err(KnowledgeError::Credential("empty token or database id".to_owned()));
    }
    Ok((token.to_owned(), database_id.to_owned()))
}

#[async_trait]
impl KnowledgeConnector for RestKnowledgeConnector {
    async fn record_event(
        &self,
        credentials: &SecretString,
        draft: &EventDraft,
    ) -> Result<(), KnowledgeError> {
        let (token, database_id) = split_credential(credentials)?;
        let schema = self.fetch_schema(&token, &database_id).await?;
        let properties = map_draft_to_properties(draft, &schema);

        let response = self
            .http
            .post(format!("{}/v1/pages", self.api_base))
            .bearer_auth(&token)
            .header("Notion-Version", "2022-06-28")
            .json(&json!({
                "parent": {"database_id": database_id},
                "properties": properties,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(KnowledgeError::Api { status: status.as_u16(), detail });
        }

        debug!(event_name = "knowledge.recorded", title = %draft.title);
        Ok(())
    }
}

/// Test double recording the titles it was asked to store.
#[derive(Default)]
pub struct FakeKnowledge {
    recorded: Mutex<Vec<String>>,
    fail: std::sync::atomic::AtomicBool,
}

impl FakeKnowledge {
    pub fn fail_records(&self) {
        self.fail.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    pub async fn recorded_titles(&self) -> Vec<String> {
        self.recorded.lock().await.clone()
    }
}

#[async_trait]
impl KnowledgeConnector for FakeKnowledge {
    async fn record_event(
        &self,
        _credentials: &SecretString,
        draft: &EventDraft,
    ) -> Result<(), KnowledgeError> {
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(KnowledgeError::Api { status: 500, detail: "scripted failure".to_owned() });
        }
        self.recorded.lock().await.push(draft.title.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use secrecy::SecretString;

    use agendai_core::domain::event::{EventDraft, EventType};

    use super::{map_draft_to_properties, split_credential, PropertyDescriptor, PropertyKind};

    fn draft(all_day: bool) -> EventDraft {
        EventDraft {
            title: "Audiência trabalhista".to_owned(),
            start: Utc.with_ymd_and_hms(2025, 12, 30, 13, 0, 0).unwrap(),
            end: None,
            all_day,
            description: Some("Levar documentos".to_owned()),
            location: Some("Fórum central".to_owned()),
            attendees: vec![],
            source_entity: Some("Empresa X".to_owned()),
            event_type: EventType::Hearing,
        }
    }

    fn property(name: &str, kind: PropertyKind) -> PropertyDescriptor {
        PropertyDescriptor { name: name.to_owned(), kind }
    }

    #[test]
    fn mapping_adapts_to_renamed_columns() {
        let schema = vec![
            property("Nome", PropertyKind::Title),
            property("Quando", PropertyKind::Date),
            property("Tipo", PropertyKind::Select),
            property("Local", PropertyKind::RichText),
            property("Empresa", PropertyKind::RichText),
        ];

        let properties = map_draft_to_properties(&draft(false), &schema);
        assert_eq!(
            properties["Nome"]["title"][0]["text"]["content"],
            "Audiência trabalhista"
        );
        assert_eq!(properties["Quando"]["date"]["start"], "2025-12-30T13:00:00+00:00");
        assert_eq!(properties["Tipo"]["select"]["name"], "hearing");
        assert_eq!(properties["Local"]["rich_text"][0]["text"]["content"], "Fórum central");
        assert_eq!(properties["Empresa"]["rich_text"][0]["text"]["content"], "Empresa X");
    }

    #[test]
    fn all_day_drafts_store_a_bare_date() {
        let schema = vec![property("Data", PropertyKind::Date)];
        let properties = map_draft_to_properties(&draft(true), &schema);
        assert_eq!(properties["Data"]["date"]["start"], "2025-12-30");
    }

    #[test]
    fn unmapped_columns_are_dropped_not_invented() {
        let schema = vec![
            property("Nome", PropertyKind::Title),
            property("Checkbox qualquer", PropertyKind::Other),
        ];
        let properties = map_draft_to_properties(&draft(false), &schema);
        assert!(properties.get("Checkbox qualquer").is_none());
    }

    #[test]
    fn credential_must_carry_token_and_database_id() {
        assert!(split_credential(&SecretString::from("tok:db-1")).is_ok());
        assert!(split_credential(&SecretString::from("tok-only")).is_err());
        assert!(split_credential(&SecretString::from(":db-1")).is_err());
    }
}
