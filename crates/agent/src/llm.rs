use std::collections::VecDeque;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::debug;

use agendai_core::config::{LlmConfig, LlmProvider};
use agendai_core::errors::UpstreamError;

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// One completion round: system instructions plus one user turn, plain
    /// text back. Callers own prompt construction and output decoding.
    async fn complete(&self, system: &str, user: &str) -> Result<String, UpstreamError>;
}

/// Models love to wrap JSON in markdown fences even when told not to.
/// Strip one fence layer before strict decoding; everything else stays as-is.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

#[async_trait]
impl<T> LlmClient for std::sync::Arc<T>
where
    T: LlmClient + ?Sized,
{
    async fn complete(&self, system: &str, user: &str) -> Result<String, UpstreamError> {
        (**self).complete(system, user).await
    }
}

pub struct HttpLlmClient {
    http: reqwest::Client,
    provider: LlmProvider,
    api_key: Option<SecretString>,
    base_url: String,
    model: String,
}

impl HttpLlmClient {
    pub fn from_config(config: &LlmConfig) -> Self {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| default_base_url(config.provider).to_owned());

        Self {
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(config.timeout_secs))
                .build()
                .unwrap_or_default(),
            provider: config.provider,
            api_key: config.api_key.clone(),
            base_url: base_url.trim_end_matches('/').to_owned(),
            model: config.model.clone(),
        }
    }

    async fn complete_openai(&self, system: &str, user: &str) -> Result<String, UpstreamError> {
        let mut request = self.http.post(format!("{}/chat/completions", self.base_url)).json(
            &json!({
                "model": self.model,
                "temperature": 0,
                "messages": [
                    {"role": "system", "content": system},
                    {"role": "user", "content": user},
                ],
            }),
        );
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let body = send_checked(request).await?;
        body["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| UpstreamError::Model("completion response had no content".to_owned()))
    }

    async fn complete_anthropic(&self, system: &str, user: &str) -> Result<String, UpstreamError> {
        let mut request = self.http.post(format!("{}/v1/messages", self.base_url)).json(&json!({
            "model": self.model,
            "max_tokens": 1024,
            "system": system,
            "messages": [{"role": "user", "content": user}],
        }));
        request = request.header("anthropic-version", "2023-06-01");
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key.expose_secret());
        }

        let body = send_checked(request).await?;
        body["content"][0]["text"]
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| UpstreamError::Model("message response had no text block".to_owned()))
    }

    async fn complete_ollama(&self, system: &str, user: &str) -> Result<String, UpstreamError> {
        let request = self.http.post(format!("{}/api/chat", self.base_url)).json(&json!({
            "model": self.model,
            "stream": false,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
        }));

        let body = send_checked(request).await?;
        body["message"]["content"]
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| UpstreamError::Model("chat response had no content".to_owned()))
    }
}

fn default_base_url(provider: LlmProvider) -> &'static str {
    match provider {
        LlmProvider::OpenAi => "https://api.openai.com/v1",
        LlmProvider::Anthropic => "https://api.anthropic.com",
        LlmProvider::Ollama => "http://localhost:11434",
    }
}

async fn send_checked(request: reqwest::RequestBuilder) -> Result<serde_json::Value, UpstreamError> {
    let response =
        request.send().await.map_err(|error| UpstreamError::Model(error.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let detail = response.text().await.unwrap_or_default();
        return Err(UpstreamError::Model(format!("provider returned {status}: {detail}")));
    }

    response.json().await.map_err(|error| UpstreamError::Model(error.to_string()))
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, system: &str, user: &str) -> Result<String, UpstreamError> {
        debug!(event_name = "llm.complete", provider = ?self.provider, model = %self.model);
        match self.provider {
            LlmProvider::OpenAi => self.complete_openai(system, user).await,
            LlmProvider::Anthropic => self.complete_anthropic(system, user).await,
            LlmProvider::Ollama => self.complete_ollama(system, user).await,
        }
    }
}

/// Test double serving queued replies in order. An exhausted script is a
/// model failure, which keeps accidental extra calls visible in tests.
#[derive(Default)]
pub struct ScriptedLlmClient {
    replies: Mutex<VecDeque<Result<String, UpstreamError>>>,
}

impl ScriptedLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push_ok(&self, reply: &str) {
        self.replies.lock().await.push_back(Ok(reply.to_owned()));
    }

    pub async fn push_err(&self, error: UpstreamError) {
        self.replies.lock().await.push_back(Err(error));
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, _system: &str, _user: &str) -> Result<String, UpstreamError> {
        self.replies
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Err(UpstreamError::Model("scripted replies exhausted".to_owned())))
    }
}

#[cfg(test)]
mod tests {
    use agendai_core::errors::UpstreamError;

    use super::{strip_code_fences, LlmClient, ScriptedLlmClient};

    #[test]
    fn fence_stripping_handles_bare_and_fenced_output() {
        assert_eq!(strip_code_fences("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{\"a\":1}\n```"), "{\"a\":1}");
    }

    #[tokio::test]
    async fn scripted_client_serves_replies_in_order_then_fails() {
        let client = ScriptedLlmClient::new();
        client.push_ok("first").await;
        client.push_err(UpstreamError::Model("boom".to_owned())).await;

        assert_eq!(client.complete("s", "u").await.expect("first"), "first");
        assert!(matches!(client.complete("s", "u").await, Err(UpstreamError::Model(_))));
        assert!(matches!(client.complete("s", "u").await, Err(UpstreamError::Model(_))));
    }
}
