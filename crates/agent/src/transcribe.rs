use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use agendai_core::errors::UpstreamError;

#[async_trait]
pub trait TranscriptionService: Send + Sync {
    async fn transcribe(
        &self,
        audio: &[u8],
        mime_hint: Option<&str>,
    ) -> Result<String, UpstreamError>;
}

/// Whisper-style `audio/transcriptions` endpoint over multipart upload.
pub struct HttpTranscriptionService {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
    model: String,
}

impl HttpTranscriptionService {
    pub fn new(base_url: &str, api_key: Option<SecretString>, model: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key,
            model: model.to_owned(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

#[async_trait]
impl TranscriptionService for HttpTranscriptionService {
    async fn transcribe(
        &self,
        audio: &[u8],
        mime_hint: Option<&str>,
    ) -> Result<String, UpstreamError> {
        let mime = mime_hint.unwrap_or("audio/ogg");
        // The channel appends codec hints ("audio/ogg; codecs=opus") that the
        // multipart builder rejects; the bare type is enough.
        let mime = mime.split(';').next().unwrap_or(mime).trim();

        let part = reqwest::multipart::Part::bytes(audio.to_vec())
            .file_name("voice-note.ogg")
            .mime_str(mime)
            .map_err(|error| UpstreamError::Transcription(error.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .text("model", self.model.clone())
            .part("file", part);

        let mut request =
            self.http.post(format!("{}/audio/transcriptions", self.base_url)).multipart(form);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request
            .send()
            .await
            .map_err(|error| UpstreamError::Transcription(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Transcription(format!(
                "provider returned {status}: {detail}"
            )));
        }

        let body: TranscriptionResponse = response
            .json()
            .await
            .map_err(|error| UpstreamError::Transcription(error.to_string()))?;

        debug!(event_name = "transcribe.done", chars = body.text.len());
        Ok(body.text)
    }
}

/// Test double returning a scripted transcript (or failure) regardless of
/// the audio bytes.
#[derive(Default)]
pub struct ScriptedTranscription {
    result: Mutex<Option<Result<String, UpstreamError>>>,
}

impl ScriptedTranscription {
    pub async fn script_ok(&self, transcript: &str) {
        *self.result.lock().await = Some(Ok(transcript.to_owned()));
    }

    pub async fn script_err(&self, error: UpstreamError) {
        *self.result.lock().await = Some(Err(error));
    }
}

#[async_trait]
impl TranscriptionService for ScriptedTranscription {
    async fn transcribe(
        &self,
        _audio: &[u8],
        _mime_hint: Option<&str>,
    ) -> Result<String, UpstreamError> {
        self.result
            .lock()
            .await
            .clone()
            .unwrap_or_else(|| Err(UpstreamError::Transcription("no scripted transcript".to_owned())))
    }
}
