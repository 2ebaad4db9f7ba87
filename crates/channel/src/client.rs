use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel transport failure: {0}")]
    Http(#[from] reqwest::Error),
    #[error("channel api rejected request with status {status}: {detail}")]
    Api { status: u16, detail: String },
    #[error("channel media lookup returned no download url for `{media_id}`")]
    MissingMediaUrl { media_id: String },
}

/// One reply button, three at most per message on the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplyButton {
    pub id: String,
    pub title: String,
}

#[async_trait]
pub trait ChannelApi: Send + Sync {
    async fn send_text(&self, recipient: &str, body: &str) -> Result<(), ChannelError>;
    async fn send_buttons(
        &self,
        recipient: &str,
        body: &str,
        buttons: &[ReplyButton],
    ) -> Result<(), ChannelError>;
    async fn mark_read(&self, message_id: &str) -> Result<(), ChannelError>;
    async fn react(&self, recipient: &str, message_id: &str, emoji: &str)
        -> Result<(), ChannelError>;
    async fn download_media(&self, media_id: &str) -> Result<Vec<u8>, ChannelError>;
}

/// Graph-style HTTP client. All message sends go to
/// `{api_base}/{phone_number_id}/messages`; media downloads are two hops
/// (metadata lookup, then the signed url it returns).
pub struct HttpChannelClient {
    http: reqwest::Client,
    api_base: String,
    phone_number_id: String,
    access_token: SecretString,
}

impl HttpChannelClient {
    pub fn new(api_base: &str, phone_number_id: &str, access_token: SecretString) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.trim_end_matches('/').to_owned(),
            phone_number_id: phone_number_id.to_owned(),
            access_token,
        }
    }

    fn messages_url(&self) -> String {
        format!("{}/{}/messages", self.api_base, self.phone_number_id)
    }

    async fn post_message(&self, payload: serde_json::Value) -> Result<(), ChannelError> {
        let response = self
            .http
            .post(self.messages_url())
            .bearer_auth(self.access_token.expose_secret())
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ChannelError::Api { status: status.as_u16(), detail });
        }

        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct MediaLookup {
    #[serde(default)]
    url: Option<String>,
}

#[async_trait]
impl ChannelApi for HttpChannelClient {
    async fn send_text(&self, recipient: &str, body: &str) -> Result<(), ChannelError> {
        debug!(event_name = "channel.send_text", recipient, "sending text reply");
        self.post_message(json!({
            "messaging_product": "whatsapp",
            "to": recipient,
            "type": "text",
            "text": {"body": body},
        }))
        .await
    }

    async fn send_buttons(
        &self,
        recipient: &str,
        body: &str,
        buttons: &[ReplyButton],
    ) -> Result<(), ChannelError> {
        let rendered: Vec<_> = buttons
            .iter()
            .take(3)
            .map(|button| {
                json!({"type": "reply", "reply": {"id": button.id, "title": button.title}})
            })
            .collect();

        self.post_message(json!({
            "messaging_product": "whatsapp",
            "to": recipient,
            "type": "interactive",
            "interactive": {
                "type": "button",
                "body": {"text": body},
                "action": {"buttons": rendered},
            },
        }))
        .await
    }

    async fn mark_read(&self, message_id: &str) -> Result<(), ChannelError> {
        self.post_message(json!({
            "messaging_product": "whatsapp",
            "status": "read",
            "message_id": message_id,
        }))
        .await
    }

    async fn react(
        &self,
        recipient: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), ChannelError> {
        self.post_message(json!({
            "messaging_product": "whatsapp",
            "to": recipient,
            "type": "reaction",
            "reaction": {"message_id": message_id, "emoji": emoji},
        }))
        .await
    }

    async fn download_media(&self, media_id: &str) -> Result<Vec<u8>, ChannelError> {
        let lookup_url = format!("{}/{}", self.api_base, media_id);
        let response = self
            .http
            .get(lookup_url)
            .bearer_auth(self.access_token.expose_secret())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ChannelError::Api { status: status.as_u16(), detail });
        }

        let lookup: MediaLookup = response.json().await?;
        let url = lookup
            .url
            .ok_or_else(|| ChannelError::MissingMediaUrl { media_id: media_id.to_owned() })?;

        let media = self
            .http
            .get(url)
            .bearer_auth(self.access_token.expose_secret())
            .send()
            .await?;

        let status = media.status();
        if !status.is_success() {
            let detail = media.text().await.unwrap_or_default();
            return Err(ChannelError::Api { status: status.as_u16(), detail });
        }

        Ok(media.bytes().await?.to_vec())
    }
}

/// Outbound traffic captured by [`RecordingChannelApi`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SentMessage {
    Text { recipient: String, body: String },
    Buttons { recipient: String, body: String, buttons: Vec<ReplyButton> },
    Read { message_id: String },
    Reaction { recipient: String, message_id: String, emoji: String },
}

/// Test double that records every call and serves scripted media bytes.
#[derive(Default)]
pub struct RecordingChannelApi {
    sent: Mutex<Vec<SentMessage>>,
    media: Mutex<Vec<(String, Vec<u8>)>>,
    fail_sends: std::sync::atomic::AtomicBool,
}

impl RecordingChannelApi {
    pub async fn stock_media(&self, media_id: &str, bytes: Vec<u8>) {
        self.media.lock().await.push((media_id.to_owned(), bytes));
    }

    pub fn fail_sends(&self) {
        self.fail_sends.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    pub async fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().await.clone()
    }

    /// Text bodies only, in send order.
    pub async fn text_bodies(&self) -> Vec<String> {
        self.sent
            .lock()
            .await
            .iter()
            .filter_map(|message| match message {
                SentMessage::Text { body, .. } => Some(body.clone()),
                _ => None,
            })
            .collect()
    }

    async fn record(&self, message: SentMessage) -> Result<(), ChannelError> {
        if self.fail_sends.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(ChannelError::Api { status: 500, detail: "scripted failure".to_owned() });
        }
        self.sent.lock().await.push(message);
        Ok(())
    }
}

#[async_trait]
impl ChannelApi for RecordingChannelApi {
    async fn send_text(&self, recipient: &str, body: &str) -> Result<(), ChannelError> {
        self.record(SentMessage::Text {
            recipient: recipient.to_owned(),
            body: body.to_owned(),
        })
        .await
    }

    async fn send_buttons(
        &self,
        recipient: &str,
        body: &str,
        buttons: &[ReplyButton],
    ) -> Result<(), ChannelError> {
        self.record(SentMessage::Buttons {
            recipient: recipient.to_owned(),
            body: body.to_owned(),
            buttons: buttons.to_vec(),
        })
        .await
    }

    async fn mark_read(&self, message_id: &str) -> Result<(), ChannelError> {
        self.record(SentMessage::Read { message_id: message_id.to_owned() }).await
    }

    async fn react(
        &self,
        recipient: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), ChannelError> {
        self.record(SentMessage::Reaction {
            recipient: recipient.to_owned(),
            message_id: message_id.to_owned(),
            emoji: emoji.to_owned(),
        })
        .await
    }

    async fn download_media(&self, media_id: &str) -> Result<Vec<u8>, ChannelError> {
        let media = self.media.lock().await;
        media
            .iter()
            .find(|(id, _)| id == media_id)
            .map(|(_, bytes)| bytes.clone())
            .ok_or_else(|| ChannelError::MissingMediaUrl { media_id: media_id.to_owned() })
    }
}
