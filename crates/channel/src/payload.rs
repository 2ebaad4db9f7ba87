use serde::Deserialize;

use agendai_core::domain::message::{InboundMessage, MessageKind};

/// Top-level webhook body. One delivery can batch several entries, each with
/// several changes; message changes and status changes arrive on the same
/// endpoint and only the former carry user content.
#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub object: Option<String>,
    #[serde(default)]
    pub entry: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
pub struct Entry {
    #[serde(default)]
    pub changes: Vec<Change>,
}

#[derive(Debug, Deserialize)]
pub struct Change {
    pub value: ChangeValue,
}

#[derive(Debug, Deserialize)]
pub struct ChangeValue {
    #[serde(default)]
    pub contacts: Vec<Contact>,
    #[serde(default)]
    pub messages: Vec<RawMessage>,
}

#[derive(Debug, Deserialize)]
pub struct Contact {
    pub wa_id: String,
    #[serde(default)]
    pub profile: Option<Profile>,
}

#[derive(Debug, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawMessage {
    pub from: String,
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<TextContent>,
    #[serde(default)]
    pub audio: Option<AudioContent>,
    #[serde(default)]
    pub interactive: Option<InteractiveContent>,
}

#[derive(Debug, Deserialize)]
pub struct TextContent {
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct AudioContent {
    pub id: String,
    #[serde(default)]
    pub mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct InteractiveContent {
    #[serde(default)]
    pub button_reply: Option<ButtonReply>,
}

#[derive(Debug, Deserialize)]
pub struct ButtonReply {
    pub title: String,
}

/// Flattens a webhook delivery into the messages the pipeline understands.
/// Status-only deliveries (sent/delivered/read receipts) flatten to nothing.
pub fn decode_messages(payload: &WebhookPayload) -> Vec<InboundMessage> {
    let mut inbound = Vec::new();

    for entry in &payload.entry {
        for change in &entry.changes {
            for raw in &change.value.messages {
                let sender_name = change
                    .value
                    .contacts
                    .iter()
                    .find(|contact| contact.wa_id == raw.from)
                    .and_then(|contact| contact.profile.as_ref())
                    .and_then(|profile| profile.name.clone());

                inbound.push(InboundMessage {
                    sender_id: raw.from.clone(),
                    message_id: raw.id.clone(),
                    sender_name,
                    kind: message_kind(raw),
                });
            }
        }
    }

    inbound
}

fn message_kind(raw: &RawMessage) -> MessageKind {
    match raw.kind.as_str() {
        "text" => match &raw.text {
            Some(text) => MessageKind::Text { body: text.body.clone() },
            None => MessageKind::Unsupported { kind: "text-without-body".to_owned() },
        },
        "audio" | "voice" => match &raw.audio {
            Some(audio) => MessageKind::Audio {
                media_id: audio.id.clone(),
                mime_hint: audio.mime_type.clone(),
            },
            None => MessageKind::Unsupported { kind: "audio-without-media".to_owned() },
        },
        // A tapped reply button carries its label; treat it as typed text.
        "interactive" => match raw.interactive.as_ref().and_then(|i| i.button_reply.as_ref()) {
            Some(reply) => MessageKind::Text { body: reply.title.clone() },
            None => MessageKind::Unsupported { kind: "interactive".to_owned() },
        },
        other => MessageKind::Unsupported { kind: other.to_owned() },
    }
}

/// Subscription handshake for `GET /webhook`. Echo the challenge only when
/// the platform asks to subscribe with the exact token we configured.
pub fn verify_subscription(
    mode: Option<&str>,
    token: Option<&str>,
    challenge: Option<&str>,
    expected_token: &str,
) -> Option<String> {
    if mode != Some("subscribe") {
        return None;
    }
    if token != Some(expected_token) {
        return None;
    }
    challenge.map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use agendai_core::domain::message::MessageKind;

    use super::{decode_messages, verify_subscription, WebhookPayload};

    fn payload(json: &str) -> WebhookPayload {
        serde_json::from_str(json).expect("valid webhook json")
    }

    #[test]
    fn decodes_text_message_with_profile_name() {
        let payload = payload(
            r#"{
              "object": "whatsapp_business_account",
              "entry": [{
                "changes": [{
                  "value": {
                    "contacts": [{"wa_id": "5511999990000", "profile": {"name": "Ana"}}],
                    "messages": [{
                      "from": "5511999990000",
                      "id": "wamid.abc",
                      "type": "text",
                      "text": {"body": "reunião amanhã às 14h"}
                    }]
                  }
                }]
              }]
            }"#,
        );

        let messages = decode_messages(&payload);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].sender_id, "5511999990000");
        assert_eq!(messages[0].message_id, "wamid.abc");
        assert_eq!(messages[0].sender_name.as_deref(), Some("Ana"));
        assert_eq!(
            messages[0].kind,
            MessageKind::Text { body: "reunião amanhã às 14h".to_owned() }
        );
    }

    #[test]
    fn decodes_audio_message_with_media_id() {
        let payload = payload(
            r#"{
              "entry": [{
                "changes": [{
                  "value": {
                    "messages": [{
                      "from": "5511999990000",
                      "id": "wamid.audio",
                      "type": "audio",
                      "audio": {"id": "media-1", "mime_type": "audio/ogg; codecs=opus"}
                    }]
                  }
                }]
              }]
            }"#,
        );

        let messages = decode_messages(&payload);
        assert_eq!(
            messages[0].kind,
            MessageKind::Audio {
                media_id: "media-1".to_owned(),
                mime_hint: Some("audio/ogg; codecs=opus".to_owned()),
            }
        );
    }

    #[test]
    fn button_reply_decodes_as_text() {
        let payload = payload(
            r#"{
              "entry": [{
                "changes": [{
                  "value": {
                    "messages": [{
                      "from": "5511999990000",
                      "id": "wamid.btn",
                      "type": "interactive",
                      "interactive": {"button_reply": {"id": "opt-1", "title": "Ver agenda"}}
                    }]
                  }
                }]
              }]
            }"#,
        );

        let messages = decode_messages(&payload);
        assert_eq!(messages[0].kind, MessageKind::Text { body: "Ver agenda".to_owned() });
    }

    #[test]
    fn sticker_surfaces_as_unsupported_kind() {
        let payload = payload(
            r#"{
              "entry": [{
                "changes": [{
                  "value": {
                    "messages": [{
                      "from": "5511999990000",
                      "id": "wamid.sticker",
                      "type": "sticker"
                    }]
                  }
                }]
              }]
            }"#,
        );

        let messages = decode_messages(&payload);
        assert_eq!(messages[0].kind, MessageKind::Unsupported { kind: "sticker".to_owned() });
    }

    #[test]
    fn status_only_delivery_flattens_to_nothing() {
        let payload = payload(
            r#"{
              "entry": [{
                "changes": [{
                  "value": {
                    "statuses": [{"id": "wamid.abc", "status": "delivered"}]
                  }
                }]
              }]
            }"#,
        );

        assert!(decode_messages(&payload).is_empty());
    }

    #[test]
    fn handshake_echoes_challenge_for_matching_token() {
        let echoed =
            verify_subscription(Some("subscribe"), Some("tok-1"), Some("challenge-42"), "tok-1");
        assert_eq!(echoed.as_deref(), Some("challenge-42"));
    }

    #[test]
    fn handshake_rejects_wrong_token_or_mode() {
        assert!(verify_subscription(Some("subscribe"), Some("bad"), Some("c"), "tok-1").is_none());
        assert!(verify_subscription(Some("ping"), Some("tok-1"), Some("c"), "tok-1").is_none());
        assert!(verify_subscription(None, Some("tok-1"), Some("c"), "tok-1").is_none());
    }
}
