/// One inbound delivery from the messaging channel. Created per webhook
/// payload, discarded after the flow replies.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    pub sender_id: String,
    pub message_id: String,
    pub sender_name: Option<String>,
    pub kind: MessageKind,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageKind {
    Text { body: String },
    Audio { media_id: String, mime_hint: Option<String> },
    Unsupported { kind: String },
}

impl InboundMessage {
    pub fn is_audio(&self) -> bool {
        matches!(self.kind, MessageKind::Audio { .. })
    }
}
