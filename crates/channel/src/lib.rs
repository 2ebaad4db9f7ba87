//! Messaging channel integration
//!
//! This crate speaks the WhatsApp-style Cloud API on both directions:
//! - **Payloads** (`payload`) - webhook JSON decoding and the subscription
//!   handshake (`hub.mode` / `hub.verify_token` / `hub.challenge`)
//! - **Client** (`client`) - outbound sends, read receipts, reactions and
//!   media downloads over the Graph-style HTTP API
//!
//! Inbound deliveries are decoded into `agendai_core::domain::InboundMessage`
//! values; everything the pipeline cannot handle (stickers, locations,
//! contacts) is surfaced as `MessageKind::Unsupported` so the orchestrator
//! can answer with a capability hint instead of dropping the message.

pub mod client;
pub mod payload;

pub use client::{
    ChannelApi, ChannelError, HttpChannelClient, RecordingChannelApi, ReplyButton, SentMessage,
};
pub use payload::{decode_messages, verify_subscription, WebhookPayload};
