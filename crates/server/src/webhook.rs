//! Inbound webhook: subscription handshake, signature check, two-layer rate
//! limiting, payload decoding. The gate acknowledges fast and hands each
//! message to the orchestrator on its own task; provider failures never
//! surface as webhook errors.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info, warn};

use agendai_channel::{decode_messages, verify_subscription, WebhookPayload};
use agendai_core::errors::GateError;
use agendai_core::security::{verify_signature, RateDecision, RateLimiter};

use crate::orchestrator::Orchestrator;

#[derive(Clone)]
pub struct WebhookState {
    pub orchestrator: Arc<Orchestrator>,
    pub verify_token: SecretString,
    pub webhook_secret: Option<SecretString>,
    pub origin_limiter: Arc<RateLimiter>,
    pub sender_limiter: Arc<RateLimiter>,
    pub origin_ceiling: u32,
    pub sender_ceiling: u32,
}

pub fn router(state: WebhookState) -> Router {
    Router::new()
        .route("/webhook", get(handshake).post(receive))
        .with_state(state)
}

/// Subscription handshake: echo the challenge only when mode and token
/// match; anything else is a 403.
pub async fn handshake(
    State(state): State<WebhookState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let echoed = verify_subscription(
        params.get("hub.mode").map(String::as_str),
        params.get("hub.verify_token").map(String::as_str),
        params.get("hub.challenge").map(String::as_str),
        state.verify_token.expose_secret(),
    );

    match echoed {
        Some(challenge) => {
            info!(event_name = "gate.handshake_accepted");
            (StatusCode::OK, challenge).into_response()
        }
        None => {
            warn!(event_name = "gate.handshake_rejected");
            (StatusCode::FORBIDDEN, "verification failed").into_response()
        }
    }
}

pub async fn receive(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers.get("x-hub-signature-256").and_then(|value| value.to_str().ok());
    if !verify_signature(&body, signature, state.webhook_secret.as_ref()) {
        warn!(event_name = "gate.signature_rejected");
        return rejection(GateError::Authentication, state.origin_ceiling);
    }

    let origin = origin_key(&headers);
    let decision = state.origin_limiter.check(&origin);
    if !decision.allowed {
        warn!(event_name = "gate.origin_throttled", origin = %origin);
        return rejection(
            GateError::RateLimited {
                key: origin,
                remaining: decision.remaining,
                retry_after_secs: decision.retry_after_secs,
            },
            state.origin_ceiling,
        );
    }

    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(error) => {
            warn!(event_name = "gate.payload_rejected", error = %error);
            return rejection(
                GateError::Validation("malformed payload".to_owned()),
                state.origin_ceiling,
            );
        }
    };

    let messages = decode_messages(&payload);
    let single_delivery = messages.len() == 1;
    for message in messages {
        let sender_decision = state.sender_limiter.check(&message.sender_id);
        if !sender_decision.allowed {
            warn!(
                event_name = "gate.sender_throttled",
                sender_id = %message.sender_id,
                retry_after_secs = sender_decision.retry_after_secs,
            );
            // A one-message delivery can carry the sender's quota verdict on
            // the ack itself; batches still ack plainly so siblings proceed.
            if single_delivery {
                return with_quota_headers(
                    StatusCode::OK,
                    state.sender_ceiling,
                    sender_decision,
                );
            }
            continue;
        }

        debug!(event_name = "gate.message_accepted", message_id = %message.message_id);
        let orchestrator = state.orchestrator.clone();
        tokio::spawn(async move {
            orchestrator.handle_message(message).await;
        });
    }

    // Always 200 once past the gate: the channel retries non-2xx deliveries
    // and duplicates are cheaper to suppress via the inbox than to re-receive.
    with_quota_headers(StatusCode::OK, state.origin_ceiling, decision)
}

fn origin_key(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|ip| ip.trim().to_owned())
        .unwrap_or_else(|| "direct".to_owned())
}

/// One typed failure per gate layer; rate-limit rejections keep the quota
/// headers so well-behaved callers can back off.
fn rejection(error: GateError, ceiling: u32) -> Response {
    match error {
        GateError::Authentication => {
            (StatusCode::UNAUTHORIZED, "signature mismatch").into_response()
        }
        GateError::Validation(detail) => (StatusCode::BAD_REQUEST, detail).into_response(),
        GateError::RateLimited { remaining, retry_after_secs, .. } => with_quota_headers(
            StatusCode::TOO_MANY_REQUESTS,
            ceiling,
            RateDecision { allowed: false, remaining, retry_after_secs },
        ),
    }
}

fn with_quota_headers(status: StatusCode, ceiling: u32, decision: RateDecision) -> Response {
    let mut response = status.into_response();
    let headers = response.headers_mut();
    headers.insert("x-ratelimit-limit", ceiling.into());
    headers.insert("x-ratelimit-remaining", decision.remaining.into());
    if !decision.allowed {
        headers.insert("retry-after", decision.retry_after_secs.into());
    }
    response
}

/// Periodically drops elapsed rate-limit windows so the keyed tables stay
/// bounded.
pub fn spawn_limiter_sweep(state: WebhookState, period: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            state.origin_limiter.sweep();
            state.sender_limiter.sweep();
        }
    });
}
