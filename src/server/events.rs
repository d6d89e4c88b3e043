//! Slack events endpoint handler.
//!
//! The single inbound endpoint of the relay. The flow per request is:
//! parse → handshake short-circuit → authenticate → deduplicate → log →
//! fire-and-forget forward → respond.
//!
//! Every outcome is an HTTP 200 with a short text body. Slack retries
//! aggressively on non-2xx or slow responses, so the response is decided
//! before forwarding is even attempted and nothing downstream can change it.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use tracing::{debug, error, info, warn};

use crate::auth::InboundEnvelope;
use crate::dedup::EventKey;
use crate::slack::{EventBody, parse_payload};

use super::AppState;

/// Body for accepted and no-op outcomes.
pub const RESPONSE_OK: &str = "OK";
/// Body when the delivery was already accepted within the dedup window.
pub const RESPONSE_DUPLICATE: &str = "OK - Already processed";
/// Body when no authentication strategy accepted the request.
pub const RESPONSE_UNAUTHORIZED: &str = "Unauthorized";
/// Body when the request body could not be parsed.
pub const RESPONSE_ERROR: &str = "Error processing request";

/// Events endpoint handler.
///
/// # Request
///
/// - Method: POST
/// - Body: JSON Slack Events API payload
/// - Headers (optional): `X-Slack-Request-Timestamp`, `X-Slack-Signature`
///
/// # Response
///
/// Always 200 text/plain; the body distinguishes outcomes (challenge echo,
/// "OK", "OK - Already processed", "Unauthorized", "Error processing request").
pub async fn event_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let payload = match parse_payload(&body) {
        Ok(payload) => payload,
        Err(e) => {
            error!(
                error = %e,
                raw_body = %String::from_utf8_lossy(&body),
                "failed to parse inbound payload"
            );
            return RESPONSE_ERROR.into_response();
        }
    };

    // Handshake bypasses authentication and deduplication entirely: Slack
    // sends it before any secret exchange is possible.
    if payload.is_handshake() {
        debug!("answering url_verification handshake");
        let challenge = payload.challenge.unwrap_or_default();
        if challenge.is_empty() {
            warn!("url_verification payload carried no challenge");
        }
        return challenge.into_response();
    }

    let envelope = InboundEnvelope {
        headers: &headers,
        body: &body,
    };
    if !state.authenticator().authenticate(&envelope, &payload) {
        return RESPONSE_UNAUTHORIZED.into_response();
    }

    let Some(event) = payload.event.clone() else {
        debug!(kind = %payload.kind, "payload carries no event body; nothing to forward");
        return RESPONSE_OK.into_response();
    };

    match EventKey::derive(&payload) {
        Some(key) => {
            if state.deduplicator().is_duplicate(&key) {
                info!(key = %key, "duplicate delivery; skipping");
                return RESPONSE_DUPLICATE.into_response();
            }
        }
        None => {
            warn!("no usable event identity; duplicate deliveries of this event will reprocess");
        }
    }

    log_event_summary(&state, &event);

    // Fire-and-forget: the response path never awaits the forward, and if the
    // process exits first the loss is acceptable.
    let forwarder = state.forwarder();
    tokio::spawn(async move {
        forwarder.forward(&event).await;
    });

    RESPONSE_OK.into_response()
}

/// Logs one accepted event.
///
/// In debug mode the full event is dumped; otherwise the summary carries only
/// the event type and channel - never message text or secret material.
fn log_event_summary(state: &AppState, event: &EventBody) {
    if state.debug_mode() {
        match serde_json::to_string(event) {
            Ok(json) => debug!(event = %json, "accepted event"),
            Err(e) => debug!(error = %e, "accepted event (not serializable)"),
        }
    } else {
        info!(
            event_type = event.kind.as_deref().unwrap_or(""),
            channel = event.channel.as_ref().map_or("", |c| c.as_str()),
            "accepted event"
        );
    }
}
