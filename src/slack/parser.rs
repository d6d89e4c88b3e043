//! Slack payload parser.
//!
//! Parses raw request bodies into typed [`SlackPayload`] values. The parser is
//! deliberately lenient: unknown payload kinds and missing optional fields are
//! fine, and only structurally invalid JSON is an error.

use thiserror::Error;

use super::events::SlackPayload;

/// Error type for payload parsing failures.
#[derive(Debug, Error)]
pub enum ParseError {
    /// JSON deserialization failed (not valid JSON, or wrong top-level shape).
    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Parses a raw request body into a typed payload.
///
/// # Examples
///
/// ```
/// use slack_relay::slack::parse_payload;
///
/// let payload = parse_payload(br#"{
///     "type": "event_callback",
///     "event_id": "Ev123",
///     "event": { "type": "message", "channel": "C1", "ts": "1.0" }
/// }"#).unwrap();
/// assert!(!payload.is_handshake());
/// assert!(payload.event.is_some());
/// ```
pub fn parse_payload(body: &[u8]) -> Result<SlackPayload, ParseError> {
    Ok(serde_json::from_slice(body)?)
}
