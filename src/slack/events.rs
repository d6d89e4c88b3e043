//! Typed Slack Events API payloads.
//!
//! The relay treats every event type identically, so these types carry only
//! the fields the pipeline needs: the outer envelope for handshake/auth/dedup
//! decisions, and the inner event body for forwarding.

use serde::{Deserialize, Serialize};

use crate::types::{ChannelId, EventId, EventTs, UserId};

/// Outer envelope type for a `url_verification` handshake.
pub const KIND_URL_VERIFICATION: &str = "url_verification";

/// The outer Slack Events API payload.
///
/// Fields beyond these exist on the wire (`team_id`, `api_app_id`, ...) and
/// are ignored. All fields are optional in the wire format; the dispatcher
/// decides what each absence means.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SlackPayload {
    /// Payload kind: `url_verification`, `event_callback`, or other.
    #[serde(rename = "type", default)]
    pub kind: String,

    /// Challenge string, present only on handshake payloads.
    pub challenge: Option<String>,

    /// Legacy verification token.
    pub token: Option<String>,

    /// Globally unique event ID, present on `event_callback` payloads.
    pub event_id: Option<EventId>,

    /// The inner event, if any.
    pub event: Option<EventBody>,
}

impl SlackPayload {
    /// Returns true if this payload is a `url_verification` handshake.
    ///
    /// Handshakes bypass authentication and deduplication entirely; the
    /// endpoint answers by echoing the challenge.
    pub fn is_handshake(&self) -> bool {
        self.kind == KIND_URL_VERIFICATION
    }
}

/// The inner event body of an `event_callback` payload.
///
/// Serialized only for debug logging; the forwarder builds its own outbound
/// shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventBody {
    /// Event timestamp; doubles as a per-channel ordering key.
    pub ts: Option<EventTs>,

    /// Channel the event occurred in.
    pub channel: Option<ChannelId>,

    /// User who triggered the event.
    pub user: Option<UserId>,

    /// Message text, if the event carries one.
    ///
    /// Never logged outside debug mode.
    pub text: Option<String>,

    /// Event type (e.g., `message`, `app_mention`).
    #[serde(rename = "type")]
    pub kind: Option<String>,

    /// Client-assigned message ID, present on user-sent messages.
    pub client_msg_id: Option<String>,
}
