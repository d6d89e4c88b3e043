//! Duplicate suppression for Slack event deliveries.
//!
//! Slack retries deliveries aggressively (slow responses, non-2xx), so the
//! same logical event can arrive more than once. This module derives a stable
//! identity per event and consults a TTL cache to enforce at-most-once
//! acceptance within the window.
//!
//! # Identity fallback order
//!
//! 1. `event_id` - globally unique, preferred
//! 2. `event.client_msg_id` - unique per user-sent message
//! 3. `event.channel + "_" + event.ts` - ts is only unique per channel
//! 4. `event.ts` alone
//! 5. none - the event is not deduplicable and is always processed

pub mod cache;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::clock::Clock;
use crate::slack::SlackPayload;

pub use cache::TtlCache;

/// A derived identity for one Slack event, used only as a dedup cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventKey(String);

impl EventKey {
    /// Derives the identity for a payload, trying each source in fallback
    /// order. Returns `None` when the payload carries nothing usable.
    pub fn derive(payload: &SlackPayload) -> Option<EventKey> {
        if let Some(event_id) = &payload.event_id {
            return Some(EventKey(event_id.as_str().to_string()));
        }

        let event = payload.event.as_ref()?;
        if let Some(client_msg_id) = &event.client_msg_id {
            return Some(EventKey(client_msg_id.clone()));
        }
        match (&event.channel, &event.ts) {
            (Some(channel), Some(ts)) => {
                Some(EventKey(format!("{}_{}", channel.as_str(), ts.as_str())))
            }
            (None, Some(ts)) => Some(EventKey(ts.as_str().to_string())),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Enforces at-most-once acceptance of an event identity within the TTL.
#[derive(Debug)]
pub struct Deduplicator {
    cache: TtlCache,
}

impl Deduplicator {
    /// Creates a deduplicator with the given window.
    ///
    /// The TTL should be at least Slack's retry interval; a retry arriving
    /// after expiry is treated as a new event.
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Deduplicator {
            cache: TtlCache::new(ttl, clock),
        }
    }

    /// Returns `true` if `key` was already accepted within the window.
    ///
    /// On a miss the key is marked seen immediately, so a concurrent retry of
    /// the same delivery observes a hit.
    pub fn is_duplicate(&self, key: &EventKey) -> bool {
        let duplicate = self.cache.check_and_set(key.as_str());
        if duplicate {
            debug!(key = %key, "event already accepted within dedup window");
        }
        duplicate
    }
}
