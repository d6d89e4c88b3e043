//! In-memory key-value cache with per-entry expiration.
//!
//! Backs duplicate detection. Entries live for a fixed TTL from insertion;
//! expired entries are ignored on lookup and pruned opportunistically on
//! insert, so the map never grows past the set of keys seen within one TTL
//! window.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::clock::Clock;

/// A concurrent TTL cache of seen markers.
///
/// Lookup and insert happen under one lock, so `check_and_set` is atomic from
/// the caller's perspective: two handlers racing on the same key see exactly
/// one miss.
#[derive(Debug)]
pub struct TtlCache {
    entries: Mutex<HashMap<String, DateTime<Utc>>>,
    ttl: chrono::Duration,
    clock: Arc<dyn Clock>,
}

impl TtlCache {
    /// Creates a cache with the given entry TTL.
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        TtlCache {
            entries: Mutex::new(HashMap::new()),
            // Absurdly large TTLs are clamped so the cutoff arithmetic below
            // cannot overflow.
            ttl: chrono::Duration::from_std(ttl)
                .unwrap_or_else(|_| chrono::Duration::days(365)),
            clock,
        }
    }

    /// Checks whether `key` was seen within the TTL, marking it seen if not.
    ///
    /// Returns `true` on a hit (already seen, entry untouched) and `false` on
    /// a miss (entry inserted with the current time).
    pub fn check_and_set(&self, key: &str) -> bool {
        let now = self.clock.now();
        let cutoff = now - self.ttl;

        let mut entries = self.entries.lock().expect("dedup cache lock poisoned");
        entries.retain(|_, seen_at| *seen_at > cutoff);

        if entries.contains_key(key) {
            return true;
        }
        entries.insert(key.to_string(), now);
        false
    }

    /// Number of live (unexpired at last mutation) entries.
    pub fn len(&self) -> usize {
        self.entries.lock().expect("dedup cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
