//! Cache Entry Module
//!
//! Defines the record stored for each key: value, cost and timestamps.

use std::time::Duration;

use tokio::time::Instant;

// == Cache Entry ==
/// A single cached record.
///
/// Timestamps come from `tokio::time::Instant`, which reads the monotonic
/// system clock unless a test runtime has paused time.
#[derive(Debug, Clone)]
pub struct Entry<K, V> {
    /// The caller-supplied key
    pub key: K,
    /// The stored value
    pub value: V,
    /// Caller-assigned weight, e.g. a byte size
    pub cost: u64,
    /// When the entry was created (or last replaced, unless preserved)
    pub created_at: Instant,
    /// When the entry was last read or written
    pub accessed_at: Instant,
}

impl<K, V> Entry<K, V> {
    // == Constructor ==
    /// Creates an entry whose creation and access times are both `now`.
    pub fn new(key: K, value: V, cost: u64, now: Instant) -> Self {
        Self {
            key,
            value,
            cost,
            created_at: now,
            accessed_at: now,
        }
    }

    // == Age ==
    /// Time elapsed since creation, saturating at zero.
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }

    // == Is Older Than ==
    /// Returns true if the entry's age strictly exceeds `limit`.
    pub fn is_older_than(&self, limit: Duration, now: Instant) -> bool {
        self.age(now) > limit
    }

    /// Marks the entry as accessed at `now`.
    pub fn touch(&mut self, now: Instant) {
        self.accessed_at = now;
    }
}
