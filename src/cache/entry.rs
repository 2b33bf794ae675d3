//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with age tracking.

use std::time::{Duration, Instant};

// == Cache Entry ==
/// Represents a single cached producer result with its insertion time.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// The stored value
    pub value: V,
    /// When the value was written
    pub inserted_at: Instant,
}

impl<V> CacheEntry<V> {
    // == Constructor ==
    /// Creates a new cache entry stamped with `now`.
    pub fn new(value: V, now: Instant) -> Self {
        Self {
            value,
            inserted_at: now,
        }
    }

    // == Age ==
    /// Returns how long ago the entry was written.
    ///
    /// Saturates to zero if `now` precedes the insertion time.
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.inserted_at)
    }

    // == Is Expired ==
    /// Checks if the entry has outlived `ttl`.
    ///
    /// Boundary condition: an entry whose age equals the TTL is expired, so an
    /// entry is fresh only while `now - inserted_at < ttl`.
    ///
    /// # Returns
    /// - `true` if a TTL is set and the entry's age is >= TTL
    /// - `false` if no TTL is set (never expires) or TTL hasn't elapsed
    pub fn is_expired(&self, ttl: Option<Duration>, now: Instant) -> bool {
        match ttl {
            Some(ttl) => self.age(now) >= ttl,
            None => false,
        }
    }

    // == Time To Live ==
    /// Returns the remaining lifetime, or None if no TTL is set.
    ///
    /// Returns `Some(Duration::ZERO)` once the entry has expired.
    pub fn ttl_remaining(&self, ttl: Option<Duration>, now: Instant) -> Option<Duration> {
        ttl.map(|ttl| ttl.saturating_sub(self.age(now)))
    }
}
