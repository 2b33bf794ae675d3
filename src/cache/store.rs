//! Cache Store Module
//!
//! Bounded key-value storage combining a HashMap with LRU tracking and lazy
//! TTL expiration.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::cache::{CacheEntry, CacheKey, CacheStats, Clock, LruTracker, SystemClock};
use crate::config::CacheConfig;
use crate::error::Result;

// == Cache Store ==
/// Cache storage with LRU eviction and TTL support.
///
/// Expired entries are only discovered when read; there is no sweeper.
#[derive(Debug)]
pub struct CacheStore<V> {
    /// Key-value storage
    entries: HashMap<CacheKey, CacheEntry<V>>,
    /// LRU access tracker
    lru: LruTracker<CacheKey>,
    /// Performance statistics
    stats: CacheStats,
    /// Maximum number of entries, None = unbounded
    max_size: Option<usize>,
    /// Maximum entry age, None = never expires
    ttl: Option<Duration>,
    /// Time source for insertion stamps and expiry checks
    clock: Arc<dyn Clock>,
}

impl<V: Clone> CacheStore<V> {
    // == Constructor ==
    /// Creates a store driven by the system clock.
    pub fn new(config: &CacheConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Creates a store driven by the given clock.
    ///
    /// Fails if the configuration is invalid (zero size or zero TTL).
    pub fn with_clock(config: &CacheConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            entries: HashMap::new(),
            lru: LruTracker::new(),
            stats: CacheStats::new(),
            max_size: config.max_size,
            ttl: config.ttl,
            clock,
        })
    }

    // == Get ==
    /// Retrieves a value by key, promoting it to most recently used.
    ///
    /// An entry older than the TTL is removed and reported as absent.
    pub fn get(&mut self, key: &CacheKey) -> Option<V> {
        let now = self.clock.now();

        let expired = match self.entries.get(key) {
            Some(entry) => entry.is_expired(self.ttl, now),
            None => {
                self.stats.record_miss();
                return None;
            }
        };

        if expired {
            self.entries.remove(key);
            self.lru.remove(key);
            self.stats.record_expiration();
            self.stats.record_miss();
            self.stats.set_total_entries(self.entries.len());
            debug!(%key, "cache entry expired");
            return None;
        }

        self.stats.record_hit();
        self.lru.touch(key);
        self.entries.get(key).map(|entry| entry.value.clone())
    }

    // == Put ==
    /// Inserts or overwrites an entry and marks it most recently used.
    ///
    /// The insertion time is reset on overwrite. If the store grows past
    /// `max_size`, least recently used entries are evicted.
    pub fn put(&mut self, key: CacheKey, value: V) {
        let entry = CacheEntry::new(value, self.clock.now());
        self.lru.touch(&key);
        self.entries.insert(key, entry);

        if let Some(max_size) = self.max_size {
            while self.entries.len() > max_size {
                match self.lru.evict_oldest() {
                    Some(evicted) => {
                        self.entries.remove(&evicted);
                        self.stats.record_eviction();
                        debug!(key = %evicted, "evicted least recently used entry");
                    }
                    None => break,
                }
            }
        }

        self.stats.set_total_entries(self.entries.len());
    }

    // == Remove ==
    /// Removes an entry by key. Returns false if it was absent.
    pub fn remove(&mut self, key: &CacheKey) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            self.lru.remove(key);
            self.stats.set_total_entries(self.entries.len());
        }
        removed
    }

    // == Contains ==
    /// Checks for a fresh entry without touching recency or statistics.
    pub fn contains(&self, key: &CacheKey) -> bool {
        let now = self.clock.now();
        self.entries
            .get(key)
            .map(|entry| !entry.is_expired(self.ttl, now))
            .unwrap_or(false)
    }

    /// Drops every entry. Statistics counters are kept.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.lru.clear();
        self.stats.set_total_entries(0);
    }

    /// Keys from most to least recently used, including not-yet-read expired ones.
    pub fn keys(&self) -> Vec<CacheKey> {
        self.lru.iter().cloned().collect()
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.set_total_entries(self.entries.len());
        stats
    }

    pub(crate) fn stats_mut(&mut self) -> &mut CacheStats {
        &mut self.stats
    }

    pub fn max_size(&self) -> Option<usize> {
        self.max_size
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
