//! Cache Module
//!
//! Single-flight async memoization with TTL expiration and LRU eviction.

mod clock;
mod entry;
mod inflight;
mod key;
mod lru;
mod memoizer;
mod stats;
mod store;


// Re-export public types
pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::CacheEntry;
pub use inflight::{Flight, InFlightRegistry, PendingHandle, Publisher};
pub use key::{CacheKey, CallArgs, CallOptions, IGNORE_CACHE, UPDATE_CACHE};
pub use lru::LruTracker;
pub use memoizer::{Memoizer, Produced};
pub use stats::CacheStats;
pub use store::CacheStore;
