//! memo_lru - Single-flight async memoization
//!
//! Wraps async producers with a per-instance cache that deduplicates
//! concurrent calls, evicts by recency and expires entries by age. Ships with
//! a small HTTP service that memoizes an upstream user lookup.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod upstream;

pub use api::AppState;
pub use cache::{CallArgs, CallOptions, Memoizer, Produced};
pub use config::{CacheConfig, Config};
pub use error::{CacheError, MemoError};
