//! Configuration Module
//!
//! Cache limits and service configuration loaded from environment variables.

use std::env;
use std::time::Duration;

use crate::error::{CacheError, Result};

// == Cache Config ==
/// Construction-time limits for one memoized producer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheConfig {
    /// Maximum number of cached results, None = unbounded
    pub max_size: Option<usize>,
    /// Maximum age of a cached result, None = never expires
    pub ttl: Option<Duration>,
}

impl CacheConfig {
    /// Creates a config with the given limits.
    pub fn new(max_size: Option<usize>, ttl: Option<Duration>) -> Self {
        Self { max_size, ttl }
    }

    /// No size bound and no expiry.
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = Some(max_size);
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    // == Validate ==
    /// Rejects limits that would make the cache unusable.
    pub fn validate(&self) -> Result<()> {
        if self.max_size == Some(0) {
            return Err(CacheError::InvalidConfig(
                "max_size must be a positive integer".to_string(),
            ));
        }
        if self.ttl == Some(Duration::ZERO) {
            return Err(CacheError::InvalidConfig(
                "ttl must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

// == Service Config ==
/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum number of memoized user lookups, None = unbounded
    pub max_size: Option<usize>,
    /// Lifetime of a memoized lookup in milliseconds, None = never expires
    pub ttl_ms: Option<u64>,
    /// HTTP server port
    pub server_port: u16,
    /// Base URL of the upstream user API
    pub upstream_url: String,
    /// Upstream request timeout in seconds
    pub upstream_timeout: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `MAX_SIZE` - Maximum cached lookups (default: unbounded)
    /// - `CACHE_TTL_MS` - Lookup lifetime in milliseconds (default: never expires)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `UPSTREAM_URL` - Upstream API base URL (default: https://api.github.com)
    /// - `UPSTREAM_TIMEOUT_SECS` - Upstream request timeout (default: 10)
    ///
    /// Unparseable values fall back to their defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_size: parse_var("MAX_SIZE").or(defaults.max_size),
            ttl_ms: parse_var("CACHE_TTL_MS").or(defaults.ttl_ms),
            server_port: parse_var("SERVER_PORT").unwrap_or(defaults.server_port),
            upstream_url: env::var("UPSTREAM_URL")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.upstream_url),
            upstream_timeout: parse_var("UPSTREAM_TIMEOUT_SECS")
                .unwrap_or(defaults.upstream_timeout),
        }
    }

    // == Cache Config ==
    /// Validated cache limits for the user lookup memoizer.
    pub fn cache_config(&self) -> Result<CacheConfig> {
        let config = CacheConfig::new(self.max_size, self.ttl_ms.map(Duration::from_millis));
        config.validate()?;
        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_size: None,
            ttl_ms: None,
            server_port: 3000,
            upstream_url: "https://api.github.com".to_string(),
            upstream_timeout: 10,
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
