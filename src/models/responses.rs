//! Response DTOs for the user lookup API
//!
//! Defines the structure of outgoing HTTP response bodies.

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::cache::CacheStats;

/// Envelope returned by the lookup and refresh endpoints.
///
/// Failures are reported in-band: `data` is null and `message` carries the
/// error text.
#[derive(Debug, Clone, Serialize)]
pub struct LookupResponse {
    /// Payload, null on failure
    pub data: Value,
    /// "200 OK" or "Error <reason>"
    pub message: String,
    /// Handler wall time in milliseconds
    pub time_ms: f64,
}

impl LookupResponse {
    /// Creates a successful envelope
    pub fn ok(data: Value, elapsed: Duration) -> Self {
        Self {
            data,
            message: "200 OK".to_string(),
            time_ms: elapsed.as_secs_f64() * 1000.0,
        }
    }

    /// Creates a failed envelope
    pub fn error(reason: impl std::fmt::Display, elapsed: Duration) -> Self {
        Self {
            data: Value::Null,
            message: format!("Error {}", reason),
            time_ms: elapsed.as_secs_f64() * 1000.0,
        }
    }
}

/// Outcome of a bulk refresh (POST /user_refresh)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshSummary {
    /// Users re-fetched and written to the cache
    pub refreshed: usize,
    /// Users upstream no longer knows, dropped from the cache
    pub missing: Vec<String>,
    /// Users whose refresh failed
    pub failed: Vec<String>,
}

/// Response body for DELETE /user/:user_id
#[derive(Debug, Clone, Serialize)]
pub struct InvalidateResponse {
    /// Success message
    pub message: String,
    /// The user whose cached profile was targeted
    pub user_id: String,
    /// Whether a cached profile existed
    pub removed: bool,
}

impl InvalidateResponse {
    pub fn new(user_id: impl Into<String>, removed: bool) -> Self {
        let user_id = user_id.into();
        let message = if removed {
            format!("Cached profile for '{}' removed", user_id)
        } else {
            format!("No cached profile for '{}'", user_id)
        };
        Self {
            message,
            user_id,
            removed,
        }
    }
}

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    /// Number of cache hits
    pub hits: u64,
    /// Number of cache misses
    pub misses: u64,
    /// Number of evictions
    pub evictions: u64,
    /// Number of entries dropped because their TTL elapsed
    pub expirations: u64,
    /// Number of calls that awaited an in-flight lookup
    pub joins: u64,
    /// Number of upstream fetches
    pub producer_calls: u64,
    /// Current number of entries in cache
    pub total_entries: usize,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
}

impl From<&CacheStats> for StatsResponse {
    fn from(stats: &CacheStats) -> Self {
        Self {
            hits: stats.hits,
            misses: stats.misses,
            evictions: stats.evictions,
            expirations: stats.expirations,
            joins: stats.joins,
            producer_calls: stats.producer_calls,
            total_entries: stats.total_entries,
            hit_rate: stats.hit_rate(),
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lookup_response_ok() {
        let resp = LookupResponse::ok(json!({"login": "octocat"}), Duration::from_millis(12));
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["message"], "200 OK");
        assert_eq!(json["data"]["login"], "octocat");
        assert!((resp.time_ms - 12.0).abs() < 0.001);
    }

    #[test]
    fn test_lookup_response_error() {
        let resp = LookupResponse::error("upstream down", Duration::ZERO);
        assert!(resp.data.is_null());
        assert_eq!(resp.message, "Error upstream down");
    }

    #[test]
    fn test_invalidate_response_messages() {
        assert!(InvalidateResponse::new("a", true).message.contains("removed"));
        assert!(InvalidateResponse::new("a", false).message.contains("No cached"));
    }

    #[test]
    fn test_stats_response_from_stats() {
        let mut stats = CacheStats::new();
        stats.record_hit();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();
        stats.record_join();
        stats.set_total_entries(3);

        let resp = StatsResponse::from(&stats);
        assert!((resp.hit_rate - 0.75).abs() < 0.001);
        assert_eq!(resp.joins, 1);
        assert_eq!(resp.total_entries, 3);
    }

    #[test]
    fn test_health_response_serialize() {
        let resp = HealthResponse::healthy();
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("healthy"));
        assert!(json.contains("timestamp"));
    }
}
