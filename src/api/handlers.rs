//! API Handlers
//!
//! HTTP request handlers for the memoized user lookup service.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::cache::{CallOptions, Memoizer};
use crate::config::Config;
use crate::error::ApiError;
use crate::models::{
    HealthResponse, InvalidateResponse, LookupResponse, RefreshSummary, StatsResponse,
};
use crate::upstream::{UpstreamClient, UpstreamError};

/// Memoized upstream user lookup keyed by login.
pub type UserLookup = Memoizer<String, Value, UpstreamError>;

/// Application state shared across all handlers.
///
/// The memoizer is cheap to clone; clones share one cache.
#[derive(Clone)]
pub struct AppState {
    /// Memoized user lookup
    pub users: UserLookup,
    /// Logins that resolved to a profile, refreshed by POST /user_refresh
    pub known_users: Arc<RwLock<BTreeSet<String>>>,
}

impl AppState {
    /// Creates a new AppState around the given lookup.
    pub fn new(users: UserLookup) -> Self {
        Self {
            users,
            known_users: Arc::new(RwLock::new(BTreeSet::new())),
        }
    }

    /// Creates a new AppState from configuration.
    ///
    /// Builds the upstream client and wraps it in a memoizer with the
    /// configured limits.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let client = UpstreamClient::from_config(config)?;
        let users = Memoizer::new(config.cache_config()?, move |login: String| {
            let client = client.clone();
            async move { client.fetch_user(login).await }
        })?;
        Ok(Self::new(users))
    }
}

/// Handler for GET /user/:user_id
///
/// Looks up a user through the cache. Accepts `ignore_cache` and
/// `update_cache` query flags. Failures are reported in the envelope with a
/// 500 status.
pub async fn get_user_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(options): Query<CallOptions>,
) -> (StatusCode, Json<LookupResponse>) {
    let start = Instant::now();

    match state.users.call(user_id.clone(), options).await {
        Ok(data) => {
            if !data.is_null() {
                state.known_users.write().await.insert(user_id);
            }
            (StatusCode::OK, Json(LookupResponse::ok(data, start.elapsed())))
        }
        Err(err) => {
            warn!(%user_id, error = %err, "user lookup failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(LookupResponse::error(err, start.elapsed())),
            )
        }
    }
}

/// Handler for POST /user_refresh
///
/// Re-fetches every known user, bypassing and overwriting the cache.
/// Users upstream no longer finds are evicted and forgotten. Individual
/// failures are logged and listed, never fatal.
pub async fn refresh_handler(
    State(state): State<AppState>,
) -> Result<Json<LookupResponse>, ApiError> {
    let start = Instant::now();
    let users: Vec<String> = state.known_users.read().await.iter().cloned().collect();

    let mut summary = RefreshSummary::default();
    for user_id in users {
        match state.users.call(user_id.clone(), CallOptions::refresh()).await {
            Ok(data) if data.is_null() => {
                // A forced write stored the null; drop it so later lookups go upstream.
                state.users.invalidate(&user_id)?;
                state.known_users.write().await.remove(&user_id);
                summary.missing.push(user_id);
            }
            Ok(_) => summary.refreshed += 1,
            Err(err) => {
                warn!(%user_id, error = %err, "refresh failed");
                summary.failed.push(user_id);
            }
        }
    }

    info!(
        refreshed = summary.refreshed,
        missing = summary.missing.len(),
        failed = summary.failed.len(),
        "user refresh complete"
    );
    let data = serde_json::to_value(&summary).unwrap_or(Value::Null);
    Ok(Json(LookupResponse::ok(data, start.elapsed())))
}

/// Handler for DELETE /user/:user_id
///
/// Drops the cached profile so the next lookup goes upstream.
pub async fn invalidate_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<InvalidateResponse>, ApiError> {
    let removed = state.users.invalidate(&user_id)?;
    state.known_users.write().await.remove(&user_id);

    Ok(Json(InvalidateResponse::new(user_id, removed)))
}

/// Handler for GET /stats
///
/// Returns current cache statistics.
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse::from(&state.users.stats()))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Produced;
    use crate::config::CacheConfig;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_state() -> (AppState, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let calls = count.clone();
        let users = Memoizer::new(CacheConfig::unbounded(), move |login: String| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                match login.as_str() {
                    "ghost" => Ok(Produced::Skip(Value::Null)),
                    "broken" => Err(UpstreamError::Status(502)),
                    _ => Ok(Produced::Store(json!({ "login": login }))),
                }
            }
        })
        .unwrap();
        (AppState::new(users), count)
    }

    #[tokio::test]
    async fn test_get_user_caches() {
        let (state, count) = test_state();

        let (status, body) = get_user_handler(
            State(state.clone()),
            Path("octocat".to_string()),
            Query(CallOptions::default()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.data["login"], "octocat");

        let (status, _) = get_user_handler(
            State(state.clone()),
            Path("octocat".to_string()),
            Query(CallOptions::default()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(state.known_users.read().await.contains("octocat"));
    }

    #[tokio::test]
    async fn test_get_user_failure_envelope() {
        let (state, _) = test_state();

        let (status, body) = get_user_handler(
            State(state.clone()),
            Path("broken".to_string()),
            Query(CallOptions::default()),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.data.is_null());
        assert!(body.message.starts_with("Error"));
        assert!(state.known_users.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_user_not_remembered() {
        let (state, count) = test_state();

        for _ in 0..2 {
            let (status, body) = get_user_handler(
                State(state.clone()),
                Path("ghost".to_string()),
                Query(CallOptions::default()),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
            assert!(body.data.is_null());
        }

        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert!(state.known_users.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_refetches_known_users() {
        let (state, count) = test_state();
        state.known_users.write().await.insert("octocat".to_string());
        state.known_users.write().await.insert("broken".to_string());

        let body = refresh_handler(State(state.clone())).await.unwrap();

        assert_eq!(body.data["refreshed"], 1);
        assert_eq!(body.data["failed"], json!(["broken"]));
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert!(state.users.is_cached(&"octocat".to_string()).unwrap());
    }

    #[tokio::test]
    async fn test_refresh_evicts_deleted_user() {
        let count = Arc::new(AtomicUsize::new(0));
        let calls = count.clone();
        let users = Memoizer::new(CacheConfig::unbounded(), move |login: String| {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n == 2 {
                    Ok(Produced::Skip(Value::Null))
                } else {
                    Ok(Produced::Store(json!({ "login": login, "fetch": n })))
                }
            }
        })
        .unwrap();
        let state = AppState::new(users);

        let (_, body) = get_user_handler(
            State(state.clone()),
            Path("octocat".to_string()),
            Query(CallOptions::default()),
        )
        .await;
        assert_eq!(body.data["fetch"], 1);

        let summary = refresh_handler(State(state.clone())).await.unwrap();
        assert_eq!(summary.data["refreshed"], 0);
        assert_eq!(summary.data["missing"], json!(["octocat"]));
        assert!(!state.users.is_cached(&"octocat".to_string()).unwrap());
        assert!(state.known_users.read().await.is_empty());

        let (_, body) = get_user_handler(
            State(state.clone()),
            Path("octocat".to_string()),
            Query(CallOptions::default()),
        )
        .await;
        assert_eq!(body.data["fetch"], 3);
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_invalidate_handler() {
        let (state, count) = test_state();
        let (status, _) = get_user_handler(
            State(state.clone()),
            Path("octocat".to_string()),
            Query(CallOptions::default()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let body = invalidate_handler(State(state.clone()), Path("octocat".to_string()))
            .await
            .unwrap();
        assert!(body.removed);
        assert!(state.known_users.read().await.is_empty());

        let (_, body) = get_user_handler(
            State(state.clone()),
            Path("octocat".to_string()),
            Query(CallOptions::default()),
        )
        .await;
        assert_eq!(body.data["login"], "octocat");
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_stats_handler() {
        let (state, _) = test_state();

        let response = stats_handler(State(state)).await;
        assert_eq!(response.hits, 0);
        assert_eq!(response.misses, 0);
    }

    #[tokio::test]
    async fn test_health_handler() {
        let response = health_handler().await;
        assert_eq!(response.status, "healthy");
    }
}
