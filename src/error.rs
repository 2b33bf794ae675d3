//! Error types for the memoizing cache
//!
//! Provides unified error handling using thiserror.

use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Cache Error Enum ==
/// Errors raised before any cache or registry interaction takes place.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Cache constructed with unusable limits
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Call arguments cannot be turned into a cache key
    #[error("Invalid cache key: {0}")]
    InvalidKey(String),
}

// == Memo Error Enum ==
/// Error returned from a memoized call.
///
/// Producer failures are wrapped in an `Arc` so that every caller joined on
/// the same computation receives the identical error.
#[derive(Error, Debug)]
pub enum MemoError<E> {
    /// Key construction or argument parsing failed
    #[error(transparent)]
    Key(#[from] CacheError),

    /// The wrapped producer failed
    #[error("Producer failed: {0}")]
    Producer(Arc<E>),

    /// The computation this call joined was dropped before it settled
    #[error("Pending computation was cancelled")]
    Cancelled,
}

impl<E> MemoError<E> {
    /// Returns the producer error, if this is a producer failure.
    pub fn producer_error(&self) -> Option<&E> {
        match self {
            MemoError::Producer(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl<E> Clone for MemoError<E> {
    fn clone(&self) -> Self {
        match self {
            MemoError::Key(err) => MemoError::Key(err.clone()),
            MemoError::Producer(err) => MemoError::Producer(Arc::clone(err)),
            MemoError::Cancelled => MemoError::Cancelled,
        }
    }
}

// == API Error Enum ==
/// Error type for the HTTP layer.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Lookup failed upstream or in the cache
    #[error("Internal error: {0}")]
    Internal(String),
}

impl<E: std::fmt::Display> From<MemoError<E>> for ApiError {
    fn from(err: MemoError<E>) -> Self {
        match err {
            MemoError::Key(err) => ApiError::InvalidRequest(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<CacheError> for ApiError {
    fn from(err: CacheError) -> Self {
        ApiError::InvalidRequest(err.to_string())
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for cache construction and key building.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_producer_error_is_shared_on_clone() {
        let err: MemoError<String> = MemoError::Producer(Arc::new("boom".to_string()));
        let cloned = err.clone();

        match (&err, &cloned) {
            (MemoError::Producer(a), MemoError::Producer(b)) => assert!(Arc::ptr_eq(a, b)),
            _ => panic!("expected producer errors"),
        }
        assert_eq!(cloned.producer_error().map(String::as_str), Some("boom"));
    }

    #[test]
    fn test_memo_error_display() {
        let err: MemoError<String> = CacheError::InvalidKey("bad".to_string()).into();
        assert_eq!(err.to_string(), "Invalid cache key: bad");
        assert_eq!(
            MemoError::<String>::Cancelled.to_string(),
            "Pending computation was cancelled"
        );
    }

    #[test]
    fn test_api_error_status_codes() {
        let key_err: ApiError =
            MemoError::<String>::Key(CacheError::InvalidKey("x".to_string())).into();
        assert_eq!(key_err.into_response().status(), StatusCode::BAD_REQUEST);

        let producer_err: ApiError =
            MemoError::Producer(Arc::new("upstream down".to_string())).into();
        assert_eq!(
            producer_err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
