//! Upstream Client
//!
//! Fetches user profiles from the upstream REST API. Used as the producer
//! behind the memoized user lookup.

use std::time::Duration;

use reqwest::{StatusCode, Url};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::cache::Produced;
use crate::config::Config;

/// Errors raised while talking to the upstream API.
#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("Upstream request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upstream returned status {0}")]
    Status(u16),

    #[error("Invalid upstream URL: {0}")]
    InvalidUrl(String),
}

// == Upstream Client ==
/// Thin wrapper over a `reqwest::Client` bound to one base URL.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: reqwest::Client,
    base_url: Url,
}

impl UpstreamClient {
    /// Builds a client for `base_url` with the given request timeout.
    pub fn new(base_url: impl AsRef<str>, timeout: Duration) -> Result<Self, UpstreamError> {
        let base_url =
            Url::parse(base_url.as_ref()).map_err(|e| UpstreamError::InvalidUrl(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(UpstreamError::InvalidUrl(format!(
                "{} cannot carry a path",
                base_url
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("memo_lru/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, base_url })
    }

    pub fn from_config(config: &Config) -> Result<Self, UpstreamError> {
        Self::new(
            &config.upstream_url,
            Duration::from_secs(config.upstream_timeout),
        )
    }

    /// URL of the profile for `login`, which is always a single escaped
    /// path segment.
    pub fn user_url(&self, login: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("users").push(login);
        }
        url
    }

    // == Fetch User ==
    /// Fetches the profile for `login`.
    ///
    /// A found profile is cacheable. A missing user yields an uncacheable
    /// `null` so that an account created later is picked up on the next call.
    pub async fn fetch_user(&self, login: String) -> Result<Produced<Value>, UpstreamError> {
        let url = self.user_url(&login);
        debug!(%url, "fetching user from upstream");

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(Produced::Skip(Value::Null));
        }
        if !status.is_success() {
            return Err(UpstreamError::Status(status.as_u16()));
        }

        let body = response.json::<Value>().await?;
        Ok(Produced::Store(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_url_trims_trailing_slash() {
        let client = UpstreamClient::new("http://localhost:9999/", Duration::from_secs(1)).unwrap();
        assert_eq!(
            client.user_url("octocat").as_str(),
            "http://localhost:9999/users/octocat"
        );
    }

    #[test]
    fn test_from_config() {
        let config = Config::default();
        let client = UpstreamClient::from_config(&config).unwrap();
        assert_eq!(client.user_url("a").as_str(), "https://api.github.com/users/a");
    }

    #[test]
    fn test_user_url_escapes_login() {
        let client = UpstreamClient::new("http://localhost:9999/api", Duration::from_secs(1)).unwrap();

        let url = client.user_url("../rate_limit");
        assert_eq!(url.path(), "/api/users/..%2Frate_limit");
        assert_eq!(url.path_segments().map(|s| s.count()), Some(3));

        let url = client.user_url("a?b#c");
        assert_eq!(url.as_str(), "http://localhost:9999/api/users/a%3Fb%23c");
        assert!(url.query().is_none());
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let result = UpstreamClient::new("not a url", Duration::from_secs(1));
        assert!(matches!(result, Err(UpstreamError::InvalidUrl(_))));

        let result = UpstreamClient::new("mailto:someone@example.com", Duration::from_secs(1));
        assert!(matches!(result, Err(UpstreamError::InvalidUrl(_))));
    }

    #[test]
    fn test_status_error_display() {
        assert_eq!(
            UpstreamError::Status(502).to_string(),
            "Upstream returned status 502"
        );
    }
}
