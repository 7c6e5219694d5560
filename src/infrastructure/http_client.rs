//! Document fetching
//!
//! [`DocumentFetcher`] is the seam the crawler fetches through: URL in,
//! status + body out. [`HttpClient`] is the reqwest implementation. Retrying
//! is not done here; `DelayPlanner` decides that from the returned status.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue, RETRY_AFTER};
use reqwest::{Client, ClientBuilder};
use thiserror::Error;
use tracing::{debug, info};

use crate::infrastructure::config::CrawlerConfig;

/// Transport-level failure; HTTP error statuses are not errors here
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Request timed out: {url}")]
    Timeout { url: String },

    #[error("Network error for {url}: {reason}")]
    Network { url: String, reason: String },

    #[error("Invalid URL: {url}")]
    InvalidUrl { url: String },
}

impl FetchError {
    /// Timeouts and connection failures are worth another attempt
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Network { .. })
    }
}

/// A fetched document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedDocument {
    pub status: u16,
    pub body: String,
    /// URL after redirects
    pub final_url: String,
    /// Parsed `Retry-After` header (delta-seconds form only)
    pub retry_after: Option<Duration>,
}

impl FetchedDocument {
    pub fn ok(url: &str, body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            final_url: url.to_string(),
            retry_after: None,
        }
    }

    pub fn with_status(url: &str, status: u16) -> Self {
        Self {
            status,
            body: String::new(),
            final_url: url.to_string(),
            retry_after: None,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Capability to fetch a URL
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedDocument, FetchError>;
}

/// Configuration for HTTP client behavior
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: String,
    pub accept_language: String,
    pub follow_redirects: bool,
}

impl HttpClientConfig {
    pub fn from_crawler_config(config: &CrawlerConfig) -> Self {
        Self {
            timeout: config.request_timeout(),
            user_agent: config.user_agent.clone(),
            accept_language: config.accept_language.clone(),
            follow_redirects: config.follow_redirects,
        }
    }
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self::from_crawler_config(&CrawlerConfig::default())
    }
}

/// reqwest-backed fetcher carrying one fixed crawler identity
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    config: HttpClientConfig,
}

impl HttpClient {
    pub fn with_config(config: HttpClientConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_str(&config.accept_language)
                .context("Invalid Accept-Language header value")?,
        );
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,text/plain;q=0.9,*/*;q=0.8"),
        );

        let client = ClientBuilder::new()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .default_headers(headers)
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .redirect(if config.follow_redirects {
                reqwest::redirect::Policy::limited(10)
            } else {
                reqwest::redirect::Policy::none()
            })
            .build()
            .context("Failed to build HTTP client")?;

        info!(
            user_agent = %config.user_agent,
            timeout_secs = config.timeout.as_secs(),
            "🔧 HttpClient ready"
        );
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }
}

#[async_trait]
impl DocumentFetcher for HttpClient {
    async fn fetch(&self, url: &str) -> Result<FetchedDocument, FetchError> {
        let parsed = url::Url::parse(url).map_err(|_| FetchError::InvalidUrl {
            url: url.to_string(),
        })?;

        debug!(url, "🌐 HTTP GET");
        let response = self.client.get(parsed).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout {
                    url: url.to_string(),
                }
            } else {
                FetchError::Network {
                    url: url.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_retry_after);

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout {
                    url: url.to_string(),
                }
            } else {
                FetchError::Network {
                    url: url.to_string(),
                    reason: format!("failed to read body: {e}"),
                }
            }
        })?;

        Ok(FetchedDocument {
            status,
            body,
            final_url,
            retry_after,
        })
    }
}

/// `Retry-After: 120` -> 120s; HTTP-date values are ignored
fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_builds_from_default_config() {
        let client = HttpClient::with_config(HttpClientConfig::default());
        assert!(client.is_ok());
        assert_eq!(client.unwrap().config().timeout, Duration::from_secs(30));
    }

    #[test]
    fn invalid_accept_language_is_rejected() {
        let config = HttpClientConfig {
            accept_language: "en\nUS".to_string(),
            ..HttpClientConfig::default()
        };
        assert!(HttpClient::with_config(config).is_err());
    }

    #[test]
    fn retry_after_delta_seconds() {
        assert_eq!(parse_retry_after(" 30 "), Some(Duration::from_secs(30)));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }

    #[tokio::test]
    async fn relative_url_is_rejected_without_network() {
        let client = HttpClient::with_config(HttpClientConfig::default()).unwrap();
        let err = client.fetch("/shop/page/2/").await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl { .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn status_helpers() {
        assert!(FetchedDocument::ok("https://a.test", "<html></html>").is_success());
        assert!(!FetchedDocument::with_status("https://a.test", 503).is_success());
    }
}
