use crate::config::ApiConfig;
use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tokio_retry::RetryIf;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::{debug, warn};
use url::Url;

#[derive(Debug, Error)]
pub enum FetchError {
    /// HTTP 429. Ends the whole ingestion run.
    #[error("API rate limit reached ({url})")]
    RateLimited { url: String },

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("request to {url} failed")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("response from {url} is not valid JSON")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("invalid endpoint URL")]
    InvalidUrl(#[from] url::ParseError),
}

impl FetchError {
    /// Only network-level failures are retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transport { .. })
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, FetchError::RateLimited { .. })
    }
}

pub struct HttpClient {
    inner: reqwest::Client,
    config: ApiConfig,
}

impl HttpClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            inner,
            config: config.clone(),
        })
    }

    /// GET `url` and decode the body as JSON.
    ///
    /// Transport errors are retried with exponential backoff up to
    /// `max_retries` times. Non-success statuses are returned as-is; a 429
    /// becomes [`FetchError::RateLimited`] and is never retried.
    pub async fn get_json(&self, url: &Url) -> Result<Value, FetchError> {
        self.polite_delay().await;

        let strategy = ExponentialBackoff::from_millis(2)
            .factor(self.config.request_delay_ms.max(1))
            .max_delay(Duration::from_secs(30))
            .map(jitter)
            .take(self.config.max_retries as usize);

        RetryIf::start(
            strategy,
            || self.attempt(url),
            |e: &FetchError| {
                let retry = e.is_transient();
                if retry {
                    warn!("{}, retrying", e);
                }
                retry
            },
        )
        .await
    }

    async fn attempt(&self, url: &Url) -> Result<Value, FetchError> {
        let shown = redact(url);
        debug!("GET {}", shown);

        let resp = self
            .inner
            .get(url.clone())
            .send()
            .await
            .map_err(|source| FetchError::Transport {
                url: shown.clone(),
                source: source.without_url(),
            })?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::RateLimited { url: shown });
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: shown,
            });
        }

        resp.json::<Value>()
            .await
            .map_err(|source| FetchError::Decode {
                url: shown,
                source: source.without_url(),
            })
    }

    async fn polite_delay(&self) {
        if self.config.request_delay_ms > 0 {
            sleep(Duration::from_millis(self.config.request_delay_ms)).await;
        }
    }
}

/// The URL with the `apikey` query value masked, for logs and errors.
pub fn redact(url: &Url) -> String {
    if url.query().is_none() {
        return url.to_string();
    }
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let v = if k == "apikey" { "***".to_string() } else { v.into_owned() };
            (k.into_owned(), v)
        })
        .collect();

    let mut shown = url.clone();
    shown.query_pairs_mut().clear().extend_pairs(pairs);
    shown.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_masks_api_key() {
        let url = Url::parse("https://example.com/api/v3/profile/AAPL?apikey=secret&period=annual")
            .unwrap();
        let shown = redact(&url);
        assert!(!shown.contains("secret"));
        assert!(shown.contains("apikey=***") || shown.contains("apikey=%2A%2A%2A"));
        assert!(shown.contains("period=annual"));
    }

    #[test]
    fn test_redact_without_query() {
        let url = Url::parse("https://example.com/api/v3/stock/list").unwrap();
        assert_eq!(redact(&url), "https://example.com/api/v3/stock/list");
    }

    #[test]
    fn test_transport_error_chain_hides_api_key() {
        let config = ApiConfig {
            request_delay_ms: 0,
            max_retries: 0,
            ..ApiConfig::default()
        };
        let client = HttpClient::new(&config).unwrap();
        // reqwest rejects the scheme before opening a socket
        let url = Url::parse("ftp://example.invalid/api/v3/profile/IBM?apikey=SECRETKEY").unwrap();

        let err = tokio_test::block_on(client.get_json(&url)).unwrap_err();
        assert!(err.is_transient());
        let chain = format!("{:#}", anyhow::Error::new(err));
        assert!(!chain.contains("SECRETKEY"), "key leaked: {}", chain);
        assert!(chain.contains("profile/IBM"));
    }

    #[test]
    fn test_only_transport_errors_are_transient() {
        let limited = FetchError::RateLimited { url: "u".into() };
        assert!(!limited.is_transient());
        assert!(limited.is_rate_limited());

        let status = FetchError::Status { status: 500, url: "u".into() };
        assert!(!status.is_transient());
        assert!(!status.is_rate_limited());
    }
}
