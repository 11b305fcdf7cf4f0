use crate::config::Config;
use crate::crawler::models::{HistoryPage, HistoryResponse};
use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde_json::Value;
use std::num::NonZeroU32;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected HTTP status {0}")]
    Status(u16),

    #[error("Malformed response body: {0}")]
    Decode(reqwest::Error),

    #[error("API error: {0}")]
    Api(String),

    #[error("Unexpected result payload: {0}")]
    UnexpectedResult(String),
}

impl FetchError {
    /// Whether another attempt at the same URL could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Http(_) | FetchError::Api(_) => true,
            FetchError::Status(code) => *code == 429 || *code >= 500,
            FetchError::Decode(_) | FetchError::UnexpectedResult(_) => false,
        }
    }
}

impl HistoryResponse {
    pub fn into_page(self) -> Result<HistoryPage, FetchError> {
        match self.result {
            Value::Null => Ok(HistoryPage { records: None }),
            Value::Array(records) => Ok(HistoryPage {
                records: Some(records),
            }),
            // Explorers report errors such as rate limiting as a string result
            Value::String(message) => Err(FetchError::Api(match self.message {
                Some(status) => format!("{}: {}", status, message),
                None => message,
            })),
            other => Err(FetchError::UnexpectedResult(other.to_string())),
        }
    }
}

/// Source of transaction-history pages.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, url: &str) -> Result<HistoryPage, FetchError>;
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            min_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

/// Explorer HTTP client with bounded retries and an optional request quota.
pub struct HistoryClient {
    http: reqwest::Client,
    retry: RetryPolicy,
    limiter: Option<DefaultDirectRateLimiter>,
}

impl HistoryClient {
    pub fn new(config: &Config) -> Result<Self, FetchError> {
        let timeout = Duration::from_secs(config.http_timeout_secs);

        info!(
            "Initializing history client: timeout {:?}, retries {}, rate limit {:?}/s",
            timeout, config.fetch_max_retries, config.api_rate_limit
        );

        let http = reqwest::Client::builder().timeout(timeout).build()?;
        let limiter = config
            .api_rate_limit
            .and_then(NonZeroU32::new)
            .map(|per_second| RateLimiter::direct(Quota::per_second(per_second)));

        Ok(Self {
            http,
            retry: RetryPolicy {
                max_retries: config.fetch_max_retries,
                ..RetryPolicy::default()
            },
            limiter,
        })
    }

    async fn fetch_once(&self, url: &str) -> Result<HistoryPage, FetchError> {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }

        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body: HistoryResponse = response.json().await.map_err(FetchError::Decode)?;
        if let Some(status) = &body.status {
            debug!("{} answered status {}", url, status);
        }
        body.into_page()
    }
}

#[async_trait]
impl PageSource for HistoryClient {
    async fn fetch_page(&self, url: &str) -> Result<HistoryPage, FetchError> {
        let backoff = ExponentialBuilder::default()
            .with_min_delay(self.retry.min_delay)
            .with_max_delay(self.retry.max_delay)
            .with_max_times(self.retry.max_retries);

        (|| self.fetch_once(url))
            .retry(backoff)
            .when(FetchError::is_transient)
            .notify(|err: &FetchError, delay: Duration| {
                warn!("Fetching {} failed: {}; retrying in {:?}", url, err, delay);
            })
            .await
    }
}
