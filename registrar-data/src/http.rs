//! Blocking HTTP access for the synchronous registration pipeline.
//!
//! Normalization and upserts are synchronous, so the HTTP collaborators
//! bridge `reqwest`'s async client onto an owned Tokio runtime.
//!
//! # Runtime behaviour
//!
//! Outside any Tokio runtime the owned `current_thread` runtime drives each
//! request. Inside a multi-threaded runtime the caller's handle is used with
//! [`tokio::task::block_in_place`]. Inside a `current_thread` runtime the
//! owned runtime is used as a fallback, which blocks the caller's executor
//! for the duration of the request.

use std::{future::Future, time::Duration};

use log::debug;
use reqwest::{Client, header::CONTENT_TYPE};
use thiserror::Error;
use tokio::runtime::{Handle, Runtime, RuntimeFlavor};

use crate::source::TransferError;

/// Default user agent for outgoing requests.
pub const DEFAULT_USER_AGENT: &str = "eo-registrar/0.1";

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Errors raised while building an HTTP collaborator.
#[derive(Debug, Error)]
pub enum HttpBuildError {
    /// Failed to build the HTTP client.
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
    /// Failed to build the Tokio runtime.
    #[error("failed to build Tokio runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

/// Configuration shared by the HTTP source and fetcher.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Connect and request timeout.
    pub timeout: Duration,
    /// User agent string for requests.
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
        }
    }
}

impl HttpConfig {
    /// Set the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the user agent string.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// `reqwest` client paired with the runtime that drives it.
pub struct BlockingHttp {
    client: Client,
    config: HttpConfig,
    runtime: Runtime,
}

impl std::fmt::Debug for BlockingHttp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockingHttp")
            .field("config", &self.config)
            .field("runtime", &"<tokio::runtime::Runtime>")
            .finish_non_exhaustive()
    }
}

impl BlockingHttp {
    /// Build a client and its runtime from `config`.
    pub fn new(config: HttpConfig) -> Result<Self, HttpBuildError> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .connect_timeout(config.timeout)
            .timeout(config.timeout)
            .build()
            .map_err(HttpBuildError::HttpClient)?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(HttpBuildError::Runtime)?;
        Ok(Self {
            client,
            config,
            runtime,
        })
    }

    /// The underlying async client.
    pub const fn client(&self) -> &Client {
        &self.client
    }

    /// Drive `future` to completion from synchronous code.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| handle.block_on(future))
            }
            _ => self.runtime.block_on(future),
        }
    }

    /// Send a GET request and fail on non-success statuses.
    pub async fn get(&self, url: &str) -> Result<reqwest::Response, TransferError> {
        debug!("GET {url}");
        self.client
            .get(url)
            .send()
            .await
            .map_err(|err| convert_reqwest_error(err, url))?
            .error_for_status()
            .map_err(|err| convert_reqwest_error(err, url))
    }
}

/// Map a `reqwest` failure onto the transfer error taxonomy.
pub(crate) fn convert_reqwest_error(error: reqwest::Error, url: &str) -> TransferError {
    if error.is_timeout() {
        return TransferError::Timeout {
            url: url.to_owned(),
        };
    }
    if let Some(status) = error.status() {
        return TransferError::Http {
            url: url.to_owned(),
            status: status.as_u16(),
        };
    }
    TransferError::Network {
        url: url.to_owned(),
        source: error,
    }
}

/// Response body fetched by [`HttpFetch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    /// Final URL requested.
    pub url: String,
    /// Declared `Content-Type`, if any.
    pub content_type: Option<String>,
    /// Response body decoded as text.
    pub body: String,
}

/// Fetches small documents such as landing pages and capabilities.
pub trait HttpFetch: Send + Sync {
    /// GET `url`, failing on transport errors and non-success statuses.
    fn get(&self, url: &str) -> Result<Fetched, TransferError>;
}

/// [`HttpFetch`] backed by [`BlockingHttp`].
#[derive(Debug)]
pub struct ReqwestFetcher {
    http: BlockingHttp,
}

impl ReqwestFetcher {
    /// Create a fetcher with default configuration.
    pub fn new() -> Result<Self, HttpBuildError> {
        Self::with_config(HttpConfig::default())
    }

    /// Create a fetcher with explicit configuration.
    pub fn with_config(config: HttpConfig) -> Result<Self, HttpBuildError> {
        Ok(Self {
            http: BlockingHttp::new(config)?,
        })
    }

    async fn fetch(&self, url: &str) -> Result<Fetched, TransferError> {
        let response = self.http.get(url).await?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let body = response
            .text()
            .await
            .map_err(|err| convert_reqwest_error(err, url))?;
        Ok(Fetched {
            url: url.to_owned(),
            content_type,
            body,
        })
    }
}

impl HttpFetch for ReqwestFetcher {
    fn get(&self, url: &str) -> Result<Fetched, TransferError> {
        self.http.block_on(self.fetch(url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn config_builder_pattern() {
        let config = HttpConfig::default()
            .with_timeout(Duration::from_secs(5))
            .with_user_agent("test-agent/1.0");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.user_agent, "test-agent/1.0");
    }

    #[rstest]
    fn unreachable_host_is_a_transfer_error() {
        let fetcher = ReqwestFetcher::with_config(
            HttpConfig::default().with_timeout(Duration::from_millis(200)),
        )
        .expect("fetcher should build");
        let err = fetcher
            .get("http://127.0.0.1:9/landing")
            .expect_err("nothing listens on the discard port");
        assert!(
            matches!(
                err,
                TransferError::Network { .. } | TransferError::Timeout { .. }
            ),
            "unexpected error {err:?}"
        );
    }

    #[rstest]
    fn blocks_outside_any_runtime() {
        let http = BlockingHttp::new(HttpConfig::default()).expect("http should build");
        assert_eq!(http.block_on(async { 7 }), 7);
    }
}
