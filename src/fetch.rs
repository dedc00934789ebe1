/// file: src/fetch.rs
/// description: HTTP fetcher with redirect cap, timeout, and typed failures.
/// Fetcher — retrieves a URL body over HTTP, following redirects up to a hop
/// bound. Timeouts fail distinctly from other network errors so callers can
/// switch strategy instead of retrying the same URL.
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use reqwest::{Client, redirect};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Redirect cycles terminate here rather than looping.
const MAX_REDIRECT_HOPS: usize = 10;

#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("unexpected HTTP status {0}")]
    Status(u16),
}

pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    pub fn new(user_agent: &str, timeout: Duration) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );

        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .redirect(redirect::Policy::limited(MAX_REDIRECT_HOPS))
            .default_headers(headers)
            .build()
            .map_err(|e| anyhow::anyhow!("HTTP client build failed: {e}"))?;

        Ok(Self { client })
    }

    /// GET the URL and return its body text. Non-2xx terminal responses fail
    /// with the status code.
    pub async fn get(&self, url: &str) -> Result<String, FetchError> {
        debug!(url, "fetch");
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(FetchError::from_reqwest)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        resp.text().await.map_err(FetchError::from_reqwest)
    }
}

impl FetchError {
    fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Network(e.to_string())
        }
    }
}
