// src/ingest/fetcher.rs
use async_trait::async_trait;
use metrics::counter;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::FetchConfig;
use crate::error::FetchError;
use crate::ingest::types::ContentFetcher;

/// Plain HTTP article fetcher. Fixed (not exponential) delay between attempts.
#[derive(Clone)]
pub struct HttpContentFetcher {
    client: Client,
    retry_delay: Duration,
}

impl HttpContentFetcher {
    pub fn new(cfg: &FetchConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(&cfg.user_agent)
            .gzip(true)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;
        Ok(Self {
            client,
            retry_delay: cfg.retry_delay(),
        })
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Shared client, so the feed source can reuse the same connection pool.
    pub fn client(&self) -> Client {
        self.client.clone()
    }

    async fn fetch_once(&self, url: &str, timeout: Duration) -> Result<String, FetchError> {
        let send = self.client.get(url).timeout(timeout).send();
        let rsp = match tokio::time::timeout(timeout, send).await {
            Ok(r) => r?,
            Err(_) => return Err(FetchError::Timeout(timeout)),
        };

        let status = rsp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = match tokio::time::timeout(timeout, rsp.text()).await {
            Ok(b) => b?,
            Err(_) => return Err(FetchError::Timeout(timeout)),
        };
        Ok(body)
    }
}

#[async_trait]
impl ContentFetcher for HttpContentFetcher {
    async fn fetch(
        &self,
        url: &str,
        timeout: Duration,
        retries: u32,
    ) -> Result<String, FetchError> {
        fetch_with_retries(retries, self.retry_delay, url, |u| self.fetch_once(u, timeout)).await
    }
}

/// Run `attempt` up to `retries + 1` times, sleeping `delay` after each failure.
pub async fn fetch_with_retries<'a, F, Fut>(
    retries: u32,
    delay: Duration,
    url: &'a str,
    mut attempt: F,
) -> Result<String, FetchError>
where
    F: FnMut(&'a str) -> Fut,
    Fut: std::future::Future<Output = Result<String, FetchError>>,
{
    let attempts = retries.saturating_add(1);
    let mut n = 0;

    loop {
        n += 1;
        match attempt(url).await {
            Ok(body) => {
                debug!(url, attempt = n, bytes = body.len(), "fetched");
                return Ok(body);
            }
            Err(e) => {
                warn!(url, attempt = n, error = %e, "fetch attempt failed");
                counter!("fetch_attempt_failures_total").increment(1);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                if n >= attempts {
                    return Err(e);
                }
            }
        }
    }
}
