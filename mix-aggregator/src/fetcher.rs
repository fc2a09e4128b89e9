use crate::traits::Fetch;
use crate::types::{FetchConfig, MixError, Result};
use async_trait::async_trait;
use backoff::{backoff::Backoff, ExponentialBackoff};
use bytes::Bytes;
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use url::Url;

/// Fetch primitive shared by every source type.
pub struct Fetcher {
    client: Client,
    config: FetchConfig,
}

impl Fetcher {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .build()?;

        Ok(Self { client, config })
    }

    async fn fetch_http(&self, locator: &str) -> Result<Bytes> {
        let url = Url::parse(locator)?;
        let start_time = Instant::now();
        let mut backoff = ExponentialBackoff {
            current_interval: Duration::from_secs(self.config.retry_delay_seconds),
            initial_interval: Duration::from_secs(self.config.retry_delay_seconds),
            max_interval: Duration::from_secs(self.config.retry_delay_seconds.saturating_mul(32)),
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        };

        let mut attempt = 0;
        loop {
            let err = match self.client.get(url.clone()).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let body = response.bytes().await?;
                        debug!(
                            "Fetched {} ({} bytes in {}ms)",
                            url,
                            body.len(),
                            start_time.elapsed().as_millis()
                        );
                        return Ok(body);
                    }
                    let err = MixError::Status {
                        url: url.to_string(),
                        status: status.as_u16(),
                    };
                    if !status.is_server_error() {
                        return Err(err);
                    }
                    err
                }
                Err(e) => MixError::Http(e),
            };

            if attempt >= self.config.max_retries {
                return Err(err);
            }
            attempt += 1;
            match backoff.next_backoff() {
                Some(delay) => {
                    warn!("Attempt {} failed for {}: {}, retrying in {:?}", attempt, url, err, delay);
                    tokio::time::sleep(delay).await;
                }
                None => return Err(err),
            }
        }
    }
}

#[async_trait]
impl Fetch for Fetcher {
    async fn fetch(&self, locator: &str) -> Result<Bytes> {
        if let Some(path) = locator.strip_prefix("file://") {
            let data = tokio::fs::read(path).await?;
            return Ok(Bytes::from(data));
        }
        if locator.starts_with("http://") || locator.starts_with("https://") {
            return self.fetch_http(locator).await;
        }
        Err(MixError::UnsupportedLocator(locator.to_string()))
    }
}
