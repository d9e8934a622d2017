use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use super::traits::{AssetFetcher, FetchedAsset};

const DEFAULT_MAX_RETRIES: u32 = 3;

/// HTTP fetcher with bounded retry and linear backoff.
pub struct HttpFetcher {
    client: Client,
    max_retries: u32,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            client: Client::new(),
            max_retries,
        }
    }

    async fn try_fetch(&self, url: &str) -> Result<FetchedAsset> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("failed to fetch {}: {}", url, status));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();

        let body = response.bytes().await?;
        debug!("fetched {} ({} bytes)", url, body.len());
        Ok(FetchedAsset { content_type, body })
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AssetFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedAsset> {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            match self.try_fetch(url).await {
                Ok(asset) => return Ok(asset),
                Err(e) => {
                    if attempt < self.max_retries {
                        warn!("fetch {} failed (attempt {}): {}", url, attempt, e);
                        tokio::time::sleep(Duration::from_millis(500 * (attempt as u64 + 1)))
                            .await;
                    } else {
                        warn!(
                            "fetch {} failed after {} retries: {}",
                            url, self.max_retries, e
                        );
                    }
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("fetch failed: {}", url)))
    }
}
