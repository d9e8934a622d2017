use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;

/// A fetched asset body plus the metadata the cache keeps.
#[derive(Debug, Clone)]
pub struct FetchedAsset {
    pub content_type: String,
    pub body: Bytes,
}

#[async_trait]
pub trait AssetFetcher: Send + Sync {
    /// Fetch the full body at `url`. Non-success statuses are errors.
    async fn fetch(&self, url: &str) -> Result<FetchedAsset>;
}
