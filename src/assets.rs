// Engine asset resolution — turns the two pinned remote binaries into local
// file handles, through a persistent URL cache and an in-memory tier.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::cache::UrlCache;
use crate::config::{ENGINE_COMPUTE_URL, ENGINE_RUNTIME_URL};
use crate::error::CompressError;
use crate::fetch::AssetFetcher;

/// Locally materialized copy of a remote engine asset.
///
/// Stands in for the source URL; the scratch file lives until
/// [`AssetResolver::release_assets`] deletes it or the process exits.
#[derive(Debug)]
pub struct AssetRef {
    pub source_url: String,
    pub local_path: PathBuf,
}

/// Both engine assets, resolved for one load attempt.
#[derive(Debug)]
pub struct ResolvedAssets {
    pub runtime: Arc<AssetRef>,
    pub compute: Arc<AssetRef>,
}

struct AssetSlot {
    url: String,
    /// In-memory tier: set once per session, cleared by `release_assets`.
    resolved: RwLock<Option<Arc<AssetRef>>>,
    /// Serializes materialization so concurrent callers share one fetch.
    init_lock: Mutex<()>,
}

impl AssetSlot {
    fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            resolved: RwLock::new(None),
            init_lock: Mutex::new(()),
        }
    }
}

/// Resolves the pinned engine assets to local files.
///
/// Tier order per asset: in-memory reference, then the persistent URL cache,
/// then the network (written through to the persistent cache).
pub struct AssetResolver {
    cache: Arc<UrlCache>,
    fetcher: Arc<dyn AssetFetcher>,
    scratch_dir: PathBuf,
    runtime: AssetSlot,
    compute: AssetSlot,
}

impl AssetResolver {
    /// Resolver over the pinned production asset URLs.
    pub fn new(
        cache: Arc<UrlCache>,
        fetcher: Arc<dyn AssetFetcher>,
        scratch_dir: impl Into<PathBuf>,
    ) -> Self {
        Self::with_urls(
            cache,
            fetcher,
            scratch_dir,
            ENGINE_RUNTIME_URL,
            ENGINE_COMPUTE_URL,
        )
    }

    /// Resolver over explicit asset URLs (alternate hosts, tests).
    pub fn with_urls(
        cache: Arc<UrlCache>,
        fetcher: Arc<dyn AssetFetcher>,
        scratch_dir: impl Into<PathBuf>,
        runtime_url: impl Into<String>,
        compute_url: impl Into<String>,
    ) -> Self {
        Self {
            cache,
            fetcher,
            scratch_dir: scratch_dir.into(),
            runtime: AssetSlot::new(runtime_url),
            compute: AssetSlot::new(compute_url),
        }
    }

    /// Resolve both assets, concurrently and independently. A failure on
    /// either aborts the load attempt; the other asset may still have been
    /// cached in memory and is reused next time.
    pub async fn resolve_assets(&self) -> Result<ResolvedAssets, CompressError> {
        let (runtime, compute) = tokio::join!(
            self.resolve_slot(&self.runtime),
            self.resolve_slot(&self.compute),
        );
        Ok(ResolvedAssets {
            runtime: runtime?,
            compute: compute?,
        })
    }

    async fn resolve_slot(&self, slot: &AssetSlot) -> Result<Arc<AssetRef>, CompressError> {
        if let Some(existing) = slot.resolved.read().clone() {
            return Ok(existing);
        }

        let _guard = slot.init_lock.lock().await;

        // Another caller may have finished while we waited for the lock.
        if let Some(existing) = slot.resolved.read().clone() {
            return Ok(existing);
        }

        let asset = self
            .materialize(slot)
            .await
            .map_err(|source| CompressError::AssetResolution {
                url: slot.url.clone(),
                source,
            })?;

        let asset = Arc::new(asset);
        *slot.resolved.write() = Some(asset.clone());
        Ok(asset)
    }

    /// Cache-first fetch, then write the body to a scratch file the engine
    /// can load from.
    async fn materialize(&self, slot: &AssetSlot) -> Result<AssetRef> {
        let body = match self.cache.match_url(&slot.url)? {
            Some(hit) => {
                debug!("asset cache hit for {}", slot.url);
                hit.body
            }
            None => {
                debug!("asset cache miss for {}, fetching", slot.url);
                let fetched = self.fetcher.fetch(&slot.url).await?;
                self.cache
                    .put(&slot.url, &fetched.content_type, &fetched.body)?;
                fetched.body
            }
        };

        tokio::fs::create_dir_all(&self.scratch_dir)
            .await
            .with_context(|| {
                format!("failed to create scratch dir {}", self.scratch_dir.display())
            })?;

        let local_path = self.scratch_dir.join(file_name_for_url(&slot.url));
        tokio::fs::write(&local_path, &body)
            .await
            .with_context(|| format!("failed to materialize {}", local_path.display()))?;

        info!(
            "materialized {} ({} bytes) at {}",
            slot.url,
            body.len(),
            local_path.display()
        );

        Ok(AssetRef {
            source_url: slot.url.clone(),
            local_path,
        })
    }

    /// Delete materialized files and clear the in-memory tier. The
    /// persistent cache keeps its entries; generation eviction owns those.
    pub fn release_assets(&self) {
        for slot in [&self.runtime, &self.compute] {
            if let Some(asset) = slot.resolved.write().take() {
                if let Err(e) = std::fs::remove_file(&asset.local_path) {
                    debug!(
                        "failed to remove materialized asset {}: {}",
                        asset.local_path.display(),
                        e
                    );
                }
            }
        }
    }
}

/// Last path segment of the URL, or a fixed fallback for URLs without one.
fn file_name_for_url(url: &str) -> String {
    url.rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("asset.bin")
        .split(['?', '#'])
        .next()
        .unwrap_or("asset.bin")
        .to_string()
}
