// Public engine surface — composition root and tracing bootstrap.

use std::sync::Arc;
use std::sync::Once;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::assets::AssetResolver;
use crate::cache::CacheStorage;
use crate::compress::{estimated_compression_secs, CompressionResult, Compressor, MediaFile};
use crate::config::{CompressorConfig, ASSET_CACHE_NAME};
use crate::engine::{EngineFactory, EngineLifecycle};
use crate::fetch::{AssetFetcher, HttpFetcher};
use crate::progress::ProgressSink;
use crate::settings::{CompressionSettings, SettingsPatch, SettingsStore};

static INIT_TRACING: Once = Once::new();

/// Install the global tracing subscriber once; later calls are no-ops.
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,hyper=warn,reqwest=warn"));

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init();

        info!("compression engine tracing initialized");
    });
}

/// Everything an embedder needs to compress videos: the single settings
/// instance, the shared engine lifecycle, and the orchestrator, wired over
/// one cache root. Replaces module-global singletons with an explicit
/// context object owned by the embedder.
pub struct CompressorService {
    settings: Arc<SettingsStore>,
    lifecycle: Arc<EngineLifecycle>,
    compressor: Compressor,
}

impl CompressorService {
    /// Wire the service with a custom engine factory and asset fetcher.
    pub fn new(
        config: CompressorConfig,
        factory: EngineFactory,
        fetcher: Arc<dyn AssetFetcher>,
    ) -> Result<Self> {
        let storage = CacheStorage::open(&config.cache_dir)?;
        let asset_cache = Arc::new(storage.open_cache(ASSET_CACHE_NAME)?);
        let resolver = Arc::new(AssetResolver::new(
            asset_cache,
            fetcher,
            config.scratch_dir.clone(),
        ));
        let settings = Arc::new(SettingsStore::new());
        let lifecycle = Arc::new(EngineLifecycle::new(resolver, factory));
        let compressor = Compressor::new(settings.clone(), lifecycle.clone());
        Ok(Self {
            settings,
            lifecycle,
            compressor,
        })
    }

    /// Wire the service with the default HTTP asset fetcher.
    pub fn with_http_fetcher(config: CompressorConfig, factory: EngineFactory) -> Result<Self> {
        Self::new(config, factory, Arc::new(HttpFetcher::new()))
    }

    /// Compress a video file, reporting phased progress to `on_progress`.
    pub async fn compress(
        &self,
        input: MediaFile,
        on_progress: Option<ProgressSink>,
    ) -> CompressionResult {
        self.compressor.compress(input, on_progress).await
    }

    /// Rough wall-clock estimate for UI expectation setting only.
    pub fn estimated_compression_secs(&self, size_mb: f64) -> u64 {
        estimated_compression_secs(size_mb)
    }

    /// Tear down the engine and release materialized assets. The persistent
    /// cache keeps its entries; the next compress bootstraps fresh.
    pub fn cleanup(&self) {
        self.lifecycle.teardown();
    }

    pub fn is_engine_loaded(&self) -> bool {
        self.lifecycle.is_loaded()
    }

    /// Snapshot of the current settings.
    pub fn settings(&self) -> CompressionSettings {
        self.settings.get()
    }

    /// Merge a partial settings update, returning the new snapshot.
    pub fn apply_settings(&self, patch: SettingsPatch) -> CompressionSettings {
        self.settings.apply(patch)
    }

    /// Restore built-in default settings, returning the new snapshot.
    pub fn reset_settings(&self) -> CompressionSettings {
        self.settings.reset()
    }
}
