// Engine lifecycle — lazy singleton bootstrap with deduplicated loading.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::codec::{CodecEngine, EngineFactory};
use crate::assets::AssetResolver;
use crate::error::CompressError;
use crate::progress::{emit, Phase, ProgressEvent, ProgressSink};

/// Owns the single engine instance.
///
/// States: Unloaded (no handle), Loading (a caller holds the load lock),
/// Ready (handle stored). Concurrent `ensure_loaded` callers share one
/// underlying bootstrap; a failed bootstrap stores nothing, so a later call
/// retries from Unloaded.
pub struct EngineLifecycle {
    resolver: Arc<AssetResolver>,
    factory: EngineFactory,
    engine: RwLock<Option<Arc<dyn CodecEngine>>>,
    load_lock: Mutex<()>,
}

impl EngineLifecycle {
    pub fn new(resolver: Arc<AssetResolver>, factory: EngineFactory) -> Self {
        Self {
            resolver,
            factory,
            engine: RwLock::new(None),
            load_lock: Mutex::new(()),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.engine.read().is_some()
    }

    /// Return the ready engine, bootstrapping it on first use.
    pub async fn ensure_loaded(
        &self,
        on_progress: Option<&ProgressSink>,
    ) -> Result<Arc<dyn CodecEngine>, CompressError> {
        if let Some(engine) = self.engine.read().clone() {
            return Ok(engine);
        }

        let _guard = self.load_lock.lock().await;

        // Another caller may have finished the bootstrap while we waited.
        if let Some(engine) = self.engine.read().clone() {
            return Ok(engine);
        }

        emit(
            on_progress,
            ProgressEvent::new(Phase::Initializing, 0, "Initializing video compression..."),
        );

        let engine = (self.factory)();
        engine.set_log_observer(Box::new(|line| debug!(target: "codec_engine", "{line}")));

        emit(
            on_progress,
            ProgressEvent::new(Phase::Loading, 20, "Loading compression engine..."),
        );

        let assets = self.resolver.resolve_assets().await?;
        engine
            .load(&assets.runtime, &assets.compute)
            .await
            .map_err(CompressError::EngineLoad)?;

        *self.engine.write() = Some(engine.clone());
        info!("compression engine loaded");

        emit(
            on_progress,
            ProgressEvent::new(Phase::Loading, 50, "Compression engine loaded successfully"),
        );

        Ok(engine)
    }

    /// Force the state back to Unloaded: drop the handle and release
    /// materialized assets. The next `ensure_loaded` bootstraps fresh.
    pub fn teardown(&self) {
        if self.engine.write().take().is_some() {
            debug!("engine handle dropped");
        }
        self.resolver.release_assets();
    }
}
