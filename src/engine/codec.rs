use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;

use crate::assets::AssetRef;

/// Native progress tick from the engine: a completion fraction plus the
/// transcode clock. Values come from an external component and are clamped
/// at this boundary rather than trusted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawProgress {
    pub fraction: f64,
    pub elapsed_micros: u64,
}

impl RawProgress {
    /// Clamp the fraction into [0, 1]; NaN maps to 0.
    pub fn clamped(self) -> Self {
        let fraction = if self.fraction.is_nan() {
            0.0
        } else {
            self.fraction.clamp(0.0, 1.0)
        };
        Self { fraction, ..self }
    }
}

pub type LogObserver = Box<dyn Fn(&str) + Send + Sync>;
pub type ProgressObserver = Box<dyn Fn(RawProgress) + Send + Sync>;

/// The opaque decode/encode capability.
///
/// One engine processes one job at a time by construction; the orchestrator
/// serializes transcodes through the single shared handle.
#[async_trait]
pub trait CodecEngine: std::fmt::Debug + Send + Sync {
    /// One-time bootstrap from the two materialized binary assets.
    async fn load(&self, runtime: &AssetRef, compute: &AssetRef) -> Result<()>;

    /// Replace the log line observer.
    fn set_log_observer(&self, observer: LogObserver);

    /// Replace the progress tick observer.
    fn set_progress_observer(&self, observer: ProgressObserver);

    /// Write a file into the engine's virtual filesystem.
    async fn write_file(&self, name: &str, data: Bytes) -> Result<()>;

    /// Run one transcode command.
    async fn execute(&self, args: &[String]) -> Result<()>;

    /// Read a file back out of the virtual filesystem.
    async fn read_file(&self, name: &str) -> Result<Bytes>;

    /// Remove a file from the virtual filesystem.
    async fn delete_file(&self, name: &str) -> Result<()>;
}

/// Builds a fresh, unloaded engine instance.
pub type EngineFactory = Box<dyn Fn() -> Arc<dyn CodecEngine> + Send + Sync>;
