use std::path::PathBuf;

use serde::Deserialize;

/// Files at or below this size are returned unchanged, without touching the engine.
pub const SKIP_COMPRESSION_THRESHOLD_MB: u64 = 1;

/// Output size budget in MB; drives the bitrate ceiling.
pub const MAX_COMPRESSED_SIZE_MB: u64 = 10;

/// Largest input the UI boundary should accept (not enforced here).
pub const MAX_ORIGINAL_SIZE_MB: u64 = 20;

/// Assumed upper bound on clip duration when budgeting bitrate.
pub const MAX_DURATION_SECONDS: u64 = 10;

/// Pinned source URL for the engine's runtime module.
pub const ENGINE_RUNTIME_URL: &str =
    "https://cdn.jsdelivr.net/npm/@ffmpeg/core@0.12.10/dist/umd/ffmpeg-core.js";

/// Pinned source URL for the engine's compute module.
pub const ENGINE_COMPUTE_URL: &str =
    "https://cdn.jsdelivr.net/npm/@ffmpeg/core@0.12.10/dist/umd/ffmpeg-core.wasm";

/// Generation-independent cache holding the pinned engine assets.
/// Content is immutable per pinned version, so generation rollover never
/// evicts this cache.
pub const ASSET_CACHE_NAME: &str = "video-compressor-ffmpeg-core";

/// Deployment version baked into the shell cache generation tag.
pub const WORKER_VERSION: &str = "v1.0.0";

/// Name of the page-shell cache for the current deployment generation.
pub fn shell_cache_name() -> String {
    format!("video-compressor-static-{WORKER_VERSION}")
}

/// Host prefixes recognized as engine asset sources.
pub const ENGINE_ASSET_HOST_PREFIXES: &[&str] = &[
    "https://cdn.jsdelivr.net/npm/@ffmpeg/core",
    "https://unpkg.com/@ffmpeg/core",
];

/// Local paths under which the page may request the engine assets.
pub const ENGINE_ASSET_LOCAL_PATHS: &[&str] =
    &["/ffmpeg/ffmpeg-core.js", "/ffmpeg/ffmpeg-core.wasm"];

/// Shell entries pre-populated by the cache worker on install.
pub const SHELL_PRECACHE_PATHS: &[&str] = &["/", "/manifest.json"];

/// Virtual filesystem name for the transcode input.
pub const INPUT_FILE_NAME: &str = "input.mp4";

/// Virtual filesystem name for the transcode output.
pub const OUTPUT_FILE_NAME: &str = "output.mp4";

/// Fixed audio bitrate in kbps.
pub const AUDIO_BITRATE_KBPS: u32 = 128;

/// Fixed audio channel count.
pub const AUDIO_CHANNELS: u32 = 2;

/// Default bound on output width.
pub const DEFAULT_MAX_WIDTH: u32 = 1280;

/// Default bound on output height.
pub const DEFAULT_MAX_HEIGHT: u32 = 1280;

/// Default output frame rate.
pub const DEFAULT_FRAME_RATE: u32 = 24;

/// Default constant-rate-factor quality level (lower = higher fidelity).
pub const DEFAULT_CRF: u32 = 28;

/// Default target video bitrate in kbps.
pub const DEFAULT_TARGET_BITRATE_KBPS: u32 = 800;

/// Top-level configuration for the compression engine.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompressorConfig {
    /// Root directory for the persistent URL cache.
    pub cache_dir: PathBuf,
    /// Directory where resolved assets are materialized for the engine.
    pub scratch_dir: PathBuf,
}
