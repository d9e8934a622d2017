// Transcoding orchestrator — drives the engine end to end for one file and
// contains every failure into a non-throwing result.

pub mod command;

pub use command::{
    bounded_bitrate_kbps, build_compression_command, fit_dimensions, scale_pad_filter,
};

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::config::{INPUT_FILE_NAME, OUTPUT_FILE_NAME, SKIP_COMPRESSION_THRESHOLD_MB};
use crate::engine::{CodecEngine, EngineLifecycle};
use crate::error::CompressError;
use crate::progress::{emit, Phase, ProgressEvent, ProgressSink};
use crate::settings::SettingsStore;

/// An in-memory media file moving through the orchestrator.
#[derive(Debug, Clone)]
pub struct MediaFile {
    pub name: String,
    pub data: Bytes,
}

impl MediaFile {
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }

    pub fn size_bytes(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn size_mb(&self) -> f64 {
        self.data.len() as f64 / (1024.0 * 1024.0)
    }
}

/// Outcome of one compression attempt.
///
/// On failure `output` carries the original file, so callers always hold
/// something playable.
#[derive(Debug, Clone)]
pub struct CompressionResult {
    pub output: MediaFile,
    pub original_size: u64,
    pub compressed_size: u64,
    pub ratio: f64,
    pub success: bool,
    pub error: Option<String>,
}

impl CompressionResult {
    fn pass_through(input: MediaFile, error: Option<String>) -> Self {
        let size = input.size_bytes();
        Self {
            output: input,
            original_size: size,
            compressed_size: size,
            ratio: 1.0,
            success: error.is_none(),
            error,
        }
    }
}

pub struct Compressor {
    settings: Arc<SettingsStore>,
    lifecycle: Arc<EngineLifecycle>,
}

impl Compressor {
    pub fn new(settings: Arc<SettingsStore>, lifecycle: Arc<EngineLifecycle>) -> Self {
        Self {
            settings,
            lifecycle,
        }
    }

    /// Compress a video file. Never fails at the signature level; all
    /// failures land in the result and in a final `Error`-phase event.
    pub async fn compress(
        &self,
        input: MediaFile,
        on_progress: Option<ProgressSink>,
    ) -> CompressionResult {
        if input.size_mb() <= SKIP_COMPRESSION_THRESHOLD_MB as f64 {
            debug!(
                "input {} ({} bytes) at or below skip threshold, passing through",
                input.name,
                input.size_bytes()
            );
            return CompressionResult::pass_through(input, None);
        }

        match self.run(&input, on_progress.as_ref()).await {
            Ok(result) => result,
            Err(e) => {
                let message = e.to_string();
                warn!("compression of {} failed: {}", input.name, message);
                emit(
                    on_progress.as_ref(),
                    ProgressEvent::new(
                        Phase::Error,
                        0,
                        format!("Compression failed: {message}"),
                    ),
                );
                CompressionResult::pass_through(input, Some(message))
            }
        }
    }

    async fn run(
        &self,
        input: &MediaFile,
        on_progress: Option<&ProgressSink>,
    ) -> Result<CompressionResult, CompressError> {
        let original_size = input.size_bytes();

        let engine = self.lifecycle.ensure_loaded(on_progress).await?;

        emit(
            on_progress,
            ProgressEvent::new(Phase::Compressing, 0, "Preparing video for compression...")
                .with_sizes(Some(original_size), None),
        );

        engine.write_file(INPUT_FILE_NAME, input.data.clone()).await?;

        // Settings are snapshotted here, once; a concurrent change affects
        // only later calls.
        let args = build_compression_command(&self.settings.get());
        debug!("transcode command: {}", args.join(" "));

        if let Some(sink) = on_progress {
            let sink = sink.clone();
            engine.set_progress_observer(Box::new(move |tick| {
                let tick = tick.clamped();
                let raw_percent = (tick.fraction * 100.0).round() as u8;
                let elapsed_secs = tick.elapsed_micros as f64 / 1_000_000.0;
                // Cap at 95 so "done" is never signaled before the output
                // has actually been read back.
                sink(ProgressEvent::new(
                    Phase::Compressing,
                    raw_percent.min(95),
                    format!("Compressing video... {raw_percent}% ({elapsed_secs:.2}s)"),
                ));
            }));
        }

        let exec_result = engine.execute(&args).await;

        let read_result = match exec_result {
            Ok(()) => {
                emit(
                    on_progress,
                    ProgressEvent::new(Phase::Finalizing, 95, "Finalizing compressed video..."),
                );
                engine.read_file(OUTPUT_FILE_NAME).await
            }
            Err(e) => Err(e),
        };

        // Scoped cleanup: both virtual files go regardless of outcome.
        for name in [INPUT_FILE_NAME, OUTPUT_FILE_NAME] {
            if let Err(e) = engine.delete_file(name).await {
                debug!("virtual file {} cleanup failed: {}", name, e);
            }
        }

        let output_data = read_result?;
        let compressed_size = output_data.len() as u64;

        if compressed_size == 0 {
            return Err(CompressError::EmptyOutput);
        }
        if !looks_like_mp4(&output_data) {
            return Err(CompressError::UnsupportedOutput);
        }

        let ratio = original_size as f64 / compressed_size as f64;
        let original_mb = original_size as f64 / (1024.0 * 1024.0);
        let compressed_mb = compressed_size as f64 / (1024.0 * 1024.0);

        emit(
            on_progress,
            ProgressEvent::new(
                Phase::Complete,
                100,
                format!(
                    "Compression complete! Reduced from {original_mb:.1}MB to {compressed_mb:.1}MB"
                ),
            )
            .with_sizes(Some(original_size), Some(compressed_size)),
        );

        Ok(CompressionResult {
            output: MediaFile::new(input.name.clone(), output_data),
            original_size,
            compressed_size,
            ratio,
            success: true,
            error: None,
        })
    }
}

/// MP4/MOV: a `ftyp` box marker at offset 4.
fn looks_like_mp4(data: &[u8]) -> bool {
    data.len() >= 8 && &data[4..8] == b"ftyp"
}

/// Rough wall-clock estimate in seconds, for UI expectation setting only.
pub fn estimated_compression_secs(size_mb: f64) -> u64 {
    (size_mb * 3.0).ceil().max(10.0) as u64
}
