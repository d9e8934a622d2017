// End-to-end orchestrator tests over a scripted engine double: skip path,
// full pipeline, failure containment, cleanup, and progress ordering.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use video_compress_engine::api::CompressorService;
use video_compress_engine::assets::AssetRef;
use video_compress_engine::config::CompressorConfig;
use video_compress_engine::compress::MediaFile;
use video_compress_engine::engine::{
    CodecEngine, EngineFactory, LogObserver, ProgressObserver, RawProgress,
};
use video_compress_engine::fetch::{AssetFetcher, FetchedAsset};
use video_compress_engine::progress::{Phase, ProgressEvent, ProgressSink};

const MB: usize = 1024 * 1024;

/// A plausible MP4 payload: ftyp marker at offset 4.
fn fake_mp4(len: usize) -> Bytes {
    let mut data = vec![0u8; len.max(16)];
    data[4..8].copy_from_slice(b"ftyp");
    Bytes::from(data)
}

struct StaticFetcher;

#[async_trait]
impl AssetFetcher for StaticFetcher {
    async fn fetch(&self, _url: &str) -> Result<FetchedAsset> {
        Ok(FetchedAsset {
            content_type: "application/octet-stream".to_string(),
            body: Bytes::from_static(b"asset-bytes"),
        })
    }
}

/// Scripted engine: records operations, plays back progress ticks during
/// execute, and produces a configurable output file.
#[derive(Default)]
struct EngineState {
    ops: Mutex<Vec<String>>,
    vfs: Mutex<HashMap<String, Bytes>>,
    last_args: Mutex<Vec<String>>,
    output: Mutex<Option<Bytes>>,
    ticks: Mutex<Vec<f64>>,
    observer: Mutex<Option<ProgressObserver>>,
}

impl EngineState {
    fn ops(&self) -> Vec<String> {
        self.ops.lock().clone()
    }
}

struct FakeEngine {
    state: Arc<EngineState>,
}

impl std::fmt::Debug for FakeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeEngine").finish()
    }
}

#[async_trait]
impl CodecEngine for FakeEngine {
    async fn load(&self, _runtime: &AssetRef, _compute: &AssetRef) -> Result<()> {
        self.state.ops.lock().push("load".to_string());
        Ok(())
    }

    fn set_log_observer(&self, _observer: LogObserver) {}

    fn set_progress_observer(&self, observer: ProgressObserver) {
        *self.state.observer.lock() = Some(observer);
    }

    async fn write_file(&self, name: &str, data: Bytes) -> Result<()> {
        self.state.ops.lock().push(format!("write:{name}"));
        self.state.vfs.lock().insert(name.to_string(), data);
        Ok(())
    }

    async fn execute(&self, args: &[String]) -> Result<()> {
        self.state.ops.lock().push("execute".to_string());
        *self.state.last_args.lock() = args.to_vec();

        let ticks = self.state.ticks.lock().clone();
        if let Some(observer) = &*self.state.observer.lock() {
            for (i, fraction) in ticks.iter().enumerate() {
                observer(RawProgress {
                    fraction: *fraction,
                    elapsed_micros: (i as u64 + 1) * 500_000,
                });
            }
        }

        let output = self
            .state
            .output
            .lock()
            .clone()
            .unwrap_or_else(|| fake_mp4(MB / 2));
        self.state
            .vfs
            .lock()
            .insert("output.mp4".to_string(), output);
        Ok(())
    }

    async fn read_file(&self, name: &str) -> Result<Bytes> {
        self.state.ops.lock().push(format!("read:{name}"));
        match self.state.vfs.lock().get(name) {
            Some(data) => Ok(data.clone()),
            None => bail!("no such virtual file: {name}"),
        }
    }

    async fn delete_file(&self, name: &str) -> Result<()> {
        self.state.ops.lock().push(format!("delete:{name}"));
        self.state.vfs.lock().remove(name);
        Ok(())
    }
}

struct Fixture {
    service: CompressorService,
    engine_state: Arc<EngineState>,
    factory_calls: Arc<AtomicUsize>,
    _cache_dir: tempfile::TempDir,
    _scratch_dir: tempfile::TempDir,
}

fn fixture() -> Fixture {
    let cache_dir = tempfile::tempdir().unwrap();
    let scratch_dir = tempfile::tempdir().unwrap();

    let engine_state = Arc::new(EngineState::default());
    engine_state.ticks.lock().extend([0.25, 0.6, 1.0]);

    let factory_calls = Arc::new(AtomicUsize::new(0));
    let state = engine_state.clone();
    let calls = factory_calls.clone();
    let factory: EngineFactory = Box::new(move || {
        calls.fetch_add(1, Ordering::SeqCst);
        Arc::new(FakeEngine {
            state: state.clone(),
        })
    });

    let config = CompressorConfig {
        cache_dir: cache_dir.path().to_path_buf(),
        scratch_dir: scratch_dir.path().to_path_buf(),
    };
    let service = CompressorService::new(config, factory, Arc::new(StaticFetcher)).unwrap();

    Fixture {
        service,
        engine_state,
        factory_calls,
        _cache_dir: cache_dir,
        _scratch_dir: scratch_dir,
    }
}

fn collecting_sink() -> (ProgressSink, Arc<Mutex<Vec<ProgressEvent>>>) {
    let events: Arc<Mutex<Vec<ProgressEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let collected = events.clone();
    let sink: ProgressSink = Arc::new(move |event| collected.lock().push(event));
    (sink, events)
}

#[tokio::test]
async fn test_small_files_skip_the_engine() {
    let fx = fixture();
    let input = MediaFile::new("tiny.mp4", vec![7u8; MB / 2]);
    let (sink, events) = collecting_sink();

    let result = fx.service.compress(input.clone(), Some(sink)).await;

    assert!(result.success);
    assert_eq!(result.ratio, 1.0);
    assert_eq!(result.compressed_size, result.original_size);
    assert_eq!(result.output.data, input.data);
    // No engine interaction at all.
    assert_eq!(fx.factory_calls.load(Ordering::SeqCst), 0);
    assert!(events.lock().is_empty());
}

#[tokio::test]
async fn test_full_pipeline_success() {
    let fx = fixture();
    let input = MediaFile::new("clip.mp4", vec![1u8; 3 * MB]);
    let (sink, events) = collecting_sink();

    let result = fx.service.compress(input, Some(sink)).await;

    assert!(result.success, "error: {:?}", result.error);
    assert_eq!(result.output.name, "clip.mp4");
    assert_eq!(result.original_size, 3 * MB as u64);
    assert!(result.compressed_size < result.original_size);
    assert!(result.ratio > 1.0);

    // write -> execute -> read, with both virtual files cleaned up.
    let ops = fx.engine_state.ops();
    let pos = |needle: &str| ops.iter().position(|o| o == needle).unwrap();
    assert!(pos("write:input.mp4") < pos("execute"));
    assert!(pos("execute") < pos("read:output.mp4"));
    assert!(ops.contains(&"delete:input.mp4".to_string()));
    assert!(ops.contains(&"delete:output.mp4".to_string()));

    // Transcode ticks surfaced as compressing events capped at 95.
    let events = events.lock();
    let compressing: Vec<u8> = events
        .iter()
        .filter(|e| e.phase == Phase::Compressing)
        .map(|e| e.percent)
        .collect();
    assert!(compressing.contains(&25));
    assert!(compressing.iter().all(|p| *p <= 95));

    let last = events.last().unwrap();
    assert_eq!(last.phase, Phase::Complete);
    assert_eq!(last.percent, 100);
    assert_eq!(last.original_size, Some(3 * MB as u64));
}

#[tokio::test]
async fn test_progress_phases_are_ordered() {
    let fx = fixture();
    let input = MediaFile::new("clip.mp4", vec![1u8; 2 * MB]);
    let (sink, events) = collecting_sink();

    let result = fx.service.compress(input, Some(sink)).await;
    assert!(result.success);

    let events = events.lock();
    assert!(!events.is_empty());

    // Phases never move backwards, and percent never decreases within one
    // phase.
    for pair in events.windows(2) {
        assert!(
            pair[0].phase <= pair[1].phase,
            "phase regressed: {} -> {}",
            pair[0].phase,
            pair[1].phase
        );
        if pair[0].phase == pair[1].phase {
            assert!(pair[0].percent <= pair[1].percent);
        }
    }
    assert_eq!(events.first().unwrap().phase, Phase::Initializing);
    assert_eq!(events.last().unwrap().phase, Phase::Complete);
}

#[tokio::test]
async fn test_empty_output_fails_but_engine_survives() {
    let fx = fixture();
    *fx.engine_state.output.lock() = Some(Bytes::new());

    let input = MediaFile::new("clip.mp4", vec![1u8; 2 * MB]);
    let (sink, events) = collecting_sink();
    let result = fx.service.compress(input.clone(), Some(sink)).await;

    assert!(!result.success);
    assert!(result.error.as_deref().unwrap().contains("empty output"));
    // The caller still holds the original file.
    assert_eq!(result.output.data, input.data);
    assert_eq!(result.ratio, 1.0);
    assert_eq!(events.lock().last().unwrap().phase, Phase::Error);

    // Cleanup ran even though the call failed.
    let ops = fx.engine_state.ops();
    assert!(ops.contains(&"delete:input.mp4".to_string()));
    assert!(ops.contains(&"delete:output.mp4".to_string()));

    // The engine stays loaded and the next call succeeds without a fresh
    // bootstrap.
    assert!(fx.service.is_engine_loaded());
    *fx.engine_state.output.lock() = None;
    let result = fx.service.compress(input, None).await;
    assert!(result.success);
    assert_eq!(fx.factory_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_non_mp4_output_fails() {
    let fx = fixture();
    *fx.engine_state.output.lock() = Some(Bytes::from_static(b"plainly not a video file"));

    let input = MediaFile::new("clip.mp4", vec![1u8; 2 * MB]);
    let result = fx.service.compress(input, None).await;

    assert!(!result.success);
    assert!(result.error.as_deref().unwrap().contains("unsupported output"));
}

#[tokio::test]
async fn test_cleanup_forces_fresh_bootstrap() {
    let fx = fixture();
    let input = MediaFile::new("clip.mp4", vec![1u8; 2 * MB]);

    let result = fx.service.compress(input.clone(), None).await;
    assert!(result.success);
    assert_eq!(fx.factory_calls.load(Ordering::SeqCst), 1);
    assert!(fx.service.is_engine_loaded());

    fx.service.cleanup();
    assert!(!fx.service.is_engine_loaded());

    let result = fx.service.compress(input, None).await;
    assert!(result.success);
    assert_eq!(fx.factory_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_command_reflects_current_settings() {
    let fx = fixture();
    fx.service
        .apply_settings(video_compress_engine::settings::SettingsPatch {
            max_width: Some(640),
            crf: Some(20),
            ..Default::default()
        });

    let input = MediaFile::new("clip.mp4", vec![1u8; 2 * MB]);
    let result = fx.service.compress(input, None).await;
    assert!(result.success);

    let args = fx.engine_state.last_args.lock().clone();
    let crf_pos = args.iter().position(|a| a == "-crf").unwrap();
    assert_eq!(args[crf_pos + 1], "20");
    let vf_pos = args.iter().position(|a| a == "-vf").unwrap();
    assert!(args[vf_pos + 1].contains("min(640,iw)"));
}

#[tokio::test]
async fn test_estimated_compression_secs() {
    let fx = fixture();
    assert_eq!(fx.service.estimated_compression_secs(1.0), 10);
    assert_eq!(fx.service.estimated_compression_secs(20.0), 60);
}
