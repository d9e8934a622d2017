// Phased progress model — maps engine bootstrap and transcode ticks into
// events a UI can consume directly.

use std::fmt;
use std::sync::Arc;

/// Progress phases in the order a successful run visits them.
/// `Error` supersedes any phase; `percent` restarts per phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Initializing,
    Loading,
    Compressing,
    Finalizing,
    Complete,
    Error,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Initializing => "initializing",
            Phase::Loading => "loading",
            Phase::Compressing => "compressing",
            Phase::Finalizing => "finalizing",
            Phase::Complete => "complete",
            Phase::Error => "error",
        };
        f.write_str(name)
    }
}

/// One progress report from the orchestrator.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub phase: Phase,
    /// 0–100 within the current phase's sub-range.
    pub percent: u8,
    pub message: String,
    pub original_size: Option<u64>,
    pub compressed_size: Option<u64>,
}

impl ProgressEvent {
    pub fn new(phase: Phase, percent: u8, message: impl Into<String>) -> Self {
        Self {
            phase,
            percent,
            message: message.into(),
            original_size: None,
            compressed_size: None,
        }
    }

    pub fn with_sizes(mut self, original: Option<u64>, compressed: Option<u64>) -> Self {
        self.original_size = original;
        self.compressed_size = compressed;
        self
    }
}

/// Caller-supplied progress consumer. Shared so the orchestrator can hand it
/// to the engine's progress observer for the duration of a run.
pub type ProgressSink = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Forward `event` to the sink if one was supplied.
pub fn emit(sink: Option<&ProgressSink>, event: ProgressEvent) {
    if let Some(sink) = sink {
        sink(event);
    }
}
