// Runtime compression settings — the single mutable parameter set every
// other component reads.

use parking_lot::RwLock;
use serde::Deserialize;

use crate::config::{
    DEFAULT_CRF, DEFAULT_FRAME_RATE, DEFAULT_MAX_HEIGHT, DEFAULT_MAX_WIDTH,
    DEFAULT_TARGET_BITRATE_KBPS,
};

/// Declarative transcode parameters.
///
/// No range validation happens in this module; out-of-range values surface
/// later as a failing or degenerate command. The UI boundary owns constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionSettings {
    pub max_width: u32,
    pub max_height: u32,
    pub frame_rate: u32,
    /// Constant-rate-factor quality level; lower favors fidelity.
    pub crf: u32,
    pub target_bitrate_kbps: u32,
}

impl Default for CompressionSettings {
    fn default() -> Self {
        Self {
            max_width: DEFAULT_MAX_WIDTH,
            max_height: DEFAULT_MAX_HEIGHT,
            frame_rate: DEFAULT_FRAME_RATE,
            crf: DEFAULT_CRF,
            target_bitrate_kbps: DEFAULT_TARGET_BITRATE_KBPS,
        }
    }
}

/// Partial settings update; unset fields keep their current values.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct SettingsPatch {
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
    pub frame_rate: Option<u32>,
    pub crf: Option<u32>,
    pub target_bitrate_kbps: Option<u32>,
}

/// Holds the one live settings instance. Mutations are visible immediately
/// to any subsequent `get`; there is no per-transcode isolation.
pub struct SettingsStore {
    current: RwLock<CompressionSettings>,
}

impl SettingsStore {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(CompressionSettings::default()),
        }
    }

    /// Snapshot copy of the current settings, never a live reference.
    pub fn get(&self) -> CompressionSettings {
        *self.current.read()
    }

    /// Merge `patch` into the current settings, returning the new snapshot.
    pub fn apply(&self, patch: SettingsPatch) -> CompressionSettings {
        let mut current = self.current.write();
        if let Some(v) = patch.max_width {
            current.max_width = v;
        }
        if let Some(v) = patch.max_height {
            current.max_height = v;
        }
        if let Some(v) = patch.frame_rate {
            current.frame_rate = v;
        }
        if let Some(v) = patch.crf {
            current.crf = v;
        }
        if let Some(v) = patch.target_bitrate_kbps {
            current.target_bitrate_kbps = v;
        }
        *current
    }

    /// Restore built-in defaults, returning the new snapshot.
    pub fn reset(&self) -> CompressionSettings {
        let defaults = CompressionSettings::default();
        *self.current.write() = defaults;
        defaults
    }
}

impl Default for SettingsStore {
    fn default() -> Self {
        Self::new()
    }
}
