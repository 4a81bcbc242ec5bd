//! Session, upload and pipeline configuration
//!
//! All configuration is immutable once a session starts. Values can be built
//! in code with the `with_*` methods or loaded from JSON, where omitted fields
//! take their defaults.

use crate::error::ComputeError;
use crate::types::NormalizationMode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Frames per dataframe
pub const DEFAULT_DATAFRAME_SIZE: usize = 10;

/// Landmarks produced by the tracker for one hand
pub const DEFAULT_LANDMARK_COUNT: usize = 21;

/// Quantization denominator for scaled coordinates (0.01 precision)
pub const DEFAULT_ROUNDING_SCALE: f32 = 100.0;

/// Pause between two captured samples.
///
/// Paces live capture; 0 re-opens collection as soon as a dataframe is stored.
pub const DEFAULT_COOLDOWN_MS: u64 = 1_000;

/// Delay before the first sample is collected
pub const DEFAULT_WARMUP_MS: u64 = 5_000;

/// Collection server route used when nothing else is configured
pub const DEFAULT_UPLOAD_ENDPOINT: &str = "http://localhost:5000/save";

fn default_dataframe_size() -> usize {
    DEFAULT_DATAFRAME_SIZE
}

fn default_landmark_count() -> usize {
    DEFAULT_LANDMARK_COUNT
}

fn default_rounding_scale() -> f32 {
    DEFAULT_ROUNDING_SCALE
}

fn default_cooldown_ms() -> u64 {
    DEFAULT_COOLDOWN_MS
}

fn default_warmup_ms() -> u64 {
    DEFAULT_WARMUP_MS
}

fn default_true() -> bool {
    true
}

/// Configuration of one capture or classify session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureSessionConfig {
    /// Class being recorded (e.g. "A", "Heart")
    pub label: String,
    /// Number of dataframes to collect before the session is complete
    pub target_sample_count: usize,
    /// Frames per dataframe
    #[serde(default = "default_dataframe_size")]
    pub dataframe_size: usize,
    /// Mirror x coordinates (`Default` mode only)
    #[serde(default)]
    pub mirror_x: bool,
    /// Emit three components per landmark instead of two
    #[serde(default = "default_true")]
    pub is_3d: bool,
    #[serde(default)]
    pub mode: NormalizationMode,
    #[serde(default = "default_rounding_scale")]
    pub rounding_scale: f32,
    #[serde(default = "default_landmark_count")]
    pub landmark_count: usize,
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
    #[serde(default = "default_warmup_ms")]
    pub warmup_ms: u64,
}

impl CaptureSessionConfig {
    /// Create a configuration with default layout and timing
    pub fn new(label: impl Into<String>, target_sample_count: usize) -> Self {
        Self {
            label: label.into(),
            target_sample_count,
            dataframe_size: DEFAULT_DATAFRAME_SIZE,
            mirror_x: false,
            is_3d: true,
            mode: NormalizationMode::default(),
            rounding_scale: DEFAULT_ROUNDING_SCALE,
            landmark_count: DEFAULT_LANDMARK_COUNT,
            cooldown_ms: DEFAULT_COOLDOWN_MS,
            warmup_ms: DEFAULT_WARMUP_MS,
        }
    }

    pub fn with_mode(mut self, mode: NormalizationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_dataframe_size(mut self, dataframe_size: usize) -> Self {
        self.dataframe_size = dataframe_size;
        self
    }

    pub fn with_mirror_x(mut self, mirror_x: bool) -> Self {
        self.mirror_x = mirror_x;
        self
    }

    pub fn with_3d(mut self, is_3d: bool) -> Self {
        self.is_3d = is_3d;
        self
    }

    pub fn with_rounding_scale(mut self, rounding_scale: f32) -> Self {
        self.rounding_scale = rounding_scale;
        self
    }

    pub fn with_landmark_count(mut self, landmark_count: usize) -> Self {
        self.landmark_count = landmark_count;
        self
    }

    pub fn with_cooldown_ms(mut self, cooldown_ms: u64) -> Self {
        self.cooldown_ms = cooldown_ms;
        self
    }

    pub fn with_warmup_ms(mut self, warmup_ms: u64) -> Self {
        self.warmup_ms = warmup_ms;
        self
    }

    /// Components emitted per landmark (3 in 3D mode, 2 otherwise)
    pub fn components_per_landmark(&self) -> usize {
        if self.is_3d {
            3
        } else {
            2
        }
    }

    /// Width of the real landmark block in each frame
    pub fn hand_width(&self) -> usize {
        self.landmark_count * self.components_per_landmark()
    }

    /// Full encoded frame width, including the zero-filled second hand slot
    pub fn frame_width(&self) -> usize {
        2 * self.hand_width()
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn warmup(&self) -> Duration {
        Duration::from_millis(self.warmup_ms)
    }

    /// Check the frame layout only (all that a classify session needs)
    pub fn validate_layout(&self) -> Result<(), ComputeError> {
        if self.dataframe_size == 0 {
            return Err(ComputeError::InvalidConfig(
                "dataframe_size must be positive".to_string(),
            ));
        }
        if self.landmark_count == 0 {
            return Err(ComputeError::InvalidConfig(
                "landmark_count must be positive".to_string(),
            ));
        }
        if !(self.rounding_scale.is_finite() && self.rounding_scale > 0.0) {
            return Err(ComputeError::InvalidConfig(format!(
                "rounding_scale must be a positive number, got {}",
                self.rounding_scale
            )));
        }
        Ok(())
    }

    /// Check everything a capture session needs
    pub fn validate(&self) -> Result<(), ComputeError> {
        if self.label.trim().is_empty() {
            return Err(ComputeError::InvalidConfig(
                "label must not be empty".to_string(),
            ));
        }
        if self.target_sample_count == 0 {
            return Err(ComputeError::InvalidConfig(
                "target_sample_count must be positive".to_string(),
            ));
        }
        self.validate_layout()
    }

    /// Load a configuration from JSON
    pub fn from_json(json: &str) -> Result<Self, ComputeError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize the configuration to JSON
    pub fn to_json(&self) -> Result<String, ComputeError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn default_upload_endpoint() -> String {
    DEFAULT_UPLOAD_ENDPOINT.to_string()
}

fn default_upload_timeout_ms() -> u64 {
    10_000
}

/// Process-wide delivery settings, read-only while a session is active
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Full URL of the collection server's save route
    #[serde(default = "default_upload_endpoint")]
    pub endpoint: String,
    /// Whether completed sessions are sent at all
    #[serde(default)]
    pub should_upload: bool,
    #[serde(default = "default_upload_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            endpoint: default_upload_endpoint(),
            should_upload: false,
            timeout_ms: default_upload_timeout_ms(),
        }
    }
}

impl UploadConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            should_upload: true,
            ..Default::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ComputeError> {
        if !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")) {
            return Err(ComputeError::InvalidConfig(format!(
                "upload endpoint must be an http(s) URL, got '{}'",
                self.endpoint
            )));
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self, ComputeError> {
        Ok(serde_json::from_str(json)?)
    }
}

fn default_queue_capacity() -> usize {
    0
}

fn default_event_capacity() -> usize {
    64
}

fn default_stall_timeout_ms() -> u64 {
    2_000
}

/// Tuning for the threaded frame pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineOptions {
    /// Landmark sets that may wait while the worker is busy.
    ///
    /// 0 hands a set over only while the worker is idle; anything arriving
    /// mid-cycle is dropped.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Undelivered notifications kept before the oldest are discarded
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    /// How long one landmark set may be processed before the worker counts as stalled
    #[serde(default = "default_stall_timeout_ms")]
    pub stall_timeout_ms: u64,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            event_capacity: default_event_capacity(),
            stall_timeout_ms: default_stall_timeout_ms(),
        }
    }
}

impl PipelineOptions {
    pub fn stall_timeout(&self) -> Duration {
        Duration::from_millis(self.stall_timeout_ms)
    }
}
