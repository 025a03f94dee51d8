use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::params::DetectionParameters;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub smoothing: SmoothingConfig,
    #[serde(default)]
    pub parameters: DetectionParameters,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorKind {
    Classical,
    Learned,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectorConfig {
    #[serde(default = "default_detector_kind")]
    pub kind: DetectorKind,
    /// Relative paths are resolved against the executable's directory
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,
    #[serde(default = "default_class_names")]
    pub class_names: Vec<String>,
    #[serde(default = "default_input_size")]
    pub input_size: u32,
    #[serde(default = "default_iou_threshold")]
    pub iou_threshold: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CameraConfig {
    #[serde(default)]
    pub preferred_index: i32,
    /// Highest index scanned when the preferred device fails to open
    #[serde(default = "default_probe_max_index")]
    pub probe_max_index: i32,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmoothingConfig {
    #[serde(default = "default_window_secs")]
    pub window_secs: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_stream_id")]
    pub stream_id: String,
    /// TrueType font for labels, replacing the bundled DejaVu Sans
    #[serde(default)]
    pub font_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            kind: default_detector_kind(),
            model_path: default_model_path(),
            class_names: default_class_names(),
            input_size: default_input_size(),
            iou_threshold: default_iou_threshold(),
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            preferred_index: 0,
            probe_max_index: default_probe_max_index(),
            width: default_width(),
            height: default_height(),
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            stream_id: default_stream_id(),
            font_path: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.parameters
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if self.camera.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid("camera.tick_interval_ms must be positive".into()));
        }
        if !(self.smoothing.window_secs > 0.0) {
            return Err(ConfigError::Invalid("smoothing.window_secs must be positive".into()));
        }
        if self.detector.kind == DetectorKind::Learned && self.detector.class_names.is_empty() {
            return Err(ConfigError::Invalid("detector.class_names must not be empty".into()));
        }
        Ok(())
    }
}

impl CameraConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Device indices in the order they are tried: the preferred index,
    /// then a downward scan from `probe_max_index` to 0.
    pub fn probe_order(&self) -> Vec<i32> {
        let mut order = vec![self.preferred_index];
        for index in (0..=self.probe_max_index).rev() {
            if index != self.preferred_index {
                order.push(index);
            }
        }
        order
    }
}

impl SmoothingConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs_f64(self.window_secs)
    }
}

impl DetectorConfig {
    /// Resolve the model path relative to the running executable
    pub fn resolved_model_path(&self) -> PathBuf {
        if self.model_path.is_absolute() {
            return self.model_path.clone();
        }
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join(&self.model_path)))
            .unwrap_or_else(|| self.model_path.clone())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {0}: {1}")]
    ReadFile(String, std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// Default value functions
fn default_detector_kind() -> DetectorKind {
    DetectorKind::Classical
}
fn default_model_path() -> PathBuf {
    PathBuf::from("models/pills.rten")
}
fn default_class_names() -> Vec<String> {
    vec!["capsule".into(), "tablet".into()]
}
fn default_input_size() -> u32 {
    640
}
fn default_iou_threshold() -> f32 {
    0.45
}
fn default_probe_max_index() -> i32 {
    3
}
fn default_width() -> u32 {
    640
}
fn default_height() -> u32 {
    480
}
fn default_tick_interval_ms() -> u64 {
    33
}
fn default_window_secs() -> f64 {
    5.0
}
fn default_stream_id() -> String {
    "pillCamera".into()
}
fn default_log_level() -> String {
    "info".into()
}
