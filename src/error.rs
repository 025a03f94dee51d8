use std::path::PathBuf;

/// Errors raised while acquiring frames from a camera or an image file.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SourceError {
    #[error("no capture device could be opened (tried indices {tried:?})")]
    DeviceUnavailable { tried: Vec<i32> },
    #[error("failed to read image {}: {reason}", .path.display())]
    FileRead { path: PathBuf, reason: String },
    #[error("capture device read failed: {0}")]
    Capture(String),
    #[error("capture device is not open")]
    NotOpen,
    #[error("static index {index} is out of range (set has {len} images)")]
    IndexOutOfRange { index: usize, len: usize },
}

/// A single frame could not be processed. Never fatal for the run loop.
#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    #[error("frame has zero size ({width}x{height})")]
    EmptyFrame { width: u32, height: u32 },
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("malformed model output: {0}")]
    Malformed(String),
}

/// The detector model could not be loaded at construction.
#[derive(Debug, thiserror::Error)]
#[error("failed to load detector model {}: {reason}", .path.display())]
pub struct ModelLoadError {
    pub path: PathBuf,
    pub reason: String,
}

/// A parameter update was rejected because it would break an invariant.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParameterError {
    #[error("confidence threshold {0} is outside [0, 1]")]
    ConfidenceOutOfRange(f32),
    #[error("blur aperture {0} must be a positive odd number")]
    InvalidAperture(u32),
    #[error("morphology kernel size must be greater than zero")]
    ZeroKernel,
    #[error("display font scale {0} must be positive")]
    InvalidFontScale(f32),
    #[error("minimum region area {0} must not be negative")]
    NegativeArea(f64),
}
