pub mod annotate;
pub mod classical;
pub mod clump;
pub mod contours;
pub mod learned;
pub mod preprocessing;
pub mod steps;

use crate::config::{AppConfig, DetectorKind};
use crate::error::{DetectionError, ModelLoadError};
use crate::models::{Frame, Region, StageImage};
use crate::params::DetectionParameters;

pub use annotate::Annotator;
pub use classical::ClassicalDetector;
pub use learned::{BoxPredictor, LearnedDetector, RtenYoloPredictor};

/// What a detector reports for one frame
#[derive(Debug, Clone)]
pub struct Detection {
    pub regions: Vec<Region>,
    pub annotated: Frame,
    pub raw_count: u32,
    /// Intermediate images, classical detector only
    pub stages: Vec<StageImage>,
}

/// Counts pills in a single frame.
///
/// Implementations hold no per-frame state: the output depends only on the
/// frame, the parameters and whatever model was loaded at construction.
pub trait Detector: Send {
    fn detect(&self, frame: &Frame, params: &DetectionParameters) -> Result<Detection, DetectionError>;

    /// Human-readable name for logging
    fn name(&self) -> &str;
}

/// The two detection strategies, chosen once from configuration
pub enum PillDetector {
    Classical(ClassicalDetector),
    Learned(LearnedDetector),
}

impl PillDetector {
    /// Build the configured detector. Loading the model happens here, once;
    /// a failure is not retried.
    pub fn from_config(config: &AppConfig) -> Result<Self, ModelLoadError> {
        let annotator = Annotator::with_font_file(config.display.font_path.as_deref());
        match config.detector.kind {
            DetectorKind::Classical => Ok(PillDetector::Classical(ClassicalDetector::new(annotator))),
            DetectorKind::Learned => {
                let predictor = RtenYoloPredictor::load(
                    &config.detector.resolved_model_path(),
                    config.detector.input_size,
                    config.detector.iou_threshold,
                    config.detector.class_names.clone(),
                )?;
                Ok(PillDetector::Learned(LearnedDetector::new(
                    Box::new(predictor),
                    annotator,
                )))
            }
        }
    }
}

impl Detector for PillDetector {
    fn detect(&self, frame: &Frame, params: &DetectionParameters) -> Result<Detection, DetectionError> {
        match self {
            PillDetector::Classical(detector) => detector.detect(frame, params),
            PillDetector::Learned(detector) => detector.detect(frame, params),
        }
    }

    fn name(&self) -> &str {
        match self {
            PillDetector::Classical(detector) => detector.name(),
            PillDetector::Learned(detector) => detector.name(),
        }
    }
}
