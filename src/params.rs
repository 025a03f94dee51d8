use serde::Deserialize;
use std::sync::{Arc, Mutex};

use crate::error::ParameterError;

/// How the grayscale image is turned into a foreground mask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "BinarizationSetting")]
pub enum Binarization {
    /// Otsu's method picks the level from the histogram of each frame
    Auto,
    Fixed(u8),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BinarizationSetting {
    Level(u8),
    Keyword(String),
}

impl TryFrom<BinarizationSetting> for Binarization {
    type Error = String;

    fn try_from(value: BinarizationSetting) -> Result<Self, Self::Error> {
        match value {
            BinarizationSetting::Level(level) => Ok(Binarization::Fixed(level)),
            BinarizationSetting::Keyword(word) if word.eq_ignore_ascii_case("auto") => {
                Ok(Binarization::Auto)
            }
            BinarizationSetting::Keyword(word) => Err(format!(
                "binarization threshold must be 0-255 or \"auto\", got {:?}",
                word
            )),
        }
    }
}

/// Immutable snapshot of everything that tunes one detector invocation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DetectionParameters {
    pub confidence_threshold: f32,
    pub display_font_scale: f32,
    pub blur_aperture: u32,
    pub binarization: Binarization,
    pub morphology_kernel_size: u32,
    pub closing_enabled: bool,
    pub opening_enabled: bool,
    /// Contours at or below this area are noise
    pub min_region_area: f64,
    #[serde(skip)]
    pub version: u64,
}

impl Default for DetectionParameters {
    // Tuned for brown ibuprofen caplets on a light tray
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            display_font_scale: 1.0,
            blur_aperture: 13,
            binarization: Binarization::Auto,
            morphology_kernel_size: 19,
            closing_enabled: true,
            opening_enabled: false,
            min_region_area: 500.0,
            version: 0,
        }
    }
}

impl DetectionParameters {
    pub fn validate(&self) -> Result<(), ParameterError> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ParameterError::ConfidenceOutOfRange(self.confidence_threshold));
        }
        if self.blur_aperture == 0 || self.blur_aperture % 2 == 0 {
            return Err(ParameterError::InvalidAperture(self.blur_aperture));
        }
        if self.morphology_kernel_size == 0 {
            return Err(ParameterError::ZeroKernel);
        }
        if !(self.display_font_scale > 0.0) {
            return Err(ParameterError::InvalidFontScale(self.display_font_scale));
        }
        if self.min_region_area < 0.0 {
            return Err(ParameterError::NegativeArea(self.min_region_area));
        }
        Ok(())
    }

    /// Build the snapshot that results from applying `patch`, validated.
    /// The version is left for [`ParameterCell`] to assign.
    pub fn with_patch(&self, patch: &ParameterPatch) -> Result<Self, ParameterError> {
        let next = Self {
            confidence_threshold: patch.confidence_threshold.unwrap_or(self.confidence_threshold),
            display_font_scale: patch.display_font_scale.unwrap_or(self.display_font_scale),
            blur_aperture: patch.blur_aperture.unwrap_or(self.blur_aperture),
            binarization: patch.binarization.unwrap_or(self.binarization),
            morphology_kernel_size: patch
                .morphology_kernel_size
                .unwrap_or(self.morphology_kernel_size),
            closing_enabled: patch.closing_enabled.unwrap_or(self.closing_enabled),
            opening_enabled: patch.opening_enabled.unwrap_or(self.opening_enabled),
            min_region_area: patch.min_region_area.unwrap_or(self.min_region_area),
            version: self.version,
        };
        next.validate()?;
        Ok(next)
    }
}

/// Partial update of [`DetectionParameters`]; `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterPatch {
    pub confidence_threshold: Option<f32>,
    pub display_font_scale: Option<f32>,
    pub blur_aperture: Option<u32>,
    pub binarization: Option<Binarization>,
    pub morphology_kernel_size: Option<u32>,
    pub closing_enabled: Option<bool>,
    pub opening_enabled: Option<bool>,
    pub min_region_area: Option<f64>,
}

/// Shared, hot-swappable parameter snapshot.
///
/// Writers build a complete new snapshot and swap the pointer; readers clone
/// the pointer. The lock is only held for the swap or the clone, never while
/// a detector runs.
#[derive(Debug, Clone)]
pub struct ParameterCell {
    current: Arc<Mutex<Arc<DetectionParameters>>>,
}

impl ParameterCell {
    pub fn new(initial: DetectionParameters) -> Self {
        Self {
            current: Arc::new(Mutex::new(Arc::new(initial))),
        }
    }

    pub fn load(&self) -> Arc<DetectionParameters> {
        match self.current.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Replace the snapshot wholesale, bumping its version
    pub fn store(&self, mut params: DetectionParameters) -> Result<Arc<DetectionParameters>, ParameterError> {
        params.validate()?;
        let mut guard = match self.current.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        params.version = guard.version + 1;
        let next = Arc::new(params);
        *guard = next.clone();
        Ok(next)
    }

    /// Apply a patch to the latest snapshot as a single read-modify-swap
    pub fn update(&self, patch: &ParameterPatch) -> Result<Arc<DetectionParameters>, ParameterError> {
        let mut guard = match self.current.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut params = guard.with_patch(patch)?;
        params.version = guard.version + 1;
        let next = Arc::new(params);
        *guard = next.clone();
        Ok(next)
    }
}

impl Default for ParameterCell {
    fn default() -> Self {
        Self::new(DetectionParameters::default())
    }
}
