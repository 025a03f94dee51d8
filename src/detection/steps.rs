use crate::detection::preprocessing;
use crate::error::DetectionError;
use crate::params::{Binarization, DetectionParameters};
use crate::pipeline::{Pipeline, PipelineStep};
use image::DynamicImage;
use std::sync::Arc;

/// Median blur on the color image
pub struct MedianBlurStep {
    pub aperture: u32,
}

impl PipelineStep for MedianBlurStep {
    fn process(&self, image: &DynamicImage) -> Result<DynamicImage, DetectionError> {
        let rgb = image.to_rgb8();
        Ok(DynamicImage::ImageRgb8(preprocessing::median_blur(&rgb, self.aperture)))
    }

    fn name(&self) -> &str {
        "blur"
    }
}

/// Convert image to grayscale
pub struct GrayscaleStep;

impl PipelineStep for GrayscaleStep {
    fn process(&self, image: &DynamicImage) -> Result<DynamicImage, DetectionError> {
        Ok(DynamicImage::ImageLuma8(preprocessing::to_grayscale(image)))
    }

    fn name(&self) -> &str {
        "gray"
    }
}

/// Split foreground from background, fixed or Otsu level
pub struct BinarizeStep {
    pub binarization: Binarization,
}

impl PipelineStep for BinarizeStep {
    fn process(&self, image: &DynamicImage) -> Result<DynamicImage, DetectionError> {
        let gray = image.to_luma8();
        Ok(DynamicImage::ImageLuma8(preprocessing::binarize(&gray, self.binarization)))
    }

    fn name(&self) -> &str {
        "threshold"
    }
}

/// Morphological closing of the mask
pub struct CloseStep {
    pub kernel_size: u32,
}

impl PipelineStep for CloseStep {
    fn process(&self, image: &DynamicImage) -> Result<DynamicImage, DetectionError> {
        let mask = image.to_luma8();
        Ok(DynamicImage::ImageLuma8(preprocessing::close(&mask, self.kernel_size)))
    }

    fn name(&self) -> &str {
        "closing"
    }
}

/// Morphological opening of the mask
pub struct OpenStep {
    pub kernel_size: u32,
}

impl PipelineStep for OpenStep {
    fn process(&self, image: &DynamicImage) -> Result<DynamicImage, DetectionError> {
        let mask = image.to_luma8();
        Ok(DynamicImage::ImageLuma8(preprocessing::open(&mask, self.kernel_size)))
    }

    fn name(&self) -> &str {
        "opening"
    }
}

/// Every stage the mask pipeline can produce, in chain order. A stage's
/// published number is its position here plus one, whether or not the
/// stages before it ran.
pub const STAGE_NAMES: [&str; 5] = ["blur", "gray", "threshold", "closing", "opening"];

/// Build the mask pipeline described by one parameter snapshot
pub fn build_mask_pipeline(params: &DetectionParameters) -> Pipeline {
    let mut pipeline = Pipeline::new()
        .add_step(Arc::new(MedianBlurStep {
            aperture: params.blur_aperture,
        }))
        .add_step(Arc::new(GrayscaleStep))
        .add_step(Arc::new(BinarizeStep {
            binarization: params.binarization,
        }));

    if params.closing_enabled {
        pipeline = pipeline.add_step(Arc::new(CloseStep {
            kernel_size: params.morphology_kernel_size,
        }));
    }
    if params.opening_enabled {
        pipeline = pipeline.add_step(Arc::new(OpenStep {
            kernel_size: params.morphology_kernel_size,
        }));
    }

    pipeline
}
