use image::DynamicImage;
use tracing::debug;

use crate::detection::annotate::{Annotator, LABEL_COLOR, OUTLINE_COLOR};
use crate::detection::steps::build_mask_pipeline;
use crate::detection::{clump, contours, Detection, Detector};
use crate::error::DetectionError;
use crate::models::Frame;
use crate::params::DetectionParameters;

/// Blur, threshold and contour based pill counter
#[derive(Clone, Default)]
pub struct ClassicalDetector {
    annotator: Annotator,
}

impl ClassicalDetector {
    pub fn new(annotator: Annotator) -> Self {
        Self { annotator }
    }
}

impl Detector for ClassicalDetector {
    fn detect(&self, frame: &Frame, params: &DetectionParameters) -> Result<Detection, DetectionError> {
        if frame.is_empty() {
            return Err(DetectionError::EmptyFrame {
                width: frame.width(),
                height: frame.height(),
            });
        }

        let output = build_mask_pipeline(params).run(frame.image().clone())?;
        let mask = output.image.to_luma8();

        let mut regions = contours::outer_contours(&mask);
        let contour_count = regions.len();
        let raw_count = clump::estimate(&mut regions, params.min_region_area);

        debug!(
            contours = contour_count,
            kept = regions.len(),
            raw_count,
            "classical detection finished"
        );

        let mut canvas = frame.image().to_rgb8();
        for region in &regions {
            self.annotator.draw_contour(&mut canvas, &region.contour, OUTLINE_COLOR);
            let (cx, cy) = region.bbox.center();
            self.annotator.draw_label(
                &mut canvas,
                &region.estimated_count.to_string(),
                (cx as i32 - 10, cy as i32 - 10),
                0.7 * params.display_font_scale,
                LABEL_COLOR,
            );
        }
        self.annotator.draw_total(&mut canvas, raw_count, params.display_font_scale);

        Ok(Detection {
            regions,
            annotated: Frame::new(DynamicImage::ImageRgb8(canvas)),
            raw_count,
            stages: output.stages,
        })
    }

    fn name(&self) -> &str {
        "classical"
    }
}
