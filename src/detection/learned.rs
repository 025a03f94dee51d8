use image::imageops::FilterType;
use image::DynamicImage;
use rten::Model;
use rten_tensor::prelude::*;
use rten_tensor::NdTensor;
use std::path::Path;
use tracing::{debug, info};

use crate::detection::annotate::{box_label, class_color, Annotator};
use crate::detection::{Detection, Detector};
use crate::error::{DetectionError, ModelLoadError};
use crate::models::{BoundingBox, Frame, Region};
use crate::params::DetectionParameters;

/// Something that turns an image into scored, labelled boxes
pub trait BoxPredictor: Send {
    /// Candidate regions with confidence at or above `confidence_floor`,
    /// in the coordinates of `image`
    fn predict(&self, image: &DynamicImage, confidence_floor: f32) -> Result<Vec<Region>, DetectionError>;
}

/// YOLOv8-style detector exported to the `.rten` format.
///
/// Expects one `[1, 3, S, S]` input in RGB order scaled to `[0, 1]` and one
/// output of shape `[1, 4 + classes, anchors]` (or its transpose), with box
/// centers and sizes in input pixels.
pub struct RtenYoloPredictor {
    model: Model,
    input_size: u32,
    iou_threshold: f32,
    class_names: Vec<String>,
}

impl RtenYoloPredictor {
    pub fn load(
        path: &Path,
        input_size: u32,
        iou_threshold: f32,
        class_names: Vec<String>,
    ) -> Result<Self, ModelLoadError> {
        if !path.exists() {
            return Err(ModelLoadError {
                path: path.to_path_buf(),
                reason: "file not found".into(),
            });
        }
        let model = Model::load_file(path).map_err(|e| ModelLoadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        info!(path = %path.display(), classes = class_names.len(), "loaded detector model");
        Ok(Self {
            model,
            input_size,
            iou_threshold,
            class_names,
        })
    }

    fn class_name(&self, class_id: usize) -> &str {
        self.class_names
            .get(class_id)
            .map(String::as_str)
            .unwrap_or("?")
    }

    fn input_tensor(&self, image: &DynamicImage) -> NdTensor<f32, 4> {
        let size = self.input_size as usize;
        let resized = image
            .resize_exact(self.input_size, self.input_size, FilterType::Triangle)
            .to_rgb8();
        let plane = size * size;
        let mut data = vec![0f32; 3 * plane];
        for (x, y, pixel) in resized.enumerate_pixels() {
            let offset = y as usize * size + x as usize;
            for channel in 0..3 {
                data[channel * plane + offset] = pixel[channel] as f32 / 255.0;
            }
        }
        NdTensor::from_data([1, 3, size, size], data)
    }
}

impl BoxPredictor for RtenYoloPredictor {
    fn predict(&self, image: &DynamicImage, confidence_floor: f32) -> Result<Vec<Region>, DetectionError> {
        let input = self.input_tensor(image);
        let output = self
            .model
            .run_one(input.view().into(), None)
            .map_err(|e| DetectionError::Inference(e.to_string()))?;
        let output: NdTensor<f32, 3> = output
            .try_into()
            .map_err(|e| DetectionError::Malformed(format!("{:?}", e)))?;

        // Attributes are usually the short axis: 4 box values plus one score per class
        let transposed = output.size(1) > output.size(2);
        let (attributes, anchors) = if transposed {
            (output.size(2), output.size(1))
        } else {
            (output.size(1), output.size(2))
        };
        if attributes < 5 {
            return Err(DetectionError::Malformed(format!(
                "expected at least 5 attributes per anchor, got {}",
                attributes
            )));
        }
        let value = |attr: usize, anchor: usize| -> f32 {
            if transposed {
                output[[0, anchor, attr]]
            } else {
                output[[0, attr, anchor]]
            }
        };

        let scale_x = image.width() as f32 / self.input_size as f32;
        let scale_y = image.height() as f32 / self.input_size as f32;
        let mut candidates = Vec::new();

        for anchor in 0..anchors {
            let (class_id, confidence) = (4..attributes)
                .map(|attr| (attr - 4, value(attr, anchor)))
                .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });
            if confidence < confidence_floor {
                continue;
            }

            let cx = value(0, anchor) * scale_x;
            let cy = value(1, anchor) * scale_y;
            let w = value(2, anchor) * scale_x;
            let h = value(3, anchor) * scale_y;
            let x0 = (cx - w / 2.0).clamp(0.0, image.width() as f32);
            let y0 = (cy - h / 2.0).clamp(0.0, image.height() as f32);
            let x1 = (cx + w / 2.0).clamp(0.0, image.width() as f32);
            let y1 = (cy + h / 2.0).clamp(0.0, image.height() as f32);
            if x1 - x0 < 1.0 || y1 - y0 < 1.0 {
                continue;
            }

            let bbox = BoundingBox {
                x: x0 as u32,
                y: y0 as u32,
                width: (x1 - x0) as u32,
                height: (y1 - y0) as u32,
            };
            candidates.push(Region::from_box(bbox, class_id, self.class_name(class_id), confidence));
        }

        let kept = non_max_suppression(candidates, self.iou_threshold);
        debug!(anchors, kept = kept.len(), "decoded model output");
        Ok(kept)
    }
}

/// Greedy class-agnostic NMS, highest confidence first
pub fn non_max_suppression(mut regions: Vec<Region>, iou_threshold: f32) -> Vec<Region> {
    regions.sort_by(|a, b| {
        b.confidence
            .unwrap_or(0.0)
            .total_cmp(&a.confidence.unwrap_or(0.0))
    });
    let mut kept: Vec<Region> = Vec::new();
    for region in regions {
        if kept.iter().all(|k| k.bbox.iou(&region.bbox) <= iou_threshold) {
            kept.push(region);
        }
    }
    kept
}

/// Regions whose confidence reaches the threshold; unscored regions never count
pub fn filter_by_confidence(regions: Vec<Region>, threshold: f32) -> Vec<Region> {
    regions
        .into_iter()
        .filter(|r| r.confidence.is_some_and(|c| c >= threshold))
        .collect()
}

/// Pill counter backed by a trained object detector
pub struct LearnedDetector {
    predictor: Box<dyn BoxPredictor>,
    annotator: Annotator,
}

impl LearnedDetector {
    pub fn new(predictor: Box<dyn BoxPredictor>, annotator: Annotator) -> Self {
        Self {
            predictor,
            annotator,
        }
    }
}

impl Detector for LearnedDetector {
    fn detect(&self, frame: &Frame, params: &DetectionParameters) -> Result<Detection, DetectionError> {
        if frame.is_empty() {
            return Err(DetectionError::EmptyFrame {
                width: frame.width(),
                height: frame.height(),
            });
        }

        let candidates = self
            .predictor
            .predict(frame.image(), params.confidence_threshold)?;
        let regions = filter_by_confidence(candidates, params.confidence_threshold);
        let raw_count = regions.len() as u32;

        let mut canvas = frame.image().to_rgb8();
        for region in &regions {
            let class_id = region.class_id.unwrap_or(0);
            let color = class_color(class_id);
            self.annotator.draw_box(&mut canvas, &region.bbox, color);
            let label = box_label(
                region.label.as_deref().unwrap_or("?"),
                region.confidence.unwrap_or(0.0),
            );
            self.annotator.draw_label(
                &mut canvas,
                &label,
                (region.bbox.x as i32, region.bbox.y as i32 - 18),
                0.6 * params.display_font_scale,
                color,
            );
        }
        self.annotator.draw_total(&mut canvas, raw_count, params.display_font_scale);

        Ok(Detection {
            regions,
            annotated: Frame::new(DynamicImage::ImageRgb8(canvas)),
            raw_count,
            stages: Vec::new(),
        })
    }

    fn name(&self) -> &str {
        "learned"
    }
}
