use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut};
use imageproc::point::Point;
use imageproc::rect::Rect;
use std::path::Path;
use tracing::warn;

use crate::models::BoundingBox;

pub const OUTLINE_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const LABEL_COLOR: Rgb<u8> = Rgb([0, 0, 255]);
pub const TOTAL_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

/// Fixed per-class colors, indexed by class id
const CLASS_PALETTE: [Rgb<u8>; 8] = [
    Rgb([255, 56, 56]),
    Rgb([72, 249, 10]),
    Rgb([0, 194, 255]),
    Rgb([255, 157, 151]),
    Rgb([207, 210, 49]),
    Rgb([146, 204, 23]),
    Rgb([132, 56, 255]),
    Rgb([255, 178, 29]),
];

/// Pixel height of text at a font scale of 1.0
const BASE_TEXT_PX: f32 = 24.0;

/// Label font compiled into the binary; `display.font_path` overrides it
const BUNDLED_FONT: &[u8] = include_bytes!("../../assets/fonts/DejaVuSans.ttf");

pub fn class_color(class_id: usize) -> Rgb<u8> {
    CLASS_PALETTE[class_id % CLASS_PALETTE.len()]
}

/// Short box label: first letter of the class and the confidence digits,
/// e.g. `("capsule", 0.87)` becomes `c87`.
pub fn box_label(class_name: &str, confidence: f32) -> String {
    let letter = class_name.chars().next().unwrap_or('?');
    // two digits at most: 1.0 shows as 99
    let percent = (confidence.clamp(0.0, 1.0) * 100.0).round().min(99.0) as u32;
    format!("{}{:02}", letter, percent)
}

/// Draws outlines, boxes and labels onto annotated frames.
///
/// Labels use the bundled DejaVu Sans unless another TrueType font is given.
#[derive(Clone)]
pub struct Annotator {
    font: Option<FontArc>,
}

impl Annotator {
    pub fn new() -> Self {
        match FontArc::try_from_slice(BUNDLED_FONT) {
            Ok(font) => Self { font: Some(font) },
            Err(e) => {
                warn!(error = %e, "bundled label font is invalid, drawing without text");
                Self { font: None }
            }
        }
    }

    /// Use the font at `path` for labels, keeping the bundled one if it
    /// cannot be read
    pub fn with_font_file(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::new();
        };
        match std::fs::read(path) {
            Ok(bytes) => match FontArc::try_from_vec(bytes) {
                Ok(font) => Self { font: Some(font) },
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "invalid label font, using the bundled one");
                    Self::new()
                }
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read label font, using the bundled one");
                Self::new()
            }
        }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    pub fn draw_contour(&self, canvas: &mut RgbImage, points: &[Point<i32>], color: Rgb<u8>) {
        if points.len() < 2 {
            return;
        }
        for (i, p) in points.iter().enumerate() {
            let q = &points[(i + 1) % points.len()];
            draw_line_segment_mut(
                canvas,
                (p.x as f32, p.y as f32),
                (q.x as f32, q.y as f32),
                color,
            );
        }
    }

    /// Two pixel wide rectangle
    pub fn draw_box(&self, canvas: &mut RgbImage, bbox: &BoundingBox, color: Rgb<u8>) {
        let outer = Rect::at(bbox.x as i32, bbox.y as i32).of_size(bbox.width.max(1), bbox.height.max(1));
        draw_hollow_rect_mut(canvas, outer, color);
        if bbox.width > 2 && bbox.height > 2 {
            let inner = Rect::at(bbox.x as i32 + 1, bbox.y as i32 + 1)
                .of_size(bbox.width - 2, bbox.height - 2);
            draw_hollow_rect_mut(canvas, inner, color);
        }
    }

    pub fn draw_label(
        &self,
        canvas: &mut RgbImage,
        text: &str,
        position: (i32, i32),
        font_scale: f32,
        color: Rgb<u8>,
    ) {
        if let Some(font) = &self.font {
            let scale = PxScale::from(BASE_TEXT_PX * font_scale);
            draw_text_mut(canvas, color, position.0, position.1, scale, font, text);
        }
    }

    /// Banner with the frame total in the top left corner
    pub fn draw_total(&self, canvas: &mut RgbImage, total: u32, font_scale: f32) {
        let text = format!("Total Pills: {}", total);
        self.draw_label(canvas, &text, (20, 20), 1.7 * font_scale, TOTAL_COLOR);
    }
}

impl Default for Annotator {
    fn default() -> Self {
        Self::new()
    }
}
