use image::{ColorType, DynamicImage};
use imageproc::point::Point;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// An immutable image buffer handed between the worker and the controller.
///
/// Cloning a frame only bumps a reference count; the pixels are never
/// modified once the frame exists.
#[derive(Debug, Clone)]
pub struct Frame {
    image: Arc<DynamicImage>,
}

impl Frame {
    pub fn new(image: DynamicImage) -> Self {
        Self {
            image: Arc::new(image),
        }
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn channels(&self) -> u8 {
        self.image.color().channel_count()
    }

    pub fn color_type(&self) -> ColorType {
        self.image.color()
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub fn is_portrait(&self) -> bool {
        self.height() > self.width()
    }

    /// Rotate a portrait frame 90° counter-clockwise so that processing always
    /// happens in landscape orientation. Landscape frames are returned as-is.
    pub fn oriented(self) -> Self {
        if self.is_portrait() {
            Frame::new(self.image.rotate270())
        } else {
            self
        }
    }
}

impl From<DynamicImage> for Frame {
    fn from(image: DynamicImage) -> Self {
        Frame::new(image)
    }
}

/// Axis-aligned bounding box in frame coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    /// Smallest box enclosing all points
    pub fn from_points(points: &[Point<i32>]) -> Option<Self> {
        let first = points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in points {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        let min_x = min_x.max(0) as u32;
        let min_y = min_y.max(0) as u32;
        Some(Self {
            x: min_x,
            y: min_y,
            width: (max_x.max(0) as u32).saturating_sub(min_x) + 1,
            height: (max_y.max(0) as u32).saturating_sub(min_y) + 1,
        })
    }

    pub fn area(&self) -> u32 {
        self.width * self.height
    }

    pub fn center(&self) -> (u32, u32) {
        (self.x + self.width / 2, self.y + self.height / 2)
    }

    /// Intersection over union of two boxes
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);
        if x2 <= x1 || y2 <= y1 {
            return 0.0;
        }
        let intersection = ((x2 - x1) * (y2 - y1)) as f32;
        let union = (self.area() + other.area()) as f32 - intersection;
        if union <= 0.0 {
            return 0.0;
        }
        intersection / union
    }
}

/// One detected candidate object
#[derive(Debug, Clone)]
pub struct Region {
    pub bbox: BoundingBox,
    /// Area in pixels (contour area for the classical detector, box area otherwise)
    pub area: f64,
    /// Outer contour, classical detector only
    pub contour: Vec<Point<i32>>,
    pub class_id: Option<usize>,
    pub label: Option<String>,
    /// Learned-model detector only
    pub confidence: Option<f32>,
    /// How many objects this region is believed to contain
    pub estimated_count: u32,
}

impl Region {
    pub fn from_box(bbox: BoundingBox, class_id: usize, label: impl Into<String>, confidence: f32) -> Self {
        Self {
            area: bbox.area() as f64,
            bbox,
            contour: Vec::new(),
            class_id: Some(class_id),
            label: Some(label.into()),
            confidence: Some(confidence),
            estimated_count: 1,
        }
    }
}

/// Operating mode of the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Stopped,
    Live,
    Static,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Mode::Stopped => "stopped",
            Mode::Live => "live",
            Mode::Static => "static",
        };
        f.write_str(name)
    }
}

/// One raw count observed at a point in time
#[derive(Debug, Clone, Copy)]
pub struct CountSample {
    pub timestamp: Instant,
    pub raw_count: u32,
}

/// Intermediate image produced by one step of the classical chain
#[derive(Debug, Clone)]
pub struct StageImage {
    pub name: String,
    pub frame: Frame,
}

/// Everything the presentation layer needs about one processed frame
#[derive(Debug, Clone)]
pub struct CountResult {
    pub annotated: Frame,
    pub original: Frame,
    pub display_count: u32,
    pub raw_count: u32,
    pub regions: Vec<Region>,
    pub stages: Vec<StageImage>,
    pub mode: Mode,
    /// Mode transition counter at the time this frame was processed
    pub generation: u64,
    pub static_index: Option<usize>,
    pub source_path: Option<PathBuf>,
    pub parameters_version: u64,
}
