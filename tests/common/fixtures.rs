use image::{DynamicImage, ImageBuffer, Rgb, RgbImage};
use pillcounter::detection::BoxPredictor;
use pillcounter::source::{CaptureBackend, CaptureDevice};
use pillcounter::{
    BoundingBox, CountResult, Detection, DetectionError, DetectionParameters, Detector, Frame, Mode,
    Region, SourceError,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

pub const BACKGROUND: Rgb<u8> = Rgb([20, 20, 20]);
pub const PILL: Rgb<u8> = Rgb([230, 230, 230]);

/// Draws bright filled rectangles `(x, y, w, h)` on a dark background.
pub fn pill_image(width: u32, height: u32, pills: &[(u32, u32, u32, u32)]) -> RgbImage {
    ImageBuffer::from_fn(width, height, |px, py| {
        let inside = pills
            .iter()
            .any(|&(x, y, w, h)| px >= x && px < x + w && py >= y && py < y + h);
        if inside { PILL } else { BACKGROUND }
    })
}

/// Three single pills, one clump of two and a speck of noise.
/// The classical detector should count 5.
pub fn tray_image() -> RgbImage {
    pill_image(
        480,
        320,
        &[
            (40, 40, 60, 40),
            (180, 40, 60, 40),
            (320, 40, 60, 40),
            (40, 200, 120, 40),
            (300, 220, 10, 10),
        ],
    )
}

/// Saves an image to a temporary PNG file.
/// The file will be automatically cleaned up when dropped.
pub fn write_temp_image(img: &RgbImage) -> NamedTempFile {
    let file = tempfile::Builder::new()
        .suffix(".png")
        .tempfile()
        .expect("Failed to create temp image file");
    img.save_with_format(file.path(), image::ImageFormat::Png)
        .expect("Failed to save test image");
    file
}

/// A temp file with a `.png` suffix that is not an image
pub fn write_garbage_file() -> NamedTempFile {
    let file = tempfile::Builder::new()
        .suffix(".png")
        .tempfile()
        .expect("Failed to create temp file");
    std::fs::write(file.path(), b"definitely not a png").expect("Failed to write temp file");
    file
}

pub fn blank_frame(width: u32, height: u32) -> Frame {
    Frame::new(DynamicImage::ImageRgb8(ImageBuffer::from_pixel(width, height, BACKGROUND)))
}

/// Camera stand-in. Devices open only at the listed indices; the shared
/// flag is true while a device is open.
#[derive(Clone, Default)]
pub struct MockBackend {
    pub available: Vec<i32>,
    pub attempts: Arc<Mutex<Vec<i32>>>,
    pub open: Arc<AtomicBool>,
    /// While set, every read from an open device fails
    pub fail_reads: Arc<AtomicBool>,
    pub frame_size: (u32, u32),
}

impl MockBackend {
    pub fn with_devices(available: &[i32]) -> Self {
        Self {
            available: available.to_vec(),
            frame_size: (64, 48),
            ..Default::default()
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> Vec<i32> {
        self.attempts.lock().unwrap().clone()
    }
}

impl CaptureBackend for MockBackend {
    fn open(&mut self, index: i32, _width: u32, _height: u32) -> Result<Box<dyn CaptureDevice>, SourceError> {
        self.attempts.lock().unwrap().push(index);
        if !self.available.contains(&index) {
            return Err(SourceError::Capture(format!("no device at {}", index)));
        }
        self.open.store(true, Ordering::SeqCst);
        Ok(Box::new(MockDevice {
            open: self.open.clone(),
            fail_reads: self.fail_reads.clone(),
            size: self.frame_size,
        }))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Delivers dark frames with the top-left pixel marked [`MARKER`]
pub struct MockDevice {
    open: Arc<AtomicBool>,
    fail_reads: Arc<AtomicBool>,
    size: (u32, u32),
}

pub const MARKER: Rgb<u8> = Rgb([255, 0, 255]);

impl CaptureDevice for MockDevice {
    fn read_frame(&mut self) -> Result<DynamicImage, SourceError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(SourceError::Capture("camera stalled".into()));
        }
        let mut frame = ImageBuffer::from_pixel(self.size.0, self.size.1, BACKGROUND);
        frame.put_pixel(0, 0, MARKER);
        Ok(DynamicImage::ImageRgb8(frame))
    }

    fn release(&mut self) {
        self.open.store(false, Ordering::SeqCst);
    }
}

/// What a [`ScriptedDetector`] saw on each call
#[derive(Debug, Clone)]
pub struct DetectCall {
    pub device_open: bool,
    pub params_version: u64,
    pub confidence_threshold: f32,
    pub frame_size: (u32, u32),
}

/// Detector returning a fixed sequence of raw counts (the last one repeats)
/// and recording every call.
pub struct ScriptedDetector {
    counts: Mutex<VecDeque<u32>>,
    last: Mutex<u32>,
    device: Option<Arc<AtomicBool>>,
    pub calls: Arc<Mutex<Vec<DetectCall>>>,
}

impl ScriptedDetector {
    pub fn new(counts: &[u32]) -> Self {
        Self {
            counts: Mutex::new(counts.iter().copied().collect()),
            last: Mutex::new(0),
            device: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Record whether the mock camera was open during each call
    pub fn watching(mut self, backend: &MockBackend) -> Self {
        self.device = Some(backend.open.clone());
        self
    }
}

impl Detector for ScriptedDetector {
    fn detect(&self, frame: &Frame, params: &DetectionParameters) -> Result<Detection, DetectionError> {
        let count = match self.counts.lock().unwrap().pop_front() {
            Some(count) => {
                *self.last.lock().unwrap() = count;
                count
            }
            None => *self.last.lock().unwrap(),
        };
        self.calls.lock().unwrap().push(DetectCall {
            device_open: self
                .device
                .as_ref()
                .is_some_and(|open| open.load(Ordering::SeqCst)),
            params_version: params.version,
            confidence_threshold: params.confidence_threshold,
            frame_size: (frame.width(), frame.height()),
        });
        Ok(Detection {
            regions: Vec::new(),
            annotated: frame.clone(),
            raw_count: count,
            stages: Vec::new(),
        })
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Detector that fails its first `failures` calls, then reports `count`
pub struct FailingDetector {
    failures: Mutex<u32>,
    count: u32,
}

impl FailingDetector {
    pub fn new(failures: u32, count: u32) -> Self {
        Self {
            failures: Mutex::new(failures),
            count,
        }
    }
}

impl Detector for FailingDetector {
    fn detect(&self, frame: &Frame, _params: &DetectionParameters) -> Result<Detection, DetectionError> {
        let mut failures = self.failures.lock().unwrap();
        if *failures > 0 {
            *failures -= 1;
            return Err(DetectionError::Inference("model returned garbage".into()));
        }
        Ok(Detection {
            regions: Vec::new(),
            annotated: frame.clone(),
            raw_count: self.count,
            stages: Vec::new(),
        })
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// Ten boxes with confidences 0.95, 0.85, ... 0.05
pub const FAKE_CONFIDENCES: [f32; 10] = [0.95, 0.85, 0.75, 0.65, 0.55, 0.45, 0.35, 0.25, 0.15, 0.05];

/// Predictor that ignores the image and returns [`FAKE_CONFIDENCES`] boxes,
/// without applying the confidence floor itself.
pub struct FakePredictor;

impl BoxPredictor for FakePredictor {
    fn predict(&self, _image: &DynamicImage, _confidence_floor: f32) -> Result<Vec<Region>, DetectionError> {
        Ok(FAKE_CONFIDENCES
            .iter()
            .enumerate()
            .map(|(i, &conf)| {
                let bbox = BoundingBox {
                    x: 10 + 40 * i as u32,
                    y: 30,
                    width: 30,
                    height: 20,
                };
                Region::from_box(bbox, i % 2, if i % 2 == 0 { "capsule" } else { "tablet" }, conf)
            })
            .collect())
    }
}

/// A result as the worker would publish it
pub fn make_result(generation: u64, display_count: u32) -> CountResult {
    let frame = blank_frame(32, 24);
    CountResult {
        annotated: frame.clone(),
        original: frame,
        display_count,
        raw_count: display_count,
        regions: Vec::new(),
        stages: Vec::new(),
        mode: Mode::Live,
        generation,
        static_index: None,
        source_path: None,
        parameters_version: 0,
    }
}
