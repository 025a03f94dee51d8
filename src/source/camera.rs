use image::{DynamicImage, RgbImage};
use opencv::core::Mat;
use opencv::imgproc;
use opencv::prelude::*;
use opencv::videoio::{self, VideoCapture};

use super::{CaptureBackend, CaptureDevice};
use crate::error::SourceError;

/// Cameras opened through OpenCV's videoio module
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenCvBackend;

impl CaptureBackend for OpenCvBackend {
    fn open(&mut self, index: i32, width: u32, height: u32) -> Result<Box<dyn CaptureDevice>, SourceError> {
        let mut capture = VideoCapture::new(index, videoio::CAP_ANY)
            .map_err(|e| SourceError::Capture(e.to_string()))?;
        if !capture.is_opened().map_err(|e| SourceError::Capture(e.to_string()))? {
            return Err(SourceError::Capture(format!("device {} did not open", index)));
        }
        // Not every driver honours the requested size; frames are taken as delivered
        let _ = capture.set(videoio::CAP_PROP_FRAME_WIDTH, width as f64);
        let _ = capture.set(videoio::CAP_PROP_FRAME_HEIGHT, height as f64);
        let _ = capture.set(videoio::CAP_PROP_BUFFERSIZE, 1.0);
        Ok(Box::new(OpenCvDevice { capture }))
    }

    fn name(&self) -> &str {
        "opencv"
    }
}

struct OpenCvDevice {
    capture: VideoCapture,
}

impl CaptureDevice for OpenCvDevice {
    fn read_frame(&mut self) -> Result<DynamicImage, SourceError> {
        let mut bgr = Mat::default();
        let grabbed = self
            .capture
            .read(&mut bgr)
            .map_err(|e| SourceError::Capture(e.to_string()))?;
        if !grabbed || bgr.empty() {
            return Err(SourceError::Capture("no frame returned".into()));
        }

        let mut rgb = Mat::default();
        imgproc::cvt_color_def(&bgr, &mut rgb, imgproc::COLOR_BGR2RGB)
            .map_err(|e| SourceError::Capture(e.to_string()))?;

        let width = rgb.cols() as u32;
        let height = rgb.rows() as u32;
        let data = rgb
            .data_bytes()
            .map_err(|e| SourceError::Capture(e.to_string()))?
            .to_vec();
        let image = RgbImage::from_vec(width, height, data)
            .ok_or_else(|| SourceError::Capture("frame buffer size mismatch".into()))?;
        Ok(DynamicImage::ImageRgb8(image))
    }

    fn release(&mut self) {
        let _ = self.capture.release();
    }
}
