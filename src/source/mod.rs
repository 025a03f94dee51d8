//! Where frames come from: a camera in live mode, image files in static mode.

mod files;
mod live;
#[cfg(feature = "camera")]
mod camera;

pub use files::StaticSource;
pub use live::LiveSource;
#[cfg(feature = "camera")]
pub use camera::OpenCvBackend;

use image::DynamicImage;

use crate::error::SourceError;

/// An open camera. Reads may block until the next frame arrives.
pub trait CaptureDevice: Send {
    fn read_frame(&mut self) -> Result<DynamicImage, SourceError>;

    /// Release the underlying device. Called at most once.
    fn release(&mut self);
}

/// Opens capture devices by index
pub trait CaptureBackend: Send {
    fn open(&mut self, index: i32, width: u32, height: u32) -> Result<Box<dyn CaptureDevice>, SourceError>;

    fn name(&self) -> &str {
        "unnamed"
    }
}

/// Backend for builds without camera support: no device ever opens
#[derive(Debug, Default, Clone, Copy)]
pub struct NullBackend;

impl CaptureBackend for NullBackend {
    fn open(&mut self, index: i32, _width: u32, _height: u32) -> Result<Box<dyn CaptureDevice>, SourceError> {
        Err(SourceError::Capture(format!(
            "device {} unavailable: built without the `camera` feature",
            index
        )))
    }

    fn name(&self) -> &str {
        "none"
    }
}

/// The camera backend compiled into this build
pub fn default_backend() -> Box<dyn CaptureBackend> {
    #[cfg(feature = "camera")]
    {
        Box::new(OpenCvBackend)
    }
    #[cfg(not(feature = "camera"))]
    {
        Box::new(NullBackend)
    }
}
