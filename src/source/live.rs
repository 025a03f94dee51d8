use tracing::{debug, info};

use super::{CaptureBackend, CaptureDevice};
use crate::config::CameraConfig;
use crate::error::SourceError;
use crate::models::Frame;

/// Camera-backed frame source
pub struct LiveSource {
    device: Option<Box<dyn CaptureDevice>>,
    index: i32,
}

impl LiveSource {
    /// Open the first device that responds, in [`CameraConfig::probe_order`]
    pub fn open(backend: &mut dyn CaptureBackend, camera: &CameraConfig) -> Result<Self, SourceError> {
        let order = camera.probe_order();
        for &index in &order {
            match backend.open(index, camera.width, camera.height) {
                Ok(device) => {
                    info!(
                        index,
                        backend = backend.name(),
                        width = camera.width,
                        height = camera.height,
                        "opened capture device"
                    );
                    return Ok(Self {
                        device: Some(device),
                        index,
                    });
                }
                Err(e) => debug!(index, error = %e, "capture device did not open"),
            }
        }
        Err(SourceError::DeviceUnavailable { tried: order })
    }

    pub fn device_index(&self) -> i32 {
        self.index
    }

    pub fn is_open(&self) -> bool {
        self.device.is_some()
    }

    pub fn next_frame(&mut self) -> Result<Frame, SourceError> {
        let device = self.device.as_mut().ok_or(SourceError::NotOpen)?;
        let image = device.read_frame()?;
        Ok(Frame::new(image))
    }

    /// Release the device. Safe to call any number of times.
    pub fn close(&mut self) {
        if let Some(mut device) = self.device.take() {
            device.release();
            info!(index = self.index, "closed capture device");
        }
    }
}

impl Drop for LiveSource {
    fn drop(&mut self) {
        self.close();
    }
}
