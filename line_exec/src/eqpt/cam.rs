//! # V4L camera sensor source
//!
//! Captures MJPG frames from a Video4Linux device and decodes them into [`RawFrame::Image`]s.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, info};
use rscam::{Camera, Config};

use super::{RawFrame, SensorError, SensorSource};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A started V4L camera.
pub struct V4lCamera {
    camera: Camera,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl V4lCamera {
    /// Open and start the camera at the given device path (e.g. `/dev/video0`).
    pub fn new(device: &str, width: u32, height: u32, fps: u32) -> Result<Self, SensorError> {
        let mut camera =
            Camera::new(device).map_err(|e| SensorError::Acquisition(e.to_string()))?;

        camera
            .start(&Config {
                interval: (1, fps),
                resolution: (width, height),
                format: b"MJPG",
                ..Default::default()
            })
            .map_err(|e| SensorError::Acquisition(e.to_string()))?;

        info!("Camera {} started ({}x{} @ {} fps)", device, width, height, fps);

        Ok(Self { camera })
    }
}

impl SensorSource for V4lCamera {
    fn read(&mut self) -> Result<Option<RawFrame>, SensorError> {
        // A failed capture is a missing frame, the next cycle will try again
        let frame = match self.camera.capture() {
            Ok(f) => f,
            Err(e) => {
                debug!("Camera capture failed: {}", e);
                return Ok(None);
            }
        };

        let image = image::load_from_memory_with_format(&frame, image::ImageFormat::Jpeg)
            .map_err(|e| SensorError::Decode(e.to_string()))?;

        Ok(Some(RawFrame::Image(image)))
    }
}
