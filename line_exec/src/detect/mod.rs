//! # Line detection
//!
//! Detectors reduce a raw sensor frame to a single steering direction in `[-1, 1]`. Positive
//! directions mean the line is to the left of the robot, negative to the right, and `0.0` means
//! the robot is on the line or no line can be seen.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod contour;
mod edge;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

pub use contour::*;
pub use edge::*;

use image::RgbImage;
use serde::Deserialize;

use crate::eqpt::RawFrame;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Something which can find the line in a raw frame.
pub trait Detector {
    /// Find the steering direction towards the line.
    ///
    /// The returned value is always within `[-1, 1]`.
    fn detect(&mut self, frame: &RawFrame) -> Result<f64, DetectError>;

    /// Diagnostic image from the last call to `detect`, if the detector produces one.
    fn debug_image(&self) -> Option<&RgbImage> {
        None
    }
}

impl<D: Detector + ?Sized> Detector for Box<D> {
    fn detect(&mut self, frame: &RawFrame) -> Result<f64, DetectError> {
        (**self).detect(frame)
    }

    fn debug_image(&self) -> Option<&RgbImage> {
        (**self).debug_image()
    }
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Which side of the threshold the line lies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "u8")]
pub enum Polarity {
    /// Line reads below the threshold (dark line on a light floor). Configured as `0`.
    Dark,

    /// Line reads above the threshold (light line on a dark floor). Configured as `1`.
    Light,
}

/// Errors which can occur while detecting the line.
#[derive(Debug, thiserror::Error)]
pub enum DetectError {
    #[error("Invalid input frame: {0}")]
    InvalidInput(String),

    #[error("Image processing failed: {0}")]
    Perception(String),
}

/// Errors in detector configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Polarity must be 0 or 1, found {0}")]
    InvalidPolarity(u8),

    #[error("Threshold must be greater than zero")]
    ZeroThreshold,

    #[error("Minimum contour area must be finite and non-negative, found {0}")]
    InvalidMinArea(f64),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl std::convert::TryFrom<u8> for Polarity {
    type Error = ConfigError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Polarity::Dark),
            1 => Ok(Polarity::Light),
            v => Err(ConfigError::InvalidPolarity(v)),
        }
    }
}

impl Default for Polarity {
    fn default() -> Self {
        Polarity::Dark
    }
}
