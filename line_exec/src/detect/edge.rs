//! Threshold edge detector for the three channel grayscale sensor

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, info};
use serde::Deserialize;

use super::{ConfigError, DetectError, Detector, Polarity};
use crate::eqpt::RawFrame;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters for the [`EdgeDetector`].
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct EdgeParams {
    /// Reading separating the line from the floor.
    ///
    /// Units: ADC counts
    pub threshold: u16,

    /// `Light` negates the output direction.
    pub polarity: Polarity,
}

/// Finds the line's edge by comparing the left, centre and right grayscale readings against a
/// threshold.
#[derive(Debug, Clone)]
pub struct EdgeDetector {
    params: EdgeParams,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for EdgeParams {
    fn default() -> Self {
        Self {
            threshold: 600,
            polarity: Polarity::Dark,
        }
    }
}

impl EdgeDetector {
    pub fn new(params: EdgeParams) -> Result<Self, ConfigError> {
        if params.threshold == 0 {
            return Err(ConfigError::ZeroThreshold);
        }

        info!(
            "Edge detector initialised with threshold {} and polarity {:?}",
            params.threshold, params.polarity
        );

        Ok(Self { params })
    }

    /// Compute the direction from the (left, centre, right) readings.
    ///
    /// Exactly three readings are required.
    pub fn detect_values(&self, values: &[u16]) -> Result<f64, DetectError> {
        let (l, c, r) = match *values {
            [l, c, r] => (l, c, r),
            _ => {
                return Err(DetectError::InvalidInput(format!(
                    "expected 3 grayscale readings, found {}",
                    values.len()
                )))
            }
        };
        let t = self.params.threshold;

        // Centre is non-zero whenever it's at or above the (non-zero) threshold, and left plus
        // right is non-zero whenever both are above it.
        let (lf, cf, rf) = (l as f64, c as f64, r as f64);
        let mut value = if l < t && c >= t {
            (cf - lf) / cf
        } else if r < t && c >= t {
            (rf - cf) / cf
        } else if l > t && r > t && c < t {
            (rf - lf) / ((rf + lf) / 2.0)
        } else {
            0.0
        };

        if self.params.polarity == Polarity::Light {
            value = -value;
        }

        let value = util::maths::clamp_abs(value, 1.0);

        debug!("Sensor values: {:?}, detected edge: {:.4}", values, value);

        Ok(value)
    }
}

impl Detector for EdgeDetector {
    fn detect(&mut self, frame: &RawFrame) -> Result<f64, DetectError> {
        match frame {
            RawFrame::Grayscale(values) => self.detect_values(values),
            RawFrame::Image(_) => Err(DetectError::InvalidInput(String::from(
                "edge detector requires grayscale readings, got an image",
            ))),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
