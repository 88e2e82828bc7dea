//! # Equipment interfaces
//!
//! Boundary between the control pipeline and the robot's hardware. Sensors are read through
//! [`SensorSource`] and actuators commanded through [`ActuatorSink`], so the pipeline never
//! depends on a particular driver.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Simulated sensors and actuators for running away from the robot.
pub mod sim;

/// Servo board actuator.
pub mod servo;

/// V4L camera sensor source.
#[cfg(feature = "cam")]
pub mod cam;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use image::{DynamicImage, GenericImageView};
use std::fmt;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// A single raw reading from a line-position sensor.
#[derive(Clone)]
pub enum RawFrame {
    /// Grayscale ADC counts, expected to be (left, centre, right).
    Grayscale(Vec<u16>),

    /// A camera frame.
    Image(DynamicImage),
}

/// Errors raised by sensor sources.
#[derive(Debug, thiserror::Error)]
pub enum SensorError {
    #[error("Sensor acquisition failed: {0}")]
    Acquisition(String),

    #[error("Could not decode the sensor data: {0}")]
    Decode(String),
}

/// Errors raised by actuator sinks.
#[derive(Debug, thiserror::Error)]
pub enum ActuatorError {
    #[error("Could not communicate with the actuator driver: {0}")]
    Driver(String),

    #[error("Demand of {value} is outside the actuator range [{min}, {max}]")]
    OutOfRange { value: f64, min: f64, max: f64 },
}

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A source of raw sensor frames.
pub trait SensorSource {
    /// Acquire the next frame.
    ///
    /// Must return promptly. `Ok(None)` means no data is available this cycle, which is not an
    /// error.
    fn read(&mut self) -> Result<Option<RawFrame>, SensorError>;
}

/// Something that can steer and drive the robot.
pub trait ActuatorSink {
    /// Set the steering servo angle in degrees.
    fn set_steering_angle(&mut self, angle_deg: f64) -> Result<(), ActuatorError>;

    /// Set the drive speed. Negative speeds drive backwards.
    fn set_forward_speed(&mut self, speed: f64) -> Result<(), ActuatorError>;

    /// Apply a steering angle and speed together.
    fn drive(&mut self, angle_deg: f64, speed: f64) -> Result<(), ActuatorError> {
        self.set_steering_angle(angle_deg)?;
        self.set_forward_speed(speed)
    }

    /// Bring the robot to a stop.
    fn stop(&mut self) -> Result<(), ActuatorError>;
}

impl<S: SensorSource + ?Sized> SensorSource for Box<S> {
    fn read(&mut self) -> Result<Option<RawFrame>, SensorError> {
        (**self).read()
    }
}

impl<A: ActuatorSink + ?Sized> ActuatorSink for Box<A> {
    fn set_steering_angle(&mut self, angle_deg: f64) -> Result<(), ActuatorError> {
        (**self).set_steering_angle(angle_deg)
    }

    fn set_forward_speed(&mut self, speed: f64) -> Result<(), ActuatorError> {
        (**self).set_forward_speed(speed)
    }

    fn drive(&mut self, angle_deg: f64, speed: f64) -> Result<(), ActuatorError> {
        (**self).drive(angle_deg, speed)
    }

    fn stop(&mut self) -> Result<(), ActuatorError> {
        (**self).stop()
    }
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl fmt::Debug for RawFrame {
    /// Short summary of the frame, images are not dumped.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawFrame::Grayscale(v) => write!(f, "Grayscale({:?})", v),
            RawFrame::Image(img) => {
                let (w, h) = img.dimensions();
                write!(f, "Image({}x{} {:?})", w, h, img.color())
            }
        }
    }
}
