//! # Line follower executable parameters
//!
//! This module provides the parameters of the `line_exec` executable, loaded from
//! `params/line_exec.toml`.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Deserialize;

use crate::{
    detect::{ContourParams, EdgeParams},
    eqpt::{servo::ServoParams, sim::SimLineParams},
    pipeline::PipelineParams,
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct LineExecParams {
    /// Which sensor feeds the pipeline
    pub sensor: SensorKind,

    /// Which actuator the control stage drives
    pub actuator: ActuatorKind,

    #[serde(default)]
    pub camera: CameraParams,

    #[serde(default)]
    pub sim_line: SimLineParams,

    #[serde(default)]
    pub edge: EdgeParams,

    #[serde(default)]
    pub contour: ContourParams,

    #[serde(default)]
    pub pipeline: PipelineParams,

    #[serde(default)]
    pub debug_images: DebugImageParams,

    #[serde(default)]
    pub servo: ServoParams,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CameraParams {
    /// V4L device path
    pub device: String,

    pub width: u32,
    pub height: u32,

    /// Units: frames per second
    pub fps: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DebugImageParams {
    /// Save detector debug images into the session's debug directory
    pub enabled: bool,

    /// Save one image every this many interpret cycles
    pub every_n_cycles: u64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    /// Simulated grayscale triplet, detected with the edge detector
    GrayscaleSim,

    /// Simulated camera, detected with the contour detector
    CameraSim,

    /// V4L camera, detected with the contour detector
    Camera,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActuatorKind {
    /// Command logging actuator
    Sim,

    /// Servo board on the robot
    Pca9685,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for CameraParams {
    fn default() -> Self {
        Self {
            device: String::from("/dev/video0"),
            width: 640,
            height: 480,
            fps: 30,
        }
    }
}

impl Default for DebugImageParams {
    fn default() -> Self {
        Self {
            enabled: false,
            every_n_cycles: 20,
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::detect::Polarity;

    #[test]
    fn test_minimal_params() {
        let p: LineExecParams = util::params::from_str(
            r#"
            sensor = "grayscale_sim"
            actuator = "sim"
            "#,
        )
        .unwrap();

        assert_eq!(p.sensor, SensorKind::GrayscaleSim);
        assert_eq!(p.actuator, ActuatorKind::Sim);
        assert_eq!(p.edge.threshold, 600);
        assert_eq!(p.camera.device, "/dev/video0");
        assert!(!p.debug_images.enabled);
    }

    #[test]
    fn test_nested_params() {
        let p: LineExecParams = util::params::from_str(
            r#"
            sensor = "camera_sim"
            actuator = "pca9685"

            [contour]
            threshold = 100
            polarity = 1

            [pipeline]
            control_period_s = 0.02

            [servo]
            steer_channel = 3
            "#,
        )
        .unwrap();

        assert_eq!(p.contour.threshold, 100);
        assert_eq!(p.contour.polarity, Polarity::Light);
        assert_eq!(p.contour.min_contour_area, 300.0);
        assert_eq!(p.pipeline.control_period_s, 0.02);
        assert_eq!(p.pipeline.sense_period_s, 0.05);
        assert_eq!(p.servo.steer_channel, 3);
        assert_eq!(p.servo.i2c_address, 0x40);
    }

    #[test]
    fn test_invalid_polarity_rejected() {
        let r: Result<LineExecParams, _> = util::params::from_str(
            r#"
            sensor = "camera"
            actuator = "sim"

            [edge]
            polarity = 2
            "#,
        );

        assert!(r.is_err());
    }
}
