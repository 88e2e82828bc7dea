//! # Simulated equipment
//!
//! Sensor sources which observe a virtual line drifting from side to side under the robot, and an
//! actuator which records the commands it is given. These allow the full pipeline to be run on a
//! development machine.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use image::{DynamicImage, Rgb, RgbImage};
use log::{debug, trace};
use serde::Deserialize;

use super::{ActuatorError, ActuatorSink, RawFrame, SensorError, SensorSource};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Maximum number of commands kept by a [`SimActuator`].
pub const ACTUATOR_HISTORY_CAPACITY: usize = 1024;

/// Grayscale sensor positions (left, centre, right) in units of sensor spacing.
const GRAYSCALE_POSITIONS: [f64; 3] = [-1.0, 0.0, 1.0];

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Virtual line seen by the simulated sensors.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct SimLineParams {
    /// Peak lateral offset of the line, in units of grayscale sensor spacing.
    pub amplitude: f64,

    /// Phase advance per frame.
    ///
    /// Units: radians
    pub phase_step_rad: f64,
}

/// Simulated three channel grayscale sensor.
pub struct SimGrayscale {
    line: SimLineParams,
    phase_rad: f64,

    /// Reading over bare floor
    floor_counts: f64,

    /// Reading directly over the line
    line_counts: f64,

    /// Width of the line's influence on a sensor, in units of sensor spacing
    line_width: f64,
}

/// Simulated camera looking down at the line.
pub struct SimCamera {
    line: SimLineParams,
    phase_rad: f64,
    width: u32,
    height: u32,
    band_half_width_px: u32,
}

/// A command recorded by a [`SimActuator`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActuatorCmd {
    Steer(f64),
    Speed(f64),
    Drive { angle_deg: f64, speed: f64 },
    Stop,
}

/// Shared view of the commands a [`SimActuator`] has received.
#[derive(Clone, Default)]
pub struct ActuatorLog {
    cmds: Arc<Mutex<VecDeque<ActuatorCmd>>>,
}

/// Simulated actuator, logs and records every command.
pub struct SimActuator {
    log: ActuatorLog,

    /// If set, `drive` fails once this many drive commands have been accepted.
    fault_after_drives: Option<usize>,
    num_drives: usize,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for SimLineParams {
    fn default() -> Self {
        Self {
            amplitude: 0.8,
            phase_step_rad: 0.05,
        }
    }
}

impl SimLineParams {
    /// Lateral offset of the line at the given phase.
    fn offset(&self, phase_rad: f64) -> f64 {
        self.amplitude * phase_rad.sin()
    }
}

impl SimGrayscale {
    pub fn new(line: SimLineParams) -> Self {
        Self {
            line,
            phase_rad: 0.0,
            floor_counts: 900.0,
            line_counts: 300.0,
            line_width: 0.6,
        }
    }

    fn reading(&self, sensor_pos: f64, line_offset: f64) -> u16 {
        let d = (sensor_pos - line_offset) / self.line_width;
        let counts =
            self.floor_counts - (self.floor_counts - self.line_counts) * (-d * d).exp();
        counts.round() as u16
    }
}

impl SensorSource for SimGrayscale {
    fn read(&mut self) -> Result<Option<RawFrame>, SensorError> {
        let offset = self.line.offset(self.phase_rad);
        self.phase_rad += self.line.phase_step_rad;

        let values: Vec<u16> = GRAYSCALE_POSITIONS
            .iter()
            .map(|p| self.reading(*p, offset))
            .collect();

        trace!("SimGrayscale readings: {:?} (line offset {:.3})", values, offset);

        Ok(Some(RawFrame::Grayscale(values)))
    }
}

impl SimCamera {
    pub fn new(line: SimLineParams, width: u32, height: u32) -> Self {
        Self {
            line,
            phase_rad: 0.0,
            width,
            height,
            band_half_width_px: (width / 32).max(3),
        }
    }

    /// Render a frame with a dark vertical band centred at `offset` quarter-widths from the centre.
    pub fn render(&self, offset: f64) -> RgbImage {
        let centre_px = self.width as f64 / 2.0 + offset * self.width as f64 / 4.0;
        let half = self.band_half_width_px as f64;

        RgbImage::from_fn(self.width, self.height, |x, _| {
            if (x as f64 - centre_px).abs() <= half {
                Rgb([30, 30, 30])
            } else {
                Rgb([210, 210, 200])
            }
        })
    }
}

impl SensorSource for SimCamera {
    fn read(&mut self) -> Result<Option<RawFrame>, SensorError> {
        let offset = self.line.offset(self.phase_rad);
        self.phase_rad += self.line.phase_step_rad;

        trace!("SimCamera frame with line offset {:.3}", offset);

        Ok(Some(RawFrame::Image(DynamicImage::ImageRgb8(
            self.render(offset),
        ))))
    }
}

impl ActuatorLog {
    /// Snapshot of the recorded commands, oldest first.
    pub fn commands(&self) -> Vec<ActuatorCmd> {
        self.lock().iter().copied().collect()
    }

    fn push(&self, cmd: ActuatorCmd) {
        let mut cmds = self.lock();
        if cmds.len() == ACTUATOR_HISTORY_CAPACITY {
            cmds.pop_front();
        }
        cmds.push_back(cmd);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<ActuatorCmd>> {
        self.cmds.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SimActuator {
    pub fn new() -> Self {
        Self {
            log: ActuatorLog::default(),
            fault_after_drives: None,
            num_drives: 0,
        }
    }

    /// Create an actuator whose driver fails after `num_drives` successful drive commands.
    pub fn with_fault_after(num_drives: usize) -> Self {
        Self {
            fault_after_drives: Some(num_drives),
            ..Self::new()
        }
    }

    /// Get a handle to the recorded commands.
    pub fn log(&self) -> ActuatorLog {
        self.log.clone()
    }
}

impl Default for SimActuator {
    fn default() -> Self {
        Self::new()
    }
}

impl ActuatorSink for SimActuator {
    fn set_steering_angle(&mut self, angle_deg: f64) -> Result<(), ActuatorError> {
        debug!("SimActuator steer {:.2} deg", angle_deg);
        self.log.push(ActuatorCmd::Steer(angle_deg));
        Ok(())
    }

    fn set_forward_speed(&mut self, speed: f64) -> Result<(), ActuatorError> {
        debug!("SimActuator speed {:.2}", speed);
        self.log.push(ActuatorCmd::Speed(speed));
        Ok(())
    }

    fn drive(&mut self, angle_deg: f64, speed: f64) -> Result<(), ActuatorError> {
        if let Some(limit) = self.fault_after_drives {
            if self.num_drives >= limit {
                return Err(ActuatorError::Driver(format!(
                    "simulated fault after {} drive commands",
                    limit
                )));
            }
        }

        self.num_drives += 1;
        debug!("SimActuator drive {:.2} deg at {:.2}", angle_deg, speed);
        self.log.push(ActuatorCmd::Drive { angle_deg, speed });
        Ok(())
    }

    fn stop(&mut self) -> Result<(), ActuatorError> {
        debug!("SimActuator stop");
        self.log.push(ActuatorCmd::Stop);
        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use image::GenericImageView;

    #[test]
    fn test_sim_grayscale_line_under_centre() {
        let mut sensor = SimGrayscale::new(SimLineParams::default());

        // First frame is at phase zero so the line sits under the centre sensor
        match sensor.read().unwrap() {
            Some(RawFrame::Grayscale(v)) => {
                assert_eq!(v.len(), 3);
                assert_eq!(v[0], v[2]);
                assert!(v[1] < v[0]);
                assert_eq!(v[1], 300);
            }
            other => panic!("Unexpected frame {:?}", other),
        }
    }

    #[test]
    fn test_sim_camera_frame_size() {
        let mut cam = SimCamera::new(SimLineParams::default(), 160, 120);

        match cam.read().unwrap() {
            Some(RawFrame::Image(img)) => {
                assert_eq!(img.dimensions(), (160, 120));
                // Band centred in the image on the first frame
                assert_eq!(img.to_rgb8().get_pixel(80, 100), &Rgb([30, 30, 30]));
                assert_eq!(img.to_rgb8().get_pixel(10, 100), &Rgb([210, 210, 200]));
            }
            other => panic!("Unexpected frame {:?}", other),
        }
    }

    #[test]
    fn test_sim_actuator_fault_and_log() {
        let mut act = SimActuator::with_fault_after(1);
        let log = act.log();

        act.drive(5.0, 2.5).unwrap();
        assert!(matches!(act.drive(5.0, 2.5), Err(ActuatorError::Driver(_))));
        act.stop().unwrap();

        assert_eq!(
            log.commands(),
            vec![
                ActuatorCmd::Drive {
                    angle_deg: 5.0,
                    speed: 2.5
                },
                ActuatorCmd::Stop
            ]
        );
    }
}
