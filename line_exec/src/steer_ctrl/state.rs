//! Implementations for the SteerCtrl state structure

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{info, trace};
use std::collections::VecDeque;

// Internal
use super::{Params, SteerCtrlError};
use util::{maths::clamp, module::State};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Largest fraction of speed removed while turning, so the throttle is never fully zeroed.
const MAX_TURN_SLOWDOWN: f64 = 0.9;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Steering control module state
pub struct SteerCtrl {
    params: Params,

    /// Most recent accepted steering angles, newest at the back.
    ///
    /// Units: degrees
    history: VecDeque<f64>,

    /// Ramped speed before the turn severity is applied.
    last_speed: f64,

    /// Whether the current cycle had to rate limit the steering angle.
    sharp_turn: bool,
}

/// Steering angle demand for the actuator.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SteerCmd {
    /// Units: degrees
    pub angle_deg: f64,
}

/// Forward speed demand for the actuator.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SpeedCmd {
    pub speed: f64,
}

/// Output of SteerCtrl processing.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OutputData {
    pub steer: SteerCmd,
    pub speed: SpeedCmd,
}

/// Status report for SteerCtrl processing.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusReport {
    /// Steering angle requested by the direction before rate limiting
    pub target_angle_deg: f64,

    /// Steering angle accepted this cycle, before the actuator sign flip
    pub accepted_angle_deg: f64,

    /// The rate limiter clamped the angle this cycle
    pub sharp_turn: bool,

    /// Speed multiplier from the turn severity
    pub severity_factor: f64,

    /// Ramped speed carried into the next cycle
    pub last_speed: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl State for SteerCtrl {
    type InitData = Params;
    type InitError = SteerCtrlError;

    type InputData = f64;
    type OutputData = OutputData;
    type StatusReport = StatusReport;
    type ProcError = SteerCtrlError;

    /// Initialise the SteerCtrl module from its parameters.
    fn init(init_data: Self::InitData) -> Result<Self, Self::InitError> {
        init_data.validate()?;

        info!("SteerCtrl initialised with {:?}", init_data);

        Ok(Self {
            history: VecDeque::with_capacity(init_data.history_len),
            last_speed: init_data.start_speed(),
            sharp_turn: false,
            params: init_data,
        })
    }

    /// Perform one cycle of steering control for the given steering direction.
    fn proc(
        &mut self,
        input_data: &Self::InputData,
    ) -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError> {
        let direction = *input_data;
        if !direction.is_finite() {
            return Err(SteerCtrlError::NonFiniteDirection(direction));
        }

        // Sharp turns are only ever flagged for the current cycle
        self.sharp_turn = false;

        let max_angle = self.params.max_steering_angle_deg;
        let max_step = self.params.max_angle_step_deg;

        // ---- STEERING ----

        let target_angle_deg = clamp(
            direction * self.params.scaling_factor * max_angle,
            -max_angle,
            max_angle,
        );

        let mut accepted_angle_deg = target_angle_deg;
        if let Some(&prev) = self.history.back() {
            let diff = target_angle_deg - prev;
            if diff.abs() > max_step {
                self.sharp_turn = true;
                accepted_angle_deg = prev + max_step.copysign(diff);
            }
        }

        if self.history.len() == self.params.history_len {
            self.history.pop_front();
        }
        self.history.push_back(accepted_angle_deg);

        // ---- SPEED ----

        let severity_factor =
            1.0 - (direction * self.params.scaling_factor).abs().min(MAX_TURN_SLOWDOWN);

        let start_speed = self.params.start_speed();

        // A sharp cycle drops to the start speed without disturbing the ramp
        let speed = if self.sharp_turn {
            start_speed * severity_factor
        } else {
            let ramped = clamp(
                start_speed.max(self.last_speed + self.params.speed_step()),
                start_speed,
                self.params.max_speed,
            );
            self.last_speed = ramped;
            ramped * severity_factor
        };

        trace!(
            "Relative steering direction: {:.4}, steering angle: {:.2}, speed: {:.3}, sharp: {}",
            direction,
            accepted_angle_deg,
            speed,
            self.sharp_turn
        );

        let output = OutputData {
            // The steering servo's positive direction is opposite to the controller's
            steer: SteerCmd {
                angle_deg: -accepted_angle_deg,
            },
            speed: SpeedCmd { speed },
        };

        let report = StatusReport {
            target_angle_deg,
            accepted_angle_deg,
            sharp_turn: self.sharp_turn,
            severity_factor,
            last_speed: self.last_speed,
        };

        Ok((output, report))
    }
}

impl SteerCtrl {
    /// Run one control cycle, returning only the actuator commands.
    pub fn step(&mut self, direction: f64) -> Result<(SteerCmd, SpeedCmd), SteerCtrlError> {
        let (output, _) = self.proc(&direction)?;
        Ok((output.steer, output.speed))
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Accepted steering angles, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &f64> {
        self.history.iter()
    }

    pub fn last_speed(&self) -> f64 {
        self.last_speed
    }

    pub fn sharp_turn(&self) -> bool {
        self.sharp_turn
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn ctrl() -> SteerCtrl {
        SteerCtrl::init(Params::default()).unwrap()
    }

    #[test]
    fn test_first_cycle_accepts_target() {
        let mut c = ctrl();

        // Grayscale reading (400, 700, 650) with threshold 600
        let direction = (700.0 - 400.0) / 700.0;
        let (out, rpt) = c.proc(&direction).unwrap();

        assert!(approx(rpt.target_angle_deg, direction * 2.0 * 30.0));
        assert!((rpt.target_angle_deg - 25.714).abs() < 1e-3);
        assert!(!rpt.sharp_turn);
        assert!(approx(out.steer.angle_deg, -rpt.target_angle_deg));

        // First ramp step from start speed, scaled by the turn severity
        let severity = 1.0 - direction * 2.0;
        assert!(approx(rpt.severity_factor, severity));
        assert!(approx(rpt.last_speed, 3.25));
        assert!(approx(out.speed.speed, 3.25 * severity));
    }

    #[test]
    fn test_sharp_turn() {
        let mut c = ctrl();

        c.step(0.0).unwrap();

        // Target of 20 degrees from 0
        let direction = 20.0 / 60.0;
        let (out, rpt) = c.proc(&direction).unwrap();

        assert!(rpt.sharp_turn);
        assert!(c.sharp_turn());
        assert!(approx(rpt.target_angle_deg, 20.0));
        assert!(approx(rpt.accepted_angle_deg, 2.0));
        assert!(approx(out.steer.angle_deg, -2.0));
        assert!(approx(out.speed.speed, 2.5 * (1.0 - 2.0 / 3.0)));

        // The ramp level from the first cycle is kept
        assert!(approx(c.last_speed(), 3.25));

        // Small change on the next cycle clears the flag
        let (_, rpt) = c.proc(&(3.0 / 60.0)).unwrap();
        assert!(!rpt.sharp_turn);
        assert!(approx(rpt.accepted_angle_deg, 3.0));

        // Sharp turns are rate limited the other way too
        let (_, rpt) = c.proc(&-1.0).unwrap();
        assert!(rpt.sharp_turn);
        assert!(approx(rpt.accepted_angle_deg, 1.0));
    }

    #[test]
    fn test_sharp_turn_keeps_ramp() {
        let mut c = ctrl();

        for _ in 0..12 {
            c.step(0.0).unwrap();
        }
        assert!(approx(c.last_speed(), 10.0));

        // Rate limited cycle runs at the start speed but leaves the ramp at full speed
        let (_, speed) = c.step(20.0 / 60.0).unwrap();
        assert!(c.sharp_turn());
        assert!(approx(speed.speed, 2.5 * (1.0 - 2.0 / 3.0)));
        assert!(approx(c.last_speed(), 10.0));

        // Next cycle is within the step bound and goes straight back to full speed
        let direction = 3.0 / 60.0;
        let (steer, speed) = c.step(direction).unwrap();
        assert!(!c.sharp_turn());
        assert!(approx(steer.angle_deg, -3.0));
        assert!(approx(c.last_speed(), 10.0));
        assert!(approx(speed.speed, 10.0 * (1.0 - direction * 2.0)));
    }

    #[test]
    fn test_command_bounds() {
        let mut c = ctrl();

        // Deterministic pseudo random directions, some beyond [-1, 1]
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        let mut prev: Option<f64> = None;

        for _ in 0..5000 {
            seed = seed
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            let direction = ((seed >> 11) as f64 / (1u64 << 53) as f64) * 3.0 - 1.5;

            let (steer, speed) = c.step(direction).unwrap();

            assert!(steer.angle_deg.abs() <= 30.0);
            assert!(speed.speed >= 0.0 && speed.speed <= 10.0);
            if let Some(p) = prev {
                assert!((steer.angle_deg - p).abs() <= 2.0 + 1e-9);
            }
            prev = Some(steer.angle_deg);
        }
    }

    #[test]
    fn test_speed_ramp_monotonic() {
        let mut c = ctrl();
        let mut last = c.last_speed();

        for cycle in 0..30 {
            let (steer, speed) = c.step(0.0).unwrap();
            assert_eq!(steer.angle_deg, 0.0);
            assert!(c.last_speed() >= last);
            assert_eq!(speed.speed, c.last_speed());

            if cycle >= 9 {
                assert_eq!(c.last_speed(), 10.0);
            }
            last = c.last_speed();
        }
    }

    #[test]
    fn test_history_bounded() {
        let mut c = ctrl();

        for i in 0..100 {
            c.step((i as f64 * 0.1).sin()).unwrap();
        }

        assert_eq!(c.history().count(), 30);
    }

    #[test]
    fn test_non_finite_direction() {
        let mut c = ctrl();
        c.step(0.1).unwrap();

        assert!(matches!(
            c.step(f64::NAN),
            Err(SteerCtrlError::NonFiniteDirection(_))
        ));
        assert!(matches!(
            c.step(f64::INFINITY),
            Err(SteerCtrlError::NonFiniteDirection(_))
        ));
        assert_eq!(c.history().count(), 1);
    }

    #[test]
    fn test_invalid_params() {
        let bad = [
            Params {
                history_len: 0,
                ..Params::default()
            },
            Params {
                max_angle_step_deg: 0.0,
                ..Params::default()
            },
            Params {
                max_steering_angle_deg: -30.0,
                ..Params::default()
            },
            Params {
                start_speed: Some(11.0),
                ..Params::default()
            },
            Params {
                scaling_factor: f64::NAN,
                ..Params::default()
            },
        ];

        for p in bad.iter() {
            assert!(matches!(
                SteerCtrl::init(p.clone()),
                Err(SteerCtrlError::InvalidParams(_))
            ));
        }
    }
}
