//! # Maneuvers
//!
//! Timed open-loop moves built on any [`ActuatorSink`]. Each move steers, drives for the given
//! duration and then stops the actuator. Compound maneuvers are sequences of these moves and leave
//! the steering centred.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::thread;
use std::time::Duration;

use log::{debug, info};

use crate::eqpt::{ActuatorError, ActuatorSink};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Steering angle used by the compound maneuvers.
///
/// Units: degrees
pub const DIR_MAX_DEG: f64 = 30.0;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Durations of the three legs of a compound maneuver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Legs {
    pub first: Duration,
    pub second: Duration,
    pub third: Duration,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Legs {
    pub fn parallel_park() -> Self {
        Self {
            first: Duration::from_secs_f64(1.0),
            second: Duration::from_secs_f64(1.0),
            third: Duration::from_secs_f64(0.6),
        }
    }

    pub fn k_turn() -> Self {
        Self {
            first: Duration::from_secs_f64(1.0),
            second: Duration::from_secs_f64(1.0),
            third: Duration::from_secs_f64(1.0),
        }
    }

    /// Scale every leg by `factor`, used by the teleop duration setting.
    pub fn scaled(self, factor: f64) -> Self {
        let factor = factor.max(0.0);
        Self {
            first: self.first.mul_f64(factor),
            second: self.second.mul_f64(factor),
            third: self.third.mul_f64(factor),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Steer to `steering_deg`, drive at `speed` for `duration` and stop.
///
/// Negative speeds drive backwards.
pub fn drive<A>(
    sink: &mut A,
    speed: f64,
    duration: Duration,
    steering_deg: f64,
) -> Result<(), ActuatorError>
where
    A: ActuatorSink + ?Sized,
{
    sink.drive(steering_deg, speed)?;
    thread::sleep(duration);
    sink.stop()
}

pub fn forward_straight<A>(
    sink: &mut A,
    speed: f64,
    duration: Duration,
) -> Result<(), ActuatorError>
where
    A: ActuatorSink + ?Sized,
{
    debug!("forward_straight(speed={}, duration={:?})", speed, duration);
    drive(sink, speed.abs(), duration, 0.0)?;
    debug!("forward_straight finished");
    Ok(())
}

pub fn backward_straight<A>(
    sink: &mut A,
    speed: f64,
    duration: Duration,
) -> Result<(), ActuatorError>
where
    A: ActuatorSink + ?Sized,
{
    debug!("backward_straight(speed={}, duration={:?})", speed, duration);
    drive(sink, -speed.abs(), duration, 0.0)?;
    debug!("backward_straight finished");
    Ok(())
}

pub fn forward_turn<A>(
    sink: &mut A,
    steering_deg: f64,
    speed: f64,
    duration: Duration,
) -> Result<(), ActuatorError>
where
    A: ActuatorSink + ?Sized,
{
    debug!(
        "forward_turn(steer={}, speed={}, duration={:?})",
        steering_deg, speed, duration
    );
    drive(sink, speed.abs(), duration, steering_deg)?;
    debug!("forward_turn finished");
    Ok(())
}

pub fn backward_turn<A>(
    sink: &mut A,
    steering_deg: f64,
    speed: f64,
    duration: Duration,
) -> Result<(), ActuatorError>
where
    A: ActuatorSink + ?Sized,
{
    debug!(
        "backward_turn(steer={}, speed={}, duration={:?})",
        steering_deg, speed, duration
    );
    drive(sink, -speed.abs(), duration, steering_deg)?;
    debug!("backward_turn finished");
    Ok(())
}

/// Reverse into a space on the right, then straighten up.
pub fn parallel_park_right<A>(sink: &mut A, speed: f64, legs: Legs) -> Result<(), ActuatorError>
where
    A: ActuatorSink + ?Sized,
{
    info!("Maneuver: parallel_park_right");
    backward_turn(sink, DIR_MAX_DEG, speed, legs.first)?;
    backward_turn(sink, -DIR_MAX_DEG, speed, legs.second)?;
    forward_straight(sink, speed, legs.third)?;
    sink.set_steering_angle(0.0)
}

/// Reverse into a space on the left, then straighten up.
pub fn parallel_park_left<A>(sink: &mut A, speed: f64, legs: Legs) -> Result<(), ActuatorError>
where
    A: ActuatorSink + ?Sized,
{
    info!("Maneuver: parallel_park_left");
    backward_turn(sink, -DIR_MAX_DEG, speed, legs.first)?;
    backward_turn(sink, DIR_MAX_DEG, speed, legs.second)?;
    forward_straight(sink, speed, legs.third)?;
    sink.set_steering_angle(0.0)
}

/// Three point turn to the left.
pub fn k_turn_left<A>(sink: &mut A, speed: f64, legs: Legs) -> Result<(), ActuatorError>
where
    A: ActuatorSink + ?Sized,
{
    info!("Maneuver: k_turn_left");
    forward_turn(sink, -DIR_MAX_DEG, speed, legs.first)?;
    backward_turn(sink, DIR_MAX_DEG, speed, legs.second)?;
    forward_turn(sink, -DIR_MAX_DEG, speed, legs.third)?;
    sink.set_steering_angle(0.0)
}

/// Three point turn to the right.
pub fn k_turn_right<A>(sink: &mut A, speed: f64, legs: Legs) -> Result<(), ActuatorError>
where
    A: ActuatorSink + ?Sized,
{
    info!("Maneuver: k_turn_right");
    forward_turn(sink, DIR_MAX_DEG, speed, legs.first)?;
    backward_turn(sink, -DIR_MAX_DEG, speed, legs.second)?;
    forward_turn(sink, DIR_MAX_DEG, speed, legs.third)?;
    sink.set_steering_angle(0.0)
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::eqpt::sim::{ActuatorCmd, SimActuator};

    fn quick() -> Legs {
        Legs::k_turn().scaled(0.001)
    }

    #[test]
    fn test_straight_moves() {
        let mut act = SimActuator::new();
        let log = act.log();

        forward_straight(&mut act, -40.0, Duration::from_millis(1)).unwrap();
        backward_straight(&mut act, 40.0, Duration::from_millis(1)).unwrap();

        assert_eq!(
            log.commands(),
            vec![
                ActuatorCmd::Drive {
                    angle_deg: 0.0,
                    speed: 40.0
                },
                ActuatorCmd::Stop,
                ActuatorCmd::Drive {
                    angle_deg: 0.0,
                    speed: -40.0
                },
                ActuatorCmd::Stop,
            ]
        );
    }

    #[test]
    fn test_k_turn_left() {
        let mut act = SimActuator::new();
        let log = act.log();

        k_turn_left(&mut act, 35.0, quick()).unwrap();

        let cmds = log.commands();
        let drives: Vec<_> = cmds
            .iter()
            .filter_map(|c| match c {
                ActuatorCmd::Drive { angle_deg, speed } => Some((*angle_deg, *speed)),
                _ => None,
            })
            .collect();

        assert_eq!(
            drives,
            vec![(-DIR_MAX_DEG, 35.0), (DIR_MAX_DEG, -35.0), (-DIR_MAX_DEG, 35.0)]
        );
        assert_eq!(cmds.iter().filter(|c| **c == ActuatorCmd::Stop).count(), 3);
        assert_eq!(cmds.last(), Some(&ActuatorCmd::Steer(0.0)));
    }

    #[test]
    fn test_parallel_park_mirrored() {
        let mut left = SimActuator::new();
        let mut right = SimActuator::new();
        let (left_log, right_log) = (left.log(), right.log());

        parallel_park_left(&mut left, 35.0, quick()).unwrap();
        parallel_park_right(&mut right, 35.0, quick()).unwrap();

        let mirrored: Vec<_> = left_log
            .commands()
            .into_iter()
            .map(|c| match c {
                ActuatorCmd::Drive { angle_deg, speed } => ActuatorCmd::Drive {
                    angle_deg: -angle_deg,
                    speed,
                },
                other => other,
            })
            .collect();

        assert_eq!(mirrored, right_log.commands());
    }

    #[test]
    fn test_maneuver_fault_aborts() {
        let mut act = SimActuator::with_fault_after(1);
        let log = act.log();

        assert!(k_turn_right(&mut act, 35.0, quick()).is_err());

        // Only the first leg ran
        assert_eq!(
            log.commands(),
            vec![
                ActuatorCmd::Drive {
                    angle_deg: DIR_MAX_DEG,
                    speed: 35.0
                },
                ActuatorCmd::Stop
            ]
        );
    }

    #[test]
    fn test_legs_scaled() {
        let legs = Legs::parallel_park().scaled(2.0);
        assert!((legs.third.as_secs_f64() - 1.2).abs() < 1e-6);
        assert_eq!(Legs::k_turn().scaled(-1.0).first, Duration::ZERO);
    }
}
