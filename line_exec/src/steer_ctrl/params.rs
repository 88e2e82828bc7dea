//! Parameters structure for SteerCtrl

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::Deserialize;

use super::SteerCtrlError;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Fraction of `max_speed` used as the start speed when none is configured.
const DEFAULT_START_SPEED_FRACTION: f64 = 0.25;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for steering control.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Params {
    /// Gain applied to the steering direction before it is mapped onto an angle.
    pub scaling_factor: f64,

    /// Maximum steering angle either side of centre.
    ///
    /// Units: degrees
    pub max_steering_angle_deg: f64,

    /// Number of accepted steering angles kept in the history.
    pub history_len: usize,

    /// Largest change in steering angle allowed in one cycle.
    ///
    /// Units: degrees
    pub max_angle_step_deg: f64,

    /// Speed the robot starts at, and the floor of the speed ramp.
    ///
    /// A quarter of `max_speed` if not given.
    pub start_speed: Option<f64>,

    /// Top speed reached on straights.
    pub max_speed: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        let max_speed = 10.0;

        Self {
            scaling_factor: 2.0,
            max_steering_angle_deg: 30.0,
            history_len: 30,
            max_angle_step_deg: 2.0,
            start_speed: None,
            max_speed,
        }
    }
}

impl Params {
    /// Check the parameters describe a usable controller.
    pub fn validate(&self) -> Result<(), SteerCtrlError> {
        let invalid = |msg: String| Err(SteerCtrlError::InvalidParams(msg));

        if self.history_len == 0 {
            return invalid(String::from("history_len must be at least 1"));
        }
        if !self.scaling_factor.is_finite() {
            return invalid(format!(
                "scaling_factor must be finite, found {}",
                self.scaling_factor
            ));
        }
        if !(self.max_steering_angle_deg > 0.0) || !self.max_steering_angle_deg.is_finite() {
            return invalid(format!(
                "max_steering_angle_deg must be positive, found {}",
                self.max_steering_angle_deg
            ));
        }
        if !(self.max_angle_step_deg > 0.0) || !self.max_angle_step_deg.is_finite() {
            return invalid(format!(
                "max_angle_step_deg must be positive, found {}",
                self.max_angle_step_deg
            ));
        }
        if !(self.max_speed > 0.0) || !self.max_speed.is_finite() {
            return invalid(format!(
                "max_speed must be positive, found {}",
                self.max_speed
            ));
        }
        let start_speed = self.start_speed();
        if !(start_speed >= 0.0 && start_speed <= self.max_speed) {
            return invalid(format!(
                "start_speed must be between 0 and max_speed ({}), found {}",
                self.max_speed, start_speed
            ));
        }

        Ok(())
    }

    /// The configured start speed, or a quarter of `max_speed`.
    pub fn start_speed(&self) -> f64 {
        self.start_speed
            .unwrap_or(DEFAULT_START_SPEED_FRACTION * self.max_speed)
    }

    /// Speed increase per non-sharp cycle, giving a ten cycle ramp from start to max speed.
    pub fn speed_step(&self) -> f64 {
        (self.max_speed - self.start_speed()) / 10.0
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_start_speed_follows_max_speed() {
        let p: Params = util::params::from_str("max_speed = 20.0").unwrap();
        assert_eq!(p.start_speed(), 5.0);
        assert!(p.validate().is_ok());

        // Slower than the default start speed, still valid
        let p: Params = util::params::from_str("max_speed = 2.0").unwrap();
        assert_eq!(p.start_speed(), 0.5);
        assert!(p.validate().is_ok());

        assert_eq!(Params::default().start_speed(), 2.5);
    }

    #[test]
    fn test_explicit_start_speed() {
        let p: Params = util::params::from_str(
            r#"
            max_speed = 20.0
            start_speed = 3.0
            "#,
        )
        .unwrap();

        assert_eq!(p.start_speed(), 3.0);
        assert_eq!(p.speed_step(), 1.7);
    }
}
