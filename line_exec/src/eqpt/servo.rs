//! # Servo actuator
//!
//! Provides an [`ActuatorSink`] on top of any PWM servo driver board implementing [`ServoDriver`].
//! The steering servo is positional, the drive motor takes a throttle duty cycle plus a direction
//! line.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use embedded_hal::blocking::i2c::{Write, WriteRead};
use log::{debug, info};
use pwm_pca9685::{Channel, Pca9685};
use serde::Deserialize;

use super::{ActuatorError, ActuatorSink};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Number of PWM ticks in one PCA9685 period.
const PCA9685_MAX_PWM: u16 = 4096;

/// Internal oscillator frequency of the PCA9685.
const PCA9685_OSC_HZ: f64 = 25_000_000.0;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Trait to provide a unified API for accessing servo driver boards.
pub trait ServoDriver {
    /// The type that the underlying driver uses for channel identification
    type Channel: Copy + std::fmt::Debug;

    /// Get the channel with the given index, or `None` if the board has no such channel.
    fn channel(index: u8) -> Option<Self::Channel>;

    /// Set the duty cycle of a channel.
    ///
    /// ## Arguments
    /// - `channel` - The channel to set the duty cycle for
    /// - `duty_cycle` - The duty cycle to set. Must be a value between 0.0 and 1.0. Values outside
    ///   this range will be rejected.
    fn set_duty_cycle(&mut self, channel: Self::Channel, duty_cycle: f64)
        -> Result<(), ServoError>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Parameters of the servo actuator.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServoParams {
    /// I2C address of the driver board
    pub i2c_address: u8,

    /// PWM frequency of the board
    ///
    /// Units: Hertz
    pub pwm_frequency_hz: f64,

    /// Channel index of the steering servo
    pub steer_channel: u8,

    /// Channel index of the drive motor throttle
    pub throttle_channel: u8,

    /// Channel index of the drive motor direction line
    pub direction_channel: u8,

    /// Pulse width which centres the steering servo
    ///
    /// Units: milliseconds
    pub steer_centre_pulse_ms: f64,

    /// Pulse width change between centre and full lock
    ///
    /// Units: milliseconds
    pub steer_pulse_range_ms: f64,

    /// Steering angle at full lock
    ///
    /// Units: degrees
    pub max_steering_angle_deg: f64,

    /// Speed demand which gives full throttle
    pub max_speed: f64,
}

/// Actuator driving a steering servo and drive motor through a [`ServoDriver`].
pub struct ServoActuator<D: ServoDriver> {
    driver: D,
    params: ServoParams,
    steer: D::Channel,
    throttle: D::Channel,
    direction: D::Channel,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum ServoError {
    #[error("An I2C error occured")]
    I2c,

    #[error("Duty cycle must be between 0.0 and 1.0")]
    InvalidDutyCycle,

    #[error("Channel {0} does not exist on the driver board")]
    InvalidChannel(u8),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl From<ServoError> for ActuatorError {
    fn from(e: ServoError) -> Self {
        ActuatorError::Driver(e.to_string())
    }
}

impl Default for ServoParams {
    fn default() -> Self {
        Self {
            i2c_address: 0x40,
            pwm_frequency_hz: 50.0,
            steer_channel: 0,
            throttle_channel: 1,
            direction_channel: 2,
            steer_centre_pulse_ms: 1.5,
            steer_pulse_range_ms: 0.5,
            max_steering_angle_deg: 30.0,
            max_speed: 100.0,
        }
    }
}

impl<D: ServoDriver> ServoActuator<D> {
    /// Create a new servo actuator on an initialised driver board.
    pub fn new(driver: D, params: ServoParams) -> Result<Self, ServoError> {
        let channel = |i| D::channel(i).ok_or(ServoError::InvalidChannel(i));

        Ok(Self {
            steer: channel(params.steer_channel)?,
            throttle: channel(params.throttle_channel)?,
            direction: channel(params.direction_channel)?,
            driver,
            params,
        })
    }

    /// Duty cycle giving the pulse width for the given steering angle.
    fn steer_duty_cycle(&self, angle_deg: f64) -> f64 {
        let pulse_ms = util::maths::lin_map(
            (
                -self.params.max_steering_angle_deg,
                self.params.max_steering_angle_deg,
            ),
            (
                self.params.steer_centre_pulse_ms - self.params.steer_pulse_range_ms,
                self.params.steer_centre_pulse_ms + self.params.steer_pulse_range_ms,
            ),
            angle_deg,
        );

        pulse_ms * self.params.pwm_frequency_hz / 1000.0
    }
}

impl<D: ServoDriver> ActuatorSink for ServoActuator<D> {
    fn set_steering_angle(&mut self, angle_deg: f64) -> Result<(), ActuatorError> {
        let max = self.params.max_steering_angle_deg;
        if !(angle_deg.abs() <= max) {
            return Err(ActuatorError::OutOfRange {
                value: angle_deg,
                min: -max,
                max,
            });
        }

        let duty = self.steer_duty_cycle(angle_deg);
        debug!("Steer {:.2} deg -> duty {:.4} on {:?}", angle_deg, duty, self.steer);
        self.driver.set_duty_cycle(self.steer, duty)?;

        Ok(())
    }

    fn set_forward_speed(&mut self, speed: f64) -> Result<(), ActuatorError> {
        let max = self.params.max_speed;
        if !(speed.abs() <= max) {
            return Err(ActuatorError::OutOfRange {
                value: speed,
                min: -max,
                max,
            });
        }

        let reverse = if speed < 0.0 { 1.0 } else { 0.0 };
        let duty = speed.abs() / max;
        debug!("Speed {:.2} -> duty {:.4} (reverse: {})", speed, duty, reverse > 0.0);

        self.driver.set_duty_cycle(self.direction, reverse)?;
        self.driver.set_duty_cycle(self.throttle, duty)?;

        Ok(())
    }

    fn stop(&mut self) -> Result<(), ActuatorError> {
        info!("Stopping drive motor");
        self.driver.set_duty_cycle(self.throttle, 0.0)?;

        Ok(())
    }
}

impl<I2C, E> ServoDriver for Pca9685<I2C>
where
    I2C: Write<Error = E> + WriteRead<Error = E>,
{
    type Channel = Channel;

    fn channel(index: u8) -> Option<Self::Channel> {
        Some(match index {
            0 => Channel::C0,
            1 => Channel::C1,
            2 => Channel::C2,
            3 => Channel::C3,
            4 => Channel::C4,
            5 => Channel::C5,
            6 => Channel::C6,
            7 => Channel::C7,
            8 => Channel::C8,
            9 => Channel::C9,
            10 => Channel::C10,
            11 => Channel::C11,
            12 => Channel::C12,
            13 => Channel::C13,
            14 => Channel::C14,
            15 => Channel::C15,
            _ => return None,
        })
    }

    fn set_duty_cycle(&mut self, channel: Self::Channel, duty_cycle: f64) -> Result<(), ServoError> {
        // If the duty cycle is out of range return an error
        if !(0.0..=1.0).contains(&duty_cycle) {
            return Err(ServoError::InvalidDutyCycle);
        }

        // The off counter is 12 bits wide, so full on saturates one tick short
        let off = ((duty_cycle * PCA9685_MAX_PWM as f64) as u16).min(PCA9685_MAX_PWM - 1);

        self.set_channel_on(channel, 0)
            .and_then(|_| self.set_channel_off(channel, off))
            .map_err(|e| match e {
                pwm_pca9685::Error::I2C(_) => ServoError::I2c,
                pwm_pca9685::Error::InvalidInputData => ServoError::InvalidDutyCycle,
            })
    }
}

/// Prescale value giving the requested PWM frequency on a PCA9685.
pub fn pca9685_prescale(frequency_hz: f64) -> u8 {
    let prescale = (PCA9685_OSC_HZ / (PCA9685_MAX_PWM as f64 * frequency_hz)).round() - 1.0;
    util::maths::clamp(prescale, 3.0, 255.0) as u8
}

/// Open the PCA9685 board on the Raspberry Pi's I2C bus.
#[cfg(all(target_arch = "arm", target_os = "linux"))]
pub fn open_pca9685(
    params: ServoParams,
) -> Result<ServoActuator<Pca9685<rppal::i2c::I2c>>, ActuatorError> {
    let driver_err = |e: &dyn std::fmt::Debug| ActuatorError::Driver(format!("{:?}", e));

    let i2c = rppal::i2c::I2c::new().map_err(|e| driver_err(&e))?;
    let mut pwm = Pca9685::new(i2c, params.i2c_address).map_err(|e| driver_err(&e))?;
    pwm.set_prescale(pca9685_prescale(params.pwm_frequency_hz))
        .map_err(|e| driver_err(&e))?;
    pwm.enable().map_err(|e| driver_err(&e))?;

    info!(
        "PCA9685 opened at 0x{:02x}, {} Hz",
        params.i2c_address, params.pwm_frequency_hz
    );

    Ok(ServoActuator::new(pwm, params)?)
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    /// Driver which remembers the last duty cycle on each of its 4 channels.
    #[derive(Default)]
    struct MockDriver {
        duty: [f64; 4],
    }

    impl ServoDriver for MockDriver {
        type Channel = usize;

        fn channel(index: u8) -> Option<usize> {
            if index < 4 {
                Some(index as usize)
            } else {
                None
            }
        }

        fn set_duty_cycle(&mut self, channel: usize, duty_cycle: f64) -> Result<(), ServoError> {
            self.duty[channel] = duty_cycle;
            Ok(())
        }
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_servo_actuator_mapping() {
        let mut act = ServoActuator::new(MockDriver::default(), ServoParams::default()).unwrap();

        // Centre is 1.5 ms of a 20 ms period
        act.set_steering_angle(0.0).unwrap();
        assert!(approx(act.driver.duty[0], 0.075));

        // Full lock is 2.0 ms
        act.set_steering_angle(30.0).unwrap();
        assert!(approx(act.driver.duty[0], 0.1));

        act.drive(-15.0, -50.0).unwrap();
        assert!(approx(act.driver.duty[0], 0.0625));
        assert!(approx(act.driver.duty[1], 0.5));
        assert!(approx(act.driver.duty[2], 1.0));

        act.stop().unwrap();
        assert_eq!(act.driver.duty[1], 0.0);
    }

    #[test]
    fn test_servo_actuator_limits() {
        let mut act = ServoActuator::new(MockDriver::default(), ServoParams::default()).unwrap();

        assert!(matches!(
            act.set_steering_angle(31.0),
            Err(ActuatorError::OutOfRange { .. })
        ));
        assert!(matches!(
            act.set_forward_speed(f64::NAN),
            Err(ActuatorError::OutOfRange { .. })
        ));

        let params = ServoParams {
            direction_channel: 9,
            ..ServoParams::default()
        };
        assert!(matches!(
            ServoActuator::new(MockDriver::default(), params),
            Err(ServoError::InvalidChannel(9))
        ));
    }

    #[test]
    fn test_pca9685_prescale() {
        assert_eq!(pca9685_prescale(50.0), 121);
        assert_eq!(pca9685_prescale(1526.0), 3);
    }
}
