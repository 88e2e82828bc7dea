//! # Line follower library.
//!
//! This library allows other crates in the workspace (such as `teleop`) to access items defined
//! inside the line follower crate.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Latest-value buses connecting the pipeline stages
pub mod bus;

/// Line detectors - turn a raw frame into a relative steering direction
pub mod detect;

/// Equipment - sensor sources and actuator sinks, real and simulated
pub mod eqpt;

/// Maneuvers - timed open-loop moves on an actuator
pub mod mnvr;

/// Executable parameters
pub mod params;

/// Sense / interpret / control pipeline
pub mod pipeline;

/// Steering control module - converts a steering direction into steering angle and speed commands
pub mod steer_ctrl;
