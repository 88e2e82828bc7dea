//! Steering control module
//!
//! Converts the detected steering direction into a rate limited steering angle and a speed
//! demand. Speed ramps up while the steering changes stay within the per-cycle angle budget and
//! drops to the start speed for any cycle in which a sharp turn has to be rate limited.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod params;
mod state;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
pub use params::*;
pub use state::*;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible errors that can occur during SteerCtrl operation.
#[derive(Debug, thiserror::Error)]
pub enum SteerCtrlError {
    #[error("Invalid SteerCtrl parameters: {0}")]
    InvalidParams(String),

    #[error("Steering direction must be finite, found {0}")]
    NonFiniteDirection(f64),
}
