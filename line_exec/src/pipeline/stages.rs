//! Stage loops of the pipeline
//!
//! Each stage runs in its own thread, at its own period, and only talks to its neighbours through
//! a [`Bus`].

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{error, info, trace, warn};

use super::{PipelineError, Shutdown};
use crate::{
    bus::Bus,
    detect::Detector,
    eqpt::{ActuatorSink, RawFrame, SensorSource},
    steer_ctrl::SteerCtrl,
};
use util::module::State;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Where and how often the interpret stage saves detector debug images.
#[derive(Debug, Clone)]
pub struct DebugImageConfig {
    pub dir: PathBuf,

    /// Save one image every this many interpret cycles.
    pub every_n_cycles: u64,
}

/// Owns the actuator for the control stage and stops it however the stage ends.
struct StopGuard<A: ActuatorSink> {
    sink: A,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<A: ActuatorSink> Drop for StopGuard<A> {
    fn drop(&mut self) {
        match self.sink.stop() {
            Ok(()) => info!("[control] Actuator stopped"),
            Err(e) => error!("[control] Could not stop the actuator: {}", e),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Run `cycle` every `period` until shutdown is requested or the cycle fails.
///
/// Returns the number of completed cycles.
fn run_stage<F>(
    name: &str,
    period: Duration,
    shutdown: &Shutdown,
    mut cycle: F,
) -> Result<u64, PipelineError>
where
    F: FnMut(u64) -> Result<(), PipelineError>,
{
    let mut num_cycles = 0u64;

    info!("[{}] Stage started with period {:?}", name, period);

    while !shutdown.is_requested() {
        let cycle_start = Instant::now();

        cycle(num_cycles)?;
        num_cycles += 1;

        if shutdown.is_requested() {
            break;
        }

        let cycle_dur = cycle_start.elapsed();
        match period.checked_sub(cycle_dur) {
            Some(d) => thread::sleep(d),
            None => trace!(
                "[{}] Cycle {} overran by {:.06} s",
                name,
                num_cycles,
                cycle_dur.as_secs_f64() - period.as_secs_f64()
            ),
        }
    }

    info!("[{}] Stage exiting after {} cycles", name, num_cycles);

    Ok(num_cycles)
}

/// Acquire frames and publish them on the raw frame bus.
pub(super) fn sense<S>(
    mut sensor: S,
    raw_bus: Bus<Arc<RawFrame>>,
    period: Duration,
    shutdown: Shutdown,
) -> Result<u64, PipelineError>
where
    S: SensorSource,
{
    run_stage("sense", period, &shutdown, |n| {
        match sensor.read() {
            Ok(Some(frame)) => {
                trace!("[sense] Cycle {}: {:?}", n, frame);
                raw_bus.write(Arc::new(frame))
            }
            Ok(None) => trace!("[sense] Cycle {}: no data", n),
            Err(e) => warn!("[sense] Cycle {}: acquisition failed: {}", n, e),
        }

        Ok(())
    })
}

/// Run the detector on the latest frame and publish the steering direction.
pub(super) fn interpret<D>(
    mut detector: D,
    raw_bus: Bus<Arc<RawFrame>>,
    direction_bus: Bus<f64>,
    period: Duration,
    shutdown: Shutdown,
    debug_images: Option<DebugImageConfig>,
) -> Result<u64, PipelineError>
where
    D: Detector,
{
    run_stage("interpret", period, &shutdown, |n| {
        let frame = match raw_bus.read() {
            Some(f) => f,
            None => return Ok(()),
        };

        match detector.detect(&frame) {
            Ok(direction) => {
                trace!("[interpret] Cycle {}: direction {:.4}", n, direction);
                direction_bus.write(direction)
            }
            Err(e) => {
                warn!("[interpret] Cycle {}: skipping {:?}: {}", n, frame, e);
                return Ok(());
            }
        }

        if let Some(ref cfg) = debug_images {
            if n % cfg.every_n_cycles.max(1) == 0 {
                if let Some(img) = detector.debug_image() {
                    let path = cfg.dir.join(format!("detect_{:08}.png", n));
                    if let Err(e) = img.save(&path) {
                        warn!("[interpret] Could not save debug image to {:?}: {}", path, e);
                    }
                }
            }
        }

        Ok(())
    })
}

/// Turn the latest steering direction into actuator commands.
///
/// The actuator is always stopped when this stage exits. Actuator errors end the stage.
pub(super) fn control<A>(
    mut steer_ctrl: SteerCtrl,
    actuator: A,
    direction_bus: Bus<f64>,
    period: Duration,
    shutdown: Shutdown,
) -> Result<u64, PipelineError>
where
    A: ActuatorSink,
{
    let mut guard = StopGuard { sink: actuator };

    run_stage("control", period, &shutdown, |n| {
        let direction = match direction_bus.read() {
            Some(d) => d,
            None => return Ok(()),
        };

        let (output, report) = match steer_ctrl.proc(&direction) {
            Ok(o) => o,
            Err(e) => {
                warn!("[control] Cycle {}: direction {} rejected: {}", n, direction, e);
                return Ok(());
            }
        };

        trace!("[control] Cycle {}: {:?}", n, report);

        guard
            .sink
            .drive(output.steer.angle_deg, output.speed.speed)
            .map_err(|e| {
                error!(
                    "[control] Cycle {}: drive({:.2}, {:.3}) failed: {}",
                    n, output.steer.angle_deg, output.speed.speed, e
                );
                PipelineError::Actuator(e)
            })
    })
}
