//! # Sense / interpret / control pipeline
//!
//! Three independently paced stages joined by latest-value buses:
//!
//! ```text
//! SensorSource -> [raw frame bus] -> Detector -> [direction bus] -> SteerCtrl -> ActuatorSink
//! ```
//!
//! A stage that runs faster than the one upstream of it re-reads the same value, a slower stage
//! skips stale values. No stage ever waits on another.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod shutdown;
mod stages;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

pub use shutdown::Shutdown;
pub use stages::DebugImageConfig;

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{error, info};
use serde::Deserialize;

use crate::{
    bus::Bus,
    detect::Detector,
    eqpt::{ActuatorError, ActuatorSink, RawFrame, SensorSource},
    steer_ctrl::SteerCtrl,
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Stage periods of the pipeline.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineParams {
    /// Units: seconds
    pub sense_period_s: f64,

    /// Units: seconds
    pub interpret_period_s: f64,

    /// Units: seconds
    pub control_period_s: f64,
}

/// A fully assembled pipeline, ready to be spawned.
pub struct Pipeline {
    params: PipelineParams,
    sensor: Box<dyn SensorSource + Send>,
    detector: Box<dyn Detector + Send>,
    steer_ctrl: SteerCtrl,
    actuator: Box<dyn ActuatorSink + Send>,
    shutdown: Shutdown,
    debug_images: Option<DebugImageConfig>,
}

/// Handles to the running stage threads.
pub struct PipelineHandles {
    shutdown: Shutdown,
    sense: JoinHandle<Result<u64, PipelineError>>,
    interpret: JoinHandle<Result<u64, PipelineError>>,
    control: JoinHandle<Result<u64, PipelineError>>,
}

/// Number of cycles each stage completed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageCycles {
    pub sense: u64,
    pub interpret: u64,
    pub control: u64,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Stage period must be positive and finite, found {0} s")]
    InvalidPeriod(f64),

    #[error("Could not spawn the {0} stage: {1}")]
    Spawn(&'static str, std::io::Error),

    #[error("The {0} stage panicked")]
    StagePanicked(&'static str),

    #[error("Actuator fault in the control stage: {0}")]
    Actuator(ActuatorError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for PipelineParams {
    fn default() -> Self {
        Self {
            sense_period_s: 0.05,
            interpret_period_s: 0.05,
            control_period_s: 0.05,
        }
    }
}

impl PipelineParams {
    fn period(secs: f64) -> Result<Duration, PipelineError> {
        if secs.is_finite() && secs > 0.0 {
            Ok(Duration::from_secs_f64(secs))
        } else {
            Err(PipelineError::InvalidPeriod(secs))
        }
    }
}

impl Pipeline {
    pub fn new<S, D, A>(
        params: PipelineParams,
        sensor: S,
        detector: D,
        steer_ctrl: SteerCtrl,
        actuator: A,
        shutdown: Shutdown,
    ) -> Self
    where
        S: SensorSource + Send + 'static,
        D: Detector + Send + 'static,
        A: ActuatorSink + Send + 'static,
    {
        Self {
            params,
            sensor: Box::new(sensor),
            detector: Box::new(detector),
            steer_ctrl,
            actuator: Box::new(actuator),
            shutdown,
            debug_images: None,
        }
    }

    /// Save detector debug images while running.
    pub fn with_debug_images(mut self, config: DebugImageConfig) -> Self {
        self.debug_images = Some(config);
        self
    }

    /// Start the three stage threads.
    pub fn spawn(self) -> Result<PipelineHandles, PipelineError> {
        let sense_period = PipelineParams::period(self.params.sense_period_s)?;
        let interpret_period = PipelineParams::period(self.params.interpret_period_s)?;
        let control_period = PipelineParams::period(self.params.control_period_s)?;

        let Pipeline {
            sensor,
            detector,
            steer_ctrl,
            actuator,
            shutdown,
            debug_images,
            ..
        } = self;

        let raw_bus: Bus<Arc<RawFrame>> = Bus::new();
        let direction_bus: Bus<f64> = Bus::new();

        // Spawn the control stage first so that the actuator is owned by a thread which will
        // stop it, even if a later spawn fails.
        let control = {
            let bus = direction_bus.clone();
            let shutdown = shutdown.clone();
            spawn_stage("control", move || {
                stages::control(steer_ctrl, actuator, bus, control_period, shutdown)
            })
        };
        let control = request_shutdown_on_err(&shutdown, control)?;

        let interpret = {
            let raw_bus = raw_bus.clone();
            let shutdown = shutdown.clone();
            spawn_stage("interpret", move || {
                stages::interpret(
                    detector,
                    raw_bus,
                    direction_bus,
                    interpret_period,
                    shutdown,
                    debug_images,
                )
            })
        };
        let interpret = request_shutdown_on_err(&shutdown, interpret)?;

        let sense = {
            let shutdown = shutdown.clone();
            spawn_stage("sense", move || {
                stages::sense(sensor, raw_bus, sense_period, shutdown)
            })
        };
        let sense = request_shutdown_on_err(&shutdown, sense)?;

        info!("Pipeline running");

        Ok(PipelineHandles {
            shutdown,
            sense,
            interpret,
            control,
        })
    }
}

impl PipelineHandles {
    /// True once the control stage has exited, for example after an actuator fault.
    pub fn control_finished(&self) -> bool {
        self.control.is_finished()
    }

    /// Name of a stage which has exited, if any.
    ///
    /// Stages only exit on shutdown, on an error, or by panicking.
    pub fn finished_stage(&self) -> Option<&'static str> {
        [
            ("control", &self.control),
            ("interpret", &self.interpret),
            ("sense", &self.sense),
        ]
        .iter()
        .find(|(_, h)| h.is_finished())
        .map(|(name, _)| *name)
    }

    /// Block until shutdown is requested or a stage exits, checking every `period`.
    ///
    /// If a stage exits first shutdown is requested, so the remaining stages end and the actuator
    /// is stopped, and the stage's name is returned.
    pub fn monitor(&self, period: Duration) -> Option<&'static str> {
        while !self.shutdown.is_requested() {
            if let Some(stage) = self.finished_stage() {
                error!("The {} stage ended unexpectedly, shutting down", stage);
                self.shutdown.request();
                return Some(stage);
            }

            thread::sleep(period);
        }

        None
    }

    /// Request shutdown of all stages.
    pub fn shutdown(&self) {
        self.shutdown.request()
    }

    /// Wait for all stages to exit.
    ///
    /// Every stage is joined before returning. If several stages failed the control stage's
    /// error is returned first.
    pub fn join(self) -> Result<StageCycles, PipelineError> {
        let sense = join_stage("sense", self.sense);
        let interpret = join_stage("interpret", self.interpret);
        let control = join_stage("control", self.control);

        Ok(StageCycles {
            control: control?,
            interpret: interpret?,
            sense: sense?,
        })
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn spawn_stage<F>(
    name: &'static str,
    f: F,
) -> Result<JoinHandle<Result<u64, PipelineError>>, PipelineError>
where
    F: FnOnce() -> Result<u64, PipelineError> + Send + 'static,
{
    thread::Builder::new()
        .name(String::from(name))
        .spawn(f)
        .map_err(|e| PipelineError::Spawn(name, e))
}

/// Request shutdown if a stage could not be spawned so that the ones already running exit.
fn request_shutdown_on_err<T>(
    shutdown: &Shutdown,
    result: Result<T, PipelineError>,
) -> Result<T, PipelineError> {
    if result.is_err() {
        shutdown.request();
    }
    result
}

fn join_stage(
    name: &'static str,
    handle: JoinHandle<Result<u64, PipelineError>>,
) -> Result<u64, PipelineError> {
    match handle.join() {
        Ok(Ok(n)) => Ok(n),
        Ok(Err(e)) => {
            error!("The {} stage failed: {}", name, e);
            Err(e)
        }
        Err(_) => {
            error!("The {} stage panicked", name);
            Err(PipelineError::StagePanicked(name))
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        detect::{DetectError, EdgeDetector, EdgeParams},
        eqpt::{
            sim::{ActuatorCmd, SimActuator},
            SensorError,
        },
        steer_ctrl::Params,
    };
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Instant;
    use util::module::State;

    /// Sensor returning the same readings every cycle and counting its reads.
    struct FixedSensor {
        values: Option<Vec<u16>>,
        reads: Arc<AtomicU64>,
    }

    impl SensorSource for FixedSensor {
        fn read(&mut self) -> Result<Option<RawFrame>, SensorError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(self.values.clone().map(RawFrame::Grayscale))
        }
    }

    /// What a [`ScriptedDetector`] does once its good detections are used up.
    #[derive(Clone, Copy)]
    enum AfterGood {
        Perception,
        Panic,
    }

    /// Detector returning `direction` for the first `num_good` calls.
    struct ScriptedDetector {
        direction: f64,
        num_good: u64,
        after: AfterGood,
        calls: Arc<AtomicU64>,
    }

    impl Detector for ScriptedDetector {
        fn detect(&mut self, _frame: &RawFrame) -> Result<f64, DetectError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.num_good {
                return Ok(self.direction);
            }

            match self.after {
                AfterGood::Perception => Err(DetectError::Perception(String::from(
                    "simulated frame drop",
                ))),
                AfterGood::Panic => panic!("simulated detector crash"),
            }
        }
    }

    fn scripted_pipeline(
        after: AfterGood,
        actuator: SimActuator,
    ) -> (Pipeline, Arc<AtomicU64>, Shutdown) {
        let calls = Arc::new(AtomicU64::new(0));
        let shutdown = Shutdown::new();

        let p = Pipeline::new(
            fast_params(),
            FixedSensor {
                values: Some(vec![400, 700, 650]),
                reads: Arc::new(AtomicU64::new(0)),
            },
            ScriptedDetector {
                direction: 0.2,
                num_good: 3,
                after,
                calls: calls.clone(),
            },
            SteerCtrl::init(Params::default()).unwrap(),
            actuator,
            shutdown.clone(),
        );

        (p, calls, shutdown)
    }

    fn wait_for(what: &str, cond: impl Fn() -> bool) {
        let start = Instant::now();
        while !cond() {
            assert!(start.elapsed() < Duration::from_secs(5), "timed out waiting for {}", what);
            thread::sleep(Duration::from_millis(1));
        }
    }

    fn fast_params() -> PipelineParams {
        PipelineParams {
            sense_period_s: 0.002,
            interpret_period_s: 0.002,
            control_period_s: 0.002,
        }
    }

    fn pipeline(
        values: Option<Vec<u16>>,
        actuator: SimActuator,
    ) -> (Pipeline, Arc<AtomicU64>, Shutdown) {
        let reads = Arc::new(AtomicU64::new(0));
        let shutdown = Shutdown::new();

        let p = Pipeline::new(
            fast_params(),
            FixedSensor {
                values,
                reads: reads.clone(),
            },
            EdgeDetector::new(EdgeParams::default()).unwrap(),
            SteerCtrl::init(Params::default()).unwrap(),
            actuator,
            shutdown.clone(),
        );

        (p, reads, shutdown)
    }

    fn drives(cmds: &[ActuatorCmd]) -> Vec<(f64, f64)> {
        cmds.iter()
            .filter_map(|c| match c {
                ActuatorCmd::Drive { angle_deg, speed } => Some((*angle_deg, *speed)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_pipeline_end_to_end() {
        let actuator = SimActuator::new();
        let log = actuator.log();
        let (p, _, shutdown) = pipeline(Some(vec![400, 700, 650]), actuator);

        let handles = p.spawn().unwrap();
        thread::sleep(Duration::from_millis(150));
        shutdown.request();
        let cycles = handles.join().unwrap();

        assert!(cycles.sense > 0 && cycles.interpret > 0 && cycles.control > 0);

        let cmds = log.commands();
        let drv = drives(&cmds);
        assert!(!drv.is_empty());

        // Direction 300/700 gives a 25.71 degree target, accepted on the first cycle
        assert!((drv[0].0 + 25.714).abs() < 1e-3, "first drive {:?}", drv[0]);
        assert!(drv.iter().all(|(a, _)| a.abs() <= 30.0));

        // Stopped exactly once, and nothing after the stop
        assert_eq!(cmds.last(), Some(&ActuatorCmd::Stop));
        assert_eq!(cmds.iter().filter(|c| **c == ActuatorCmd::Stop).count(), 1);
    }

    #[test]
    fn test_pipeline_shutdown_before_start() {
        let actuator = SimActuator::new();
        let log = actuator.log();
        let (p, reads, shutdown) = pipeline(Some(vec![400, 700, 650]), actuator);

        shutdown.request();
        let cycles = p.spawn().unwrap().join().unwrap();

        assert_eq!(cycles, StageCycles::default());
        assert_eq!(reads.load(Ordering::SeqCst), 0);
        assert_eq!(log.commands(), vec![ActuatorCmd::Stop]);
    }

    #[test]
    fn test_pipeline_skips_bad_and_missing_frames() {
        // Two readings is invalid input for the edge detector
        let actuator = SimActuator::new();
        let log = actuator.log();
        let (p, reads, shutdown) = pipeline(Some(vec![400, 700]), actuator);

        let handles = p.spawn().unwrap();
        thread::sleep(Duration::from_millis(50));
        shutdown.request();
        handles.join().unwrap();

        assert!(reads.load(Ordering::SeqCst) > 0);
        assert_eq!(log.commands(), vec![ActuatorCmd::Stop]);

        // No data at all
        let actuator = SimActuator::new();
        let log = actuator.log();
        let (p, _, shutdown) = pipeline(None, actuator);

        let handles = p.spawn().unwrap();
        thread::sleep(Duration::from_millis(50));
        shutdown.request();
        handles.join().unwrap();

        assert_eq!(log.commands(), vec![ActuatorCmd::Stop]);
    }

    #[test]
    fn test_pipeline_actuator_fault() {
        let actuator = SimActuator::with_fault_after(3);
        let log = actuator.log();
        let (p, reads, shutdown) = pipeline(Some(vec![400, 700, 650]), actuator);

        let handles = p.spawn().unwrap();

        // Wait for the control stage to fail
        wait_for("the control stage to fail", || handles.control_finished());
        assert_eq!(handles.finished_stage(), Some("control"));

        // The actuator was stopped after the accepted drives
        let cmds = log.commands();
        assert_eq!(drives(&cmds).len(), 3);
        assert_eq!(cmds.last(), Some(&ActuatorCmd::Stop));

        // Sensing carries on independently
        let reads_at_fault = reads.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(30));
        assert!(reads.load(Ordering::SeqCst) > reads_at_fault);

        shutdown.request();
        assert!(matches!(handles.join(), Err(PipelineError::Actuator(_))));
        assert_eq!(log.commands().len(), 4);
    }

    #[test]
    fn test_pipeline_keeps_last_direction_on_perception_error() {
        let actuator = SimActuator::new();
        let log = actuator.log();
        let (p, calls, shutdown) = scripted_pipeline(AfterGood::Perception, actuator);

        let handles = p.spawn().unwrap();

        // Well into the failing detections
        wait_for("failed detections", || calls.load(Ordering::SeqCst) >= 20);
        let num_drives = drives(&log.commands()).len();
        thread::sleep(Duration::from_millis(30));

        shutdown.request();
        handles.join().unwrap();

        // Control carried on driving towards the last good direction of 0.2, a 12 degree target
        let drv = drives(&log.commands());
        assert!(drv.len() > num_drives);
        assert!(drv.iter().all(|(a, _)| (a + 12.0).abs() < 1e-9), "{:?}", drv);
        assert_eq!(log.commands().last(), Some(&ActuatorCmd::Stop));
    }

    #[test]
    fn test_pipeline_monitor_stops_on_stage_panic() {
        let actuator = SimActuator::new();
        let log = actuator.log();
        let (p, _, shutdown) = scripted_pipeline(AfterGood::Panic, actuator);

        let handles = p.spawn().unwrap();

        assert_eq!(handles.monitor(Duration::from_millis(1)), Some("interpret"));
        assert!(shutdown.is_requested());

        assert!(matches!(
            handles.join(),
            Err(PipelineError::StagePanicked("interpret"))
        ));

        // Control did not keep driving on the stale direction
        let cmds = log.commands();
        assert_eq!(cmds.last(), Some(&ActuatorCmd::Stop));
        assert_eq!(cmds.iter().filter(|c| **c == ActuatorCmd::Stop).count(), 1);
    }

    #[test]
    fn test_pipeline_monitor_returns_on_shutdown() {
        let (p, _, shutdown) = pipeline(Some(vec![400, 700, 650]), SimActuator::new());
        let handles = p.spawn().unwrap();

        let requester = {
            let shutdown = shutdown.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                shutdown.request();
            })
        };

        assert_eq!(handles.monitor(Duration::from_millis(1)), None);
        requester.join().unwrap();
        handles.join().unwrap();
    }

    #[test]
    fn test_pipeline_invalid_period() {
        let (mut p, _, shutdown) = pipeline(None, SimActuator::new());
        p.params.control_period_s = 0.0;

        assert!(matches!(p.spawn(), Err(PipelineError::InvalidPeriod(_))));
        assert!(!shutdown.is_requested());
    }
}
