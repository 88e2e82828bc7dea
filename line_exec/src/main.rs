//! Main line follower executable entry point.
//!
//! # Architecture
//!
//! The executable runs three stages, each in its own thread at its own period:
//!
//!     - Sense: acquire a raw frame from the sensor source
//!     - Interpret: detect the line in the latest frame, giving a relative steering direction
//!     - Control: convert the latest direction into steering and speed commands for the actuator
//!
//! The main thread waits for Ctrl-C, or for any stage to end early (an actuator fault or a
//! panicking stage), and then shuts all stages down. The actuator is always stopped on exit.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use color_eyre::{
    eyre::{eyre, WrapErr},
    Report,
};
use log::{error, info};
use std::time::Duration;

// Internal
use line_lib::{
    detect::{ContourDetector, Detector, EdgeDetector},
    eqpt::{
        servo::ServoParams,
        sim::{SimActuator, SimCamera, SimGrayscale},
        ActuatorSink, SensorSource,
    },
    params::{ActuatorKind, LineExecParams, SensorKind},
    pipeline::{DebugImageConfig, Pipeline, Shutdown},
    steer_ctrl::SteerCtrl,
};
use util::{
    logger::{logger_init, LevelFilter},
    module::State,
    session::Session,
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Period at which the main thread checks on the pipeline.
const MONITOR_PERIOD: Duration = Duration::from_millis(50);

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {
    color_eyre::install()?;

    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new("line_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Debug, &session).wrap_err("Failed to initialise logging")?;

    info!("Line Follower Executable\n");
    info!("Session directory: {:?}\n", session.session_root);

    // ---- LOAD PARAMETERS ----

    let exec_params: LineExecParams =
        util::params::load("line_exec.toml").wrap_err("Could not load exec params")?;
    let steer_ctrl_params =
        util::params::load("steer_ctrl.toml").wrap_err("Could not load SteerCtrl params")?;

    info!("Exec parameters loaded");

    // ---- INITIALISE MODULES ----

    info!("Initialising modules...");

    let (sensor, detector) = init_perception(&exec_params)?;
    info!("Sensor {:?} initialised", exec_params.sensor);

    let steer_ctrl = SteerCtrl::init(steer_ctrl_params).wrap_err("Failed to initialise SteerCtrl")?;
    info!("SteerCtrl init complete");

    let actuator = init_actuator(exec_params.actuator, &exec_params.servo)?;
    info!("Actuator {:?} initialised", exec_params.actuator);

    info!("Module initialisation complete\n");

    // ---- START PIPELINE ----

    let shutdown = Shutdown::new();
    shutdown
        .install_ctrlc_handler()
        .wrap_err("Failed to install the Ctrl-C handler")?;

    let mut pipeline = Pipeline::new(
        exec_params.pipeline.clone(),
        sensor,
        detector,
        steer_ctrl,
        actuator,
        shutdown.clone(),
    );

    if exec_params.debug_images.enabled {
        info!(
            "Saving every {} debug image(s) to {:?}",
            exec_params.debug_images.every_n_cycles, session.debug_root
        );
        pipeline = pipeline.with_debug_images(DebugImageConfig {
            dir: session.debug_root.clone(),
            every_n_cycles: exec_params.debug_images.every_n_cycles,
        });
    }

    let handles = pipeline.spawn().wrap_err("Failed to start the pipeline")?;

    info!("Following the line, press Ctrl-C to stop\n");

    // ---- MONITOR ----

    match handles.monitor(MONITOR_PERIOD) {
        Some(stage) => error!("Shutting down after the {} stage ended", stage),
        None => info!("Shutting down"),
    }

    let cycles = handles.join().wrap_err("Pipeline ended with an error")?;

    info!(
        "Pipeline stopped after {} sense, {} interpret and {} control cycles",
        cycles.sense, cycles.interpret, cycles.control
    );

    Ok(())
}

/// Build the sensor source and the detector which understands its frames.
fn init_perception(
    params: &LineExecParams,
) -> Result<(Box<dyn SensorSource + Send>, Box<dyn Detector + Send>), Report> {
    let contour = || -> Result<Box<dyn Detector + Send>, Report> {
        Ok(Box::new(
            ContourDetector::new(params.contour)
                .wrap_err("Failed to initialise the contour detector")?,
        ))
    };

    match params.sensor {
        SensorKind::GrayscaleSim => Ok((
            Box::new(SimGrayscale::new(params.sim_line)),
            Box::new(
                EdgeDetector::new(params.edge).wrap_err("Failed to initialise the edge detector")?,
            ),
        )),
        SensorKind::CameraSim => Ok((
            Box::new(SimCamera::new(
                params.sim_line,
                params.camera.width,
                params.camera.height,
            )),
            contour()?,
        )),
        SensorKind::Camera => Ok((init_camera(params)?, contour()?)),
    }
}

#[cfg(feature = "cam")]
fn init_camera(params: &LineExecParams) -> Result<Box<dyn SensorSource + Send>, Report> {
    let cam = line_lib::eqpt::cam::V4lCamera::new(
        &params.camera.device,
        params.camera.width,
        params.camera.height,
        params.camera.fps,
    )
    .wrap_err("Failed to open the camera")?;

    Ok(Box::new(cam))
}

#[cfg(not(feature = "cam"))]
fn init_camera(_params: &LineExecParams) -> Result<Box<dyn SensorSource + Send>, Report> {
    Err(eyre!(
        "The camera sensor requires line_exec to be built with the \"cam\" feature"
    ))
}

#[cfg(all(target_arch = "arm", target_os = "linux"))]
fn init_actuator(
    kind: ActuatorKind,
    servo: &ServoParams,
) -> Result<Box<dyn ActuatorSink + Send>, Report> {
    match kind {
        ActuatorKind::Sim => Ok(Box::new(SimActuator::new())),
        ActuatorKind::Pca9685 => Ok(Box::new(
            line_lib::eqpt::servo::open_pca9685(servo.clone())
                .wrap_err("Failed to open the PCA9685 servo board")?,
        )),
    }
}

#[cfg(not(all(target_arch = "arm", target_os = "linux")))]
fn init_actuator(
    kind: ActuatorKind,
    _servo: &ServoParams,
) -> Result<Box<dyn ActuatorSink + Send>, Report> {
    match kind {
        ActuatorKind::Sim => Ok(Box::new(SimActuator::new())),
        ActuatorKind::Pca9685 => Err(eyre!(
            "The PCA9685 actuator is only available on the Raspberry Pi"
        )),
    }
}
