//! # Teleop executable
//!
//! Drives the robot by hand through the timed maneuvers, one command per prompt line.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

mod command;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use color_eyre::{eyre::WrapErr, Report};
use log::{error, info, warn};
use rustyline::{error::ReadlineError, DefaultEditor};
use std::fs;
use std::path::Path;
use std::time::Duration;
use structopt::StructOpt;

use command::{Command, HELP_TEXT};
use line_lib::{
    eqpt::{sim::SimActuator, ActuatorError, ActuatorSink},
    mnvr::{self, Legs, DIR_MAX_DEG},
};
use util::{
    logger::{logger_init, LevelFilter},
    session::Session,
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

const PROMPT: &str = "teleop> ";
/// Command history shared between teleop runs, relative to the software root.
const HISTORY_PATH: &str = "data/teleop_history.txt";

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, StructOpt)]
#[structopt(name = "teleop", about = "Drive the line follower by hand")]
struct Opt {
    /// Speed used by every maneuver
    #[structopt(short, long, default_value = "35")]
    speed: f64,

    /// Duration of the single moves, and scale factor of the compound maneuvers' legs
    ///
    /// Units: seconds
    #[structopt(short, long, default_value = "1.0")]
    duration: f64,

    /// Drive the real servo board rather than the simulated actuator
    #[structopt(long)]
    robot: bool,
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn main() -> Result<(), Report> {
    color_eyre::install()?;

    let opt = Opt::from_args();

    let session = Session::new("teleop", "sessions").wrap_err("Failed to create the session")?;
    logger_init(LevelFilter::Info, &session).wrap_err("Failed to initialise logging")?;

    let mut actuator = open_actuator(opt.robot)?;

    let mut rl = DefaultEditor::new().wrap_err("Failed to create the line editor")?;
    let history_path = util::host::get_sw_root()
        .map(|root| root.join(HISTORY_PATH))
        .wrap_err("Could not find the command history")?;
    if let Err(e) = load_history(&mut rl, &history_path) {
        info!("No command history loaded from {:?}: {}", history_path, e);
    }

    info!("Teleop started");
    println!("{}", HELP_TEXT);

    loop {
        let line = match rl.readline(PROMPT) {
            Ok(l) => l,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                println!("\nExiting teleop.");
                break;
            }
            Err(e) => {
                error!("Could not read the command line: {}", e);
                break;
            }
        };

        rl.add_history_entry(line.as_str()).ok();

        let cmd = match line.parse::<Command>() {
            Ok(c) => c,
            Err(e) => {
                println!("{}", e);
                continue;
            }
        };

        match cmd {
            Command::Quit => {
                println!("Exiting teleop.");
                break;
            }
            Command::Help => println!("{}", HELP_TEXT),
            Command::Nothing => (),
            cmd => {
                if let Err(e) = exec(&mut actuator, cmd, &opt) {
                    error!("Maneuver failed for {:?}: {}", cmd, e);
                    if let Err(e) = actuator.stop() {
                        error!("Could not stop the actuator: {}", e);
                    }
                }
            }
        }
    }

    if let Err(e) = save_history(&mut rl, &history_path) {
        warn!("Could not save the command history: {}", e);
    }

    actuator.stop().wrap_err("Failed to stop the actuator")?;

    Ok(())
}

fn load_history(rl: &mut DefaultEditor, path: &Path) -> Result<(), ReadlineError> {
    rl.load_history(path)
}

/// Save the history, creating its directory if needed.
fn save_history(rl: &mut DefaultEditor, path: &Path) -> Result<(), ReadlineError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    rl.save_history(path)
}

/// Run the maneuver for a command.
fn exec<A>(actuator: &mut A, cmd: Command, opt: &Opt) -> Result<(), ActuatorError>
where
    A: ActuatorSink + ?Sized,
{
    let speed = opt.speed;
    let duration = Duration::from_secs_f64(opt.duration.max(0.0));

    match cmd {
        Command::ForwardStraight => mnvr::forward_straight(actuator, speed, duration),
        Command::BackwardStraight => mnvr::backward_straight(actuator, speed, duration),
        Command::ForwardTurnLeft => mnvr::forward_turn(actuator, -DIR_MAX_DEG, speed, duration),
        Command::ForwardTurnRight => mnvr::forward_turn(actuator, DIR_MAX_DEG, speed, duration),
        Command::BackwardTurnLeft => mnvr::backward_turn(actuator, -DIR_MAX_DEG, speed, duration),
        Command::BackwardTurnRight => mnvr::backward_turn(actuator, DIR_MAX_DEG, speed, duration),
        Command::ParallelParkRight => {
            mnvr::parallel_park_right(actuator, speed, Legs::parallel_park().scaled(opt.duration))
        }
        Command::ParallelParkLeft => {
            mnvr::parallel_park_left(actuator, speed, Legs::parallel_park().scaled(opt.duration))
        }
        Command::KTurnLeft => {
            mnvr::k_turn_left(actuator, speed, Legs::k_turn().scaled(opt.duration))
        }
        Command::KTurnRight => {
            mnvr::k_turn_right(actuator, speed, Legs::k_turn().scaled(opt.duration))
        }
        Command::Stop => {
            actuator.stop()?;
            println!("Stopped.");
            Ok(())
        }
        Command::Help | Command::Quit | Command::Nothing => Ok(()),
    }
}

#[cfg(all(target_arch = "arm", target_os = "linux"))]
fn open_actuator(robot: bool) -> Result<Box<dyn ActuatorSink + Send>, Report> {
    if !robot {
        return Ok(Box::new(SimActuator::new()));
    }

    let params: line_lib::params::LineExecParams =
        util::params::load("line_exec.toml").wrap_err("Could not load exec params")?;

    Ok(Box::new(
        line_lib::eqpt::servo::open_pca9685(params.servo)
            .wrap_err("Failed to open the PCA9685 servo board")?,
    ))
}

#[cfg(not(all(target_arch = "arm", target_os = "linux")))]
fn open_actuator(robot: bool) -> Result<Box<dyn ActuatorSink + Send>, Report> {
    if robot {
        return Err(color_eyre::eyre::eyre!(
            "The servo board is only available on the Raspberry Pi"
        ));
    }

    Ok(Box::new(SimActuator::new()))
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
