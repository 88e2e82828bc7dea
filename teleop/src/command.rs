//! Teleop command parsing

use std::str::FromStr;

pub const HELP_TEXT: &str = "
Teleop commands:
  w  -> forward straight
  s  -> backward straight
  a  -> forward turn left
  d  -> forward turn right
  q  -> backward turn left
  e  -> backward turn right

  pr -> parallel park right
  pl -> parallel park left
  kl -> K-turn left
  kr -> K-turn right

  x  -> stop
  h  -> help
  quit / exit -> quit
";

/// A single line entered at the teleop prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    ForwardStraight,
    BackwardStraight,
    ForwardTurnLeft,
    ForwardTurnRight,
    BackwardTurnLeft,
    BackwardTurnRight,
    ParallelParkRight,
    ParallelParkLeft,
    KTurnLeft,
    KTurnRight,
    Stop,
    Help,
    Quit,

    /// Blank line
    Nothing,
}

#[derive(Debug, PartialEq, Eq)]
pub struct UnknownCommand(pub String);

impl FromStr for Command {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let cmd = s.trim().to_lowercase();

        Ok(match cmd.as_str() {
            "w" => Command::ForwardStraight,
            "s" => Command::BackwardStraight,
            "a" => Command::ForwardTurnLeft,
            "d" => Command::ForwardTurnRight,
            "q" => Command::BackwardTurnLeft,
            "e" => Command::BackwardTurnRight,
            "pr" => Command::ParallelParkRight,
            "pl" => Command::ParallelParkLeft,
            "kl" => Command::KTurnLeft,
            "kr" => Command::KTurnRight,
            "x" => Command::Stop,
            "h" | "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            "" => Command::Nothing,
            _ => return Err(UnknownCommand(cmd)),
        })
    }
}

impl std::fmt::Display for UnknownCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Unknown command: '{}'. Type 'h' for help.", self.0)
    }
}
