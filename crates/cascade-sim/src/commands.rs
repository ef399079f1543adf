//! Operator commands read from standard input, one per line.
//!
//! | Command | Effect |
//! |---------|--------|
//! | `pause` | Pause the tick loop |
//! | `resume` | Resume the tick loop |
//! | `interval <ms>` | Set the tick interval (minimum 10 ms) |
//! | `reset <module>` | Queue a reset intervention |
//! | `reinforce <module>` | Queue a reinforce intervention |
//! | `status` | Log the loop status |
//! | `stop` | Stop after the current tick |
//!
//! Stdin is read on a plain thread so an idle terminal never holds up
//! shutdown; lines are forwarded to an async task that drives the
//! [`OperatorState`].

use std::io::BufRead;
use std::sync::Arc;

use cascade_core::operator::{OperatorState, MIN_TICK_INTERVAL_MS};
use cascade_types::{InterventionKind, ModuleId};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Lines buffered between the stdin thread and the command task.
const LINE_BUFFER: usize = 16;

/// A parsed operator command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Pause the tick loop.
    Pause,
    /// Resume the tick loop.
    Resume,
    /// Stop after the current tick.
    Stop,
    /// Log the loop status.
    Status,
    /// Set the tick interval in milliseconds.
    Interval(u64),
    /// Queue an intervention for the next tick boundary.
    Intervene {
        /// Target module.
        module: ModuleId,
        /// Intervention kind.
        kind: InterventionKind,
    },
}

/// A command line that could not be parsed or applied.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// The first word is not a known command.
    #[error("unknown command: {0}")]
    Unknown(String),

    /// The command needs an argument that was not given.
    #[error("`{command}` requires an argument")]
    MissingArgument {
        /// The command word.
        command: &'static str,
    },

    /// The interval argument is not a whole number of milliseconds.
    #[error("invalid tick interval: {value}")]
    InvalidInterval {
        /// The rejected argument.
        value: String,
    },

    /// The interval is below [`MIN_TICK_INTERVAL_MS`].
    #[error("tick interval {ms} ms is below the {min} ms minimum")]
    IntervalTooShort {
        /// Requested interval.
        ms: u64,
        /// Minimum allowed interval.
        min: u64,
    },
}

/// Parse one input line. Blank lines yield `None`.
///
/// # Errors
///
/// Returns a [`CommandError`] for an unknown word, a missing argument, or
/// a malformed interval.
pub fn parse_command(line: &str) -> Result<Option<Command>, CommandError> {
    let mut words = line.split_whitespace();
    let Some(word) = words.next() else {
        return Ok(None);
    };
    let arg = words.next();
    let command = match word.to_ascii_lowercase().as_str() {
        "pause" => Command::Pause,
        "resume" => Command::Resume,
        "stop" => Command::Stop,
        "status" => Command::Status,
        "interval" => {
            let value = arg.ok_or(CommandError::MissingArgument {
                command: "interval",
            })?;
            let ms = value.parse().map_err(|_| CommandError::InvalidInterval {
                value: value.to_owned(),
            })?;
            Command::Interval(ms)
        }
        "reset" => Command::Intervene {
            module: ModuleId::from(arg.ok_or(CommandError::MissingArgument { command: "reset" })?),
            kind: InterventionKind::Reset,
        },
        "reinforce" => Command::Intervene {
            module: ModuleId::from(arg.ok_or(CommandError::MissingArgument {
                command: "reinforce",
            })?),
            kind: InterventionKind::Reinforce,
        },
        _ => return Err(CommandError::Unknown(word.to_owned())),
    };
    Ok(Some(command))
}

/// Apply a command to the operator state.
///
/// # Errors
///
/// Returns [`CommandError::IntervalTooShort`] if the interval is rejected.
pub async fn apply(command: Command, operator: &OperatorState) -> Result<(), CommandError> {
    match command {
        Command::Pause => {
            operator.pause();
            info!("Operator paused the simulation");
        }
        Command::Resume => {
            operator.resume();
            info!("Operator resumed the simulation");
        }
        Command::Stop => {
            info!("Operator requested stop");
            operator.request_stop();
        }
        Command::Status => {
            info!(
                paused = operator.is_paused(),
                stop_requested = operator.is_stop_requested(),
                tick_interval_ms = operator.tick_interval_ms(),
                elapsed_seconds = operator.elapsed_seconds(),
                "Operator status"
            );
        }
        Command::Interval(ms) => match operator.set_tick_interval_ms(ms) {
            Some(previous) => info!(previous, current = ms, "Tick interval changed"),
            None => {
                return Err(CommandError::IntervalTooShort {
                    ms,
                    min: MIN_TICK_INTERVAL_MS,
                });
            }
        },
        Command::Intervene { module, kind } => {
            info!(module = %module, kind = kind.as_str(), "Intervention queued");
            operator.request_intervention(module, kind).await;
        }
    }
    Ok(())
}

/// Read commands from stdin until it closes.
///
/// Bad lines are logged and skipped. The returned handle finishes once
/// stdin reaches end of file.
pub fn spawn_command_reader(operator: Arc<OperatorState>) -> JoinHandle<()> {
    let (tx, mut rx) = mpsc::channel::<String>(LINE_BUFFER);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            let result = match parse_command(&line) {
                Ok(Some(command)) => apply(command, &operator).await,
                Ok(None) => Ok(()),
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                warn!(line = %line.trim(), error = %e, "Operator command ignored");
            }
        }
        debug!("Operator input closed");
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use cascade_core::config::RunConfig;

    use super::*;

    fn operator() -> OperatorState {
        OperatorState::new(50, &RunConfig::default())
    }

    #[test]
    fn parses_control_words() {
        assert_eq!(parse_command("pause").unwrap(), Some(Command::Pause));
        assert_eq!(parse_command("  RESUME ").unwrap(), Some(Command::Resume));
        assert_eq!(parse_command("stop").unwrap(), Some(Command::Stop));
        assert_eq!(parse_command("interval 250").unwrap(), Some(Command::Interval(250)));
        assert_eq!(parse_command("").unwrap(), None);
    }

    #[test]
    fn parses_interventions() {
        assert_eq!(
            parse_command("reset social").unwrap(),
            Some(Command::Intervene {
                module: ModuleId::from("social"),
                kind: InterventionKind::Reset,
            })
        );
        assert_eq!(
            parse_command("reinforce health").unwrap(),
            Some(Command::Intervene {
                module: ModuleId::from("health"),
                kind: InterventionKind::Reinforce,
            })
        );
    }

    #[test]
    fn rejects_bad_lines() {
        assert_eq!(
            parse_command("explode"),
            Err(CommandError::Unknown("explode".to_owned()))
        );
        assert_eq!(
            parse_command("reset"),
            Err(CommandError::MissingArgument { command: "reset" })
        );
        assert!(matches!(
            parse_command("interval fast"),
            Err(CommandError::InvalidInterval { .. })
        ));
    }

    #[tokio::test]
    async fn pause_and_resume_toggle_operator() {
        let op = operator();
        apply(Command::Pause, &op).await.unwrap();
        assert!(op.is_paused());
        apply(Command::Resume, &op).await.unwrap();
        assert!(!op.is_paused());
        apply(Command::Stop, &op).await.unwrap();
        assert!(op.is_stop_requested());
    }

    #[tokio::test]
    async fn interval_below_minimum_is_rejected() {
        let op = operator();
        assert!(apply(Command::Interval(5), &op).await.is_err());
        assert_eq!(op.tick_interval_ms(), 50);
        apply(Command::Interval(200), &op).await.unwrap();
        assert_eq!(op.tick_interval_ms(), 200);
    }

    #[tokio::test]
    async fn interventions_are_queued() {
        let op = operator();
        let command = parse_command("reset social").unwrap().unwrap();
        apply(command, &op).await.unwrap();
        let queued = op.drain_interventions().await;
        assert_eq!(queued.len(), 1);
        assert_eq!(queued.first().map(|r| r.kind), Some(InterventionKind::Reset));
        assert_eq!(queued.first().map(|r| r.module.as_str()), Some("social"));
    }
}
