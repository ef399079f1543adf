//! Command-line driver for the Cascade simulator.
//!
//! Loads configuration, builds the engine, and runs the real-time tick
//! loop until a bound is reached, the operator types `stop`, or Ctrl-C.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `$CASCADE_CONFIG` or `cascade-config.yaml`
//! 2. Initialize structured logging (tracing)
//! 3. Resolve coefficients and build the engine
//! 4. Create the signal source and history sinks
//! 5. Create operator state, the stdin command reader, and the Ctrl-C
//!    handler
//! 6. Run the simulation loop
//! 7. Flush history and log the result

mod commands;
mod error;
mod writer;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use cascade_core::coefficients::{CoefficientProvider, DirectoryCoefficients, StaticCoefficients};
use cascade_core::config::{LoggingConfig, SimulationConfig};
use cascade_core::history::{ChannelSink, HistoryRecorder, HistorySink, TeeSink};
use cascade_core::operator::OperatorState;
use cascade_core::runner;
use cascade_core::signal::{NoSignals, SeededForcing, SignalSource};
use cascade_core::CascadeEngine;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::SimError;

/// Environment variable naming the config file.
const CONFIG_ENV: &str = "CASCADE_CONFIG";

/// Config file used when the environment variable is unset.
const DEFAULT_CONFIG: &str = "cascade-config.yaml";

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration, the run, or history output fails.
#[tokio::main]
async fn main() -> Result<(), SimError> {
    // 1. Load configuration.
    let (config, config_path) = load_config()?;

    // 2. Initialize structured logging.
    init_logging(&config.logging);
    info!("cascade-sim starting");
    match config_path {
        Some(ref path) => info!(path = %path.display(), "Configuration loaded"),
        None => info!("Config file not found, using defaults"),
    }

    // 3. Build the engine.
    let provider: Box<dyn CoefficientProvider> = match config.coefficients_dir {
        Some(ref dir) => Box::new(DirectoryCoefficients::new(dir.clone())),
        None => Box::new(StaticCoefficients::new()),
    };
    let mut engine = CascadeEngine::from_config(&config, provider.as_ref())?;

    // 4. Signals and history.
    let mut signals: Box<dyn SignalSource> = match config.forcing {
        Some(ref forcing) => {
            let seed = forcing.seed.unwrap_or(config.simulation.seed);
            info!(
                seed,
                amplitude = forcing.amplitude,
                modules = forcing.modules.len(),
                "Seeded forcing enabled"
            );
            Box::new(SeededForcing::new(seed, forcing.amplitude, forcing.modules.clone()))
        }
        None => Box::new(NoSignals),
    };

    let mut recorder = HistoryRecorder::new(config.history.capacity);
    let (mut channel, writer) = match config.history.output {
        Some(ref path) => {
            let (sink, rx) = ChannelSink::channel(config.history.capacity);
            info!(path = %path.display(), "Writing history as JSON lines");
            (Some(sink), Some(writer::spawn_history_writer(rx, path.clone())))
        }
        None => (None, None),
    };

    // 5. Operator state.
    let operator = Arc::new(OperatorState::new(
        config.simulation.tick_interval_ms,
        &config.simulation,
    ));
    commands::spawn_command_reader(Arc::clone(&operator));
    info!("Operator commands: pause, resume, interval <ms>, reset <module>, reinforce <module>, status, stop");
    {
        let operator = Arc::clone(&operator);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Ctrl-C received, stopping after the current tick");
                operator.request_stop();
            }
        });
    }

    // 6. Run.
    let result = {
        let mut sinks: Vec<&mut dyn HistorySink> = vec![&mut recorder];
        if let Some(ref mut sink) = channel {
            sinks.push(sink);
        }
        let mut history = TeeSink::new(sinks);
        runner::run_simulation(
            &mut engine,
            signals.as_mut(),
            &mut history,
            &operator,
            config.simulation.dt,
        )
        .await
    };

    // 7. Flush history, then report.
    if let Some(sink) = channel.take() {
        if sink.dropped() > 0 {
            warn!(dropped = sink.dropped(), "History output fell behind");
        }
    }
    if let Some(handle) = writer {
        let written = handle.await.map_err(|e| SimError::Writer {
            message: e.to_string(),
        })??;
        info!(written, "History output complete");
    }
    info!(
        retained = recorder.len(),
        evicted = recorder.dropped(),
        "In-memory history"
    );

    let result = match result {
        Ok(result) => result,
        Err(e) => {
            error!(error = %e, tick = engine.current_tick(), "Simulation aborted");
            return Err(e.into());
        }
    };
    runner::log_simulation_end(&result);
    info!(
        end_reason = ?result.end_reason,
        total_ticks = result.total_ticks,
        "cascade-sim shutdown complete"
    );
    Ok(())
}

/// Resolve and load the configuration file.
///
/// Returns the path that was loaded, or `None` if no file exists and the
/// defaults are used.
fn load_config() -> Result<(SimulationConfig, Option<PathBuf>), SimError> {
    let path = std::env::var_os(CONFIG_ENV).map_or_else(|| PathBuf::from(DEFAULT_CONFIG), PathBuf::from);
    if Path::new(&path).exists() {
        let config = SimulationConfig::from_file(&path)?;
        Ok((config, Some(path)))
    } else {
        Ok((SimulationConfig::default(), None))
    }
}

/// Install the global subscriber. `RUST_LOG` wins over the configured
/// level.
fn init_logging(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}
