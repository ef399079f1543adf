//! Error types for the simulator binary.

/// Top-level error for the simulator binary.
///
/// Wraps every failure mode during startup, the run, and history output so
/// `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// Configuration loading or engine construction failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: cascade_core::ConfigError,
    },

    /// The simulation run failed.
    #[error("runner error: {source}")]
    Runner {
        /// The underlying runner error.
        #[from]
        source: cascade_core::runner::RunnerError,
    },

    /// Writing the history file failed.
    #[error("history output error: {source}")]
    History {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// A snapshot could not be serialized.
    #[error("snapshot serialization error: {source}")]
    Serialize {
        /// The underlying JSON error.
        #[from]
        source: serde_json::Error,
    },

    /// The history writer task panicked or was cancelled.
    #[error("history writer task failed: {message}")]
    Writer {
        /// Description of the failure.
        message: String,
    },
}
