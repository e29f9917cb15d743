use flowpool_core::ConfigError;
use thiserror::Error;

/// Errors that prevent a simulation from running.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimulationError {
    /// The scenario failed validation; no simulated time elapsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    /// The simulation is in an invalid state.
    #[error("Invalid simulation state: {0}")]
    InvalidState(String),
}

/// A type alias for `Result<T, SimulationError>`.
pub type SimulationResult<T> = Result<T, SimulationError>;
