//! Errors surfaced by the headless host.

use thiserror::Error;

use colony_core::error::ColonyError;

use crate::scenario::ScenarioError;

/// Result type alias using [`SimError`].
pub type Result<T> = std::result::Result<T, SimError>;

/// Anything that stops a headless run.
#[derive(Debug, Error)]
pub enum SimError {
    /// The scenario could not be loaded or built.
    #[error(transparent)]
    Scenario(#[from] ScenarioError),
    /// The autopilot rejected its config or failed to persist.
    #[error("Autopilot error: {0}")]
    Colony(#[from] ColonyError),
    /// Writing output failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Serializing output failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// Repeated runs disagreed.
    #[error("Nondeterministic: {runs} runs produced {distinct} distinct hashes")]
    Nondeterministic {
        /// Runs compared.
        runs: usize,
        /// Distinct final hashes seen.
        distinct: usize,
    },
}
