//! Error types for the colony autopilot.
//!
//! Most failures inside a tick are recoverable and never leave the tick:
//! they are logged and the affected agent simply chooses again next tick.
//! Only persistence and configuration problems surface as `Err`.

use thiserror::Error;

use crate::board::TaskId;
use crate::components::{AgentId, ObjectId};

/// Result type alias using [`ColonyError`].
pub type Result<T> = std::result::Result<T, ColonyError>;

/// Top-level error type for the colony autopilot.
#[derive(Debug, Error)]
pub enum ColonyError {
    /// A remembered object id no longer resolves in the snapshot.
    #[error("Stale reference: {0}")]
    StaleReference(ObjectId),

    /// A task failed its validity predicate.
    #[error("Invalid task: {0}")]
    InvalidTask(TaskId),

    /// No valid target or task kind was found.
    #[error("No candidate for {agent}: {reason}")]
    NoCandidate {
        /// Agent that was looking for work.
        agent: AgentId,
        /// What was missing.
        reason: String,
    },

    /// A capability call was rejected by the world.
    #[error("Action rejected for {agent}: {action} ({reason})")]
    ActionRejected {
        /// Agent that issued the action.
        agent: AgentId,
        /// Name of the action.
        action: &'static str,
        /// Reason given by the world.
        reason: String,
    },

    /// Failed to encode or decode a persisted record.
    #[error("Persistence error for key '{key}': {message}")]
    Persistence {
        /// Store key of the record.
        key: String,
        /// Error message.
        message: String,
    },

    /// Failed to read or parse configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ColonyError {
    /// Whether the error is one of the in-tick recoverable kinds.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::StaleReference(_)
                | Self::InvalidTask(_)
                | Self::NoCandidate { .. }
                | Self::ActionRejected { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_kinds() {
        assert!(ColonyError::StaleReference(ObjectId(3)).is_recoverable());
        assert!(ColonyError::InvalidTask(TaskId(9)).is_recoverable());
        assert!(!ColonyError::Config("bad".into()).is_recoverable());
        assert!(!ColonyError::Persistence {
            key: "board".into(),
            message: "truncated".into(),
        }
        .is_recoverable());
    }

    #[test]
    fn test_error_messages() {
        let err = ColonyError::ActionRejected {
            agent: AgentId(4),
            action: "withdraw",
            reason: "target empty".into(),
        };
        assert_eq!(
            err.to_string(),
            "Action rejected for agent#4: withdraw (target empty)"
        );
    }
}
