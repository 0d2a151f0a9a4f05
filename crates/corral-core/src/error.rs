//! Error types for the supervisor core

use corral_util::ProcessName;
use thiserror::Error;

/// Errors from supervisor and exit coordination operations
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Failed to spawn '{name}': {reason}")]
    SpawnFailed { name: ProcessName, reason: String },

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Unknown process: {0}")]
    UnknownProcess(ProcessName),

    #[error("Failed to terminate '{name}' (pid {pid}): {reason}")]
    TerminationFailed {
        name: ProcessName,
        pid: u32,
        reason: String,
    },

    #[error("Failed to terminate {} process(es)", .failures.len())]
    CleanupFailed { failures: Vec<SupervisorError> },

    #[error("Action '{action}' failed: {reason}")]
    ActionFailed { action: String, reason: String },

    #[error("Exit triggers are already being watched")]
    AlreadyWatching,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SupervisorError {
    pub fn action(action: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ActionFailed {
            action: action.into(),
            reason: reason.into(),
        }
    }
}

pub type SupervisorResult<T> = std::result::Result<T, SupervisorError>;
