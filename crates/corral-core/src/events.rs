//! Events emitted by a supervisor

use serde::{Deserialize, Serialize};

/// Signal to a UI layer carried by [`SupervisorEvent::Action`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionSignal {
    /// Reset the view before new output arrives
    Clear,
}

/// Stream a log line is tagged with
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogKind {
    #[default]
    Data,
    Error,
}

/// Events observable by the caller of a supervisor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum SupervisorEvent {
    /// Normal output or status line
    Data(String),

    /// stderr output or an error condition
    Error(String),

    /// Lifecycle signal for the UI
    Action(ActionSignal),
}

impl SupervisorEvent {
    pub fn log(kind: LogKind, line: String) -> Self {
        match kind {
            LogKind::Data => Self::Data(line),
            LogKind::Error => Self::Error(line),
        }
    }

    /// Event name as seen by UI layers
    pub fn name(&self) -> &'static str {
        match self {
            Self::Data(_) => "data",
            Self::Error(_) => "error",
            Self::Action(_) => "action",
        }
    }

    /// The log line, for `data` and `error` events
    pub fn line(&self) -> Option<&str> {
        match self {
            Self::Data(line) | Self::Error(line) => Some(line),
            Self::Action(_) => None,
        }
    }
}
