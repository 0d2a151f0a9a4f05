//! Process-wide run mode
//!
//! The mode decides two things: whether child output is captured into
//! line events, and whether the exit coordinator owns host-process exit.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Environment variable carrying the run mode
pub const CORRAL_ENV: &str = "CORRAL_ENV";

/// How the supervisor relates to its host process
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Child stdio is piped and every line becomes an event.
    /// An embedding UI manages host exit.
    Ui,

    /// Child stdio is inherited by the terminal. The exit coordinator
    /// owns host exit and a child's exit ends the host.
    Cli,

    /// Child stdio is inherited; the embedding host manages exit.
    #[default]
    Embedded,
}

impl RunMode {
    /// Parse a raw flag value. Unrecognized values fall back to `Embedded`.
    pub fn parse(value: &str) -> Self {
        match value {
            "ui" => Self::Ui,
            "cli" => Self::Cli,
            _ => Self::Embedded,
        }
    }

    /// Read the mode from `CORRAL_ENV`
    pub fn from_env() -> Self {
        std::env::var(CORRAL_ENV)
            .map(|v| Self::parse(&v))
            .unwrap_or(Self::Embedded)
    }

    /// Whether child stdout/stderr are piped into line events
    pub fn captures_output(&self) -> bool {
        matches!(self, Self::Ui)
    }

    /// Whether the exit coordinator terminates the host process itself
    pub fn owns_exit(&self) -> bool {
        matches!(self, Self::Cli)
    }

    /// Whether a child's own exit is forwarded as a host exit trigger
    pub fn forwards_child_exit(&self) -> bool {
        matches!(self, Self::Cli)
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ui => "ui",
            Self::Cli => "cli",
            Self::Embedded => "embedded",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_known_values() {
        assert_eq!(RunMode::parse("ui"), RunMode::Ui);
        assert_eq!(RunMode::parse("cli"), RunMode::Cli);
    }

    #[test]
    fn unknown_values_are_embedded() {
        assert_eq!(RunMode::parse(""), RunMode::Embedded);
        assert_eq!(RunMode::parse("UI"), RunMode::Embedded);
        assert_eq!(RunMode::parse("daemon"), RunMode::Embedded);
    }

    #[test]
    fn mode_semantics() {
        assert!(RunMode::Ui.captures_output());
        assert!(!RunMode::Ui.owns_exit());

        assert!(!RunMode::Cli.captures_output());
        assert!(RunMode::Cli.owns_exit());
        assert!(RunMode::Cli.forwards_child_exit());

        assert!(!RunMode::Embedded.captures_output());
        assert!(!RunMode::Embedded.owns_exit());
        assert!(!RunMode::Embedded.forwards_child_exit());
    }
}
