//! Validated configuration structures

use crate::schema::{RawAction, RawConfig, RawSupervisorConfig};
use corral_host_api::{KillMode, ShellPolicy};
use corral_util::ProcessName;
use std::path::PathBuf;

/// Default seconds between SIGTERM and SIGKILL
pub const DEFAULT_KILL_GRACE_SECONDS: u64 = 5;

/// Validated configuration ready for use
#[derive(Debug, Clone)]
pub struct Config {
    /// Supervisor settings
    pub supervisor: SupervisorConfig,

    /// Validated actions, in file order
    pub actions: Vec<ActionConfig>,
}

impl Config {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        Self {
            supervisor: SupervisorConfig::from_raw(raw.supervisor),
            actions: raw.actions.into_iter().map(ActionConfig::from_raw).collect(),
        }
    }

    /// Get action by name
    pub fn get_action(&self, name: &str) -> Option<&ActionConfig> {
        self.actions.iter().find(|a| a.name == name)
    }
}

/// Supervisor configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorConfig {
    pub shell: PathBuf,
    pub shell_policy: ShellPolicy,
    pub kill_mode: KillMode,
    pub strip_ansi: bool,
}

impl SupervisorConfig {
    fn from_raw(raw: RawSupervisorConfig) -> Self {
        let shell_policy = if raw.quote_arguments.unwrap_or(false) {
            ShellPolicy::Quoted
        } else {
            ShellPolicy::Raw
        };

        Self {
            shell: raw.shell.unwrap_or_else(|| PathBuf::from("/bin/sh")),
            shell_policy,
            kill_mode: KillMode::from_grace_seconds(
                raw.kill_grace_seconds.unwrap_or(DEFAULT_KILL_GRACE_SECONDS),
            ),
            strip_ansi: raw.strip_ansi.unwrap_or(false),
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self::from_raw(RawSupervisorConfig::default())
    }
}

/// A validated action definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionConfig {
    pub name: String,
    pub process: ProcessName,
    pub command: Vec<String>,
    pub description: Option<String>,
}

impl ActionConfig {
    fn from_raw(raw: RawAction) -> Self {
        let process = ProcessName::new(raw.process.unwrap_or_else(|| raw.name.clone()));
        Self {
            name: raw.name,
            process,
            command: raw.command,
            description: raw.description,
        }
    }
}
