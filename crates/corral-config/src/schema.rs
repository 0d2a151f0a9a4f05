//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Supervisor-wide settings
    #[serde(default)]
    pub supervisor: RawSupervisorConfig,

    /// Named actions that can be run
    #[serde(default)]
    pub actions: Vec<RawAction>,
}

/// Supervisor-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawSupervisorConfig {
    /// Shell used to interpret command lines (default: /bin/sh)
    pub shell: Option<PathBuf>,

    /// Quote every command part instead of passing raw shell syntax
    pub quote_arguments: Option<bool>,

    /// Seconds between SIGTERM and SIGKILL; 0 kills immediately
    pub kill_grace_seconds: Option<u64>,

    /// Strip ANSI escape sequences from captured lines
    pub strip_ansi: Option<bool>,
}

/// Raw action definition
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawAction {
    /// Name passed to `run`
    pub name: String,

    /// Executable followed by arguments; `{key}` placeholders are filled from props
    pub command: Vec<String>,

    /// Logical process name (defaults to the action name)
    pub process: Option<String>,

    /// Human-readable description
    pub description: Option<String>,
}
