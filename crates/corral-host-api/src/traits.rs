//! Host capability traits

use async_trait::async_trait;
use corral_util::RunMode;
use std::time::Duration;
use thiserror::Error;

use crate::{LaunchedProcess, ProcessTree};

/// Errors from host operations
#[derive(Debug, Error)]
pub enum HostError {
    #[error("Spawn failed: {0}")]
    SpawnFailed(String),

    #[error("Kill failed: {0}")]
    KillFailed(String),

    #[error("Process not found: {0}")]
    ProcessNotFound(u32),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type HostResult<T> = Result<T, HostError>;

/// How a process tree is terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillMode {
    /// SIGTERM, wait up to `timeout`, then SIGKILL what is left
    Graceful { timeout: Duration },
    /// SIGKILL immediately
    Force,
}

impl KillMode {
    /// Build from a grace period in seconds; zero means `Force`
    pub fn from_grace_seconds(seconds: u64) -> Self {
        if seconds == 0 {
            Self::Force
        } else {
            Self::Graceful {
                timeout: Duration::from_secs(seconds),
            }
        }
    }
}

impl Default for KillMode {
    fn default() -> Self {
        Self::Graceful {
            timeout: Duration::from_secs(5),
        }
    }
}

/// Where a child's stdio goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// stdout/stderr piped back to the supervisor
    Captured,
    /// stdio shared with the host terminal
    Inherited,
}

impl OutputMode {
    pub fn for_mode(mode: RunMode) -> Self {
        if mode.captures_output() {
            Self::Captured
        } else {
            Self::Inherited
        }
    }

    pub fn is_captured(&self) -> bool {
        matches!(self, Self::Captured)
    }
}

/// How command parts are handed to the shell
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ShellPolicy {
    /// Parts are joined verbatim; pipes, globs and expansions work.
    /// Untrusted input can inject commands.
    #[default]
    Raw,
    /// Every part is shell-quoted, giving plain argv semantics
    Quoted,
}

/// A request to start one process through the shell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    /// Executable followed by its arguments
    pub argv: Vec<String>,
    pub output: OutputMode,
    pub shell: ShellPolicy,
}

impl LaunchRequest {
    pub fn new(argv: Vec<String>, output: OutputMode) -> Self {
        Self {
            argv,
            output,
            shell: ShellPolicy::default(),
        }
    }

    pub fn with_shell(mut self, shell: ShellPolicy) -> Self {
        self.shell = shell;
        self
    }

    /// The executable, if any
    pub fn program(&self) -> Option<&str> {
        self.argv.first().map(String::as_str)
    }
}

/// Creates OS processes on behalf of a supervisor
pub trait ProcessLauncher: Send + Sync {
    /// Start a process. Must be called from within a Tokio runtime.
    fn launch(&self, request: &LaunchRequest) -> HostResult<LaunchedProcess>;
}

/// Terminates a process and all of its descendants
#[async_trait]
pub trait TreeKiller: Send + Sync {
    /// Resolves once the whole tree is confirmed gone
    ///
    /// The root may already have exited. Its descendants must still be
    /// found through the tree's group or marker, and a reused root pid
    /// must not be signalled.
    async fn kill_tree(&self, tree: &ProcessTree) -> HostResult<()>;
}

/// Control over the host process itself
pub trait HostControl: Send + Sync {
    /// Make sure the host is not blocked on pending input during shutdown
    fn resume_input(&self) {}

    /// End the host process with the given code
    fn exit(&self, code: i32);
}
