//! Launched process handle and exit status

use serde::{Deserialize, Serialize};
use std::fmt;
use std::pin::Pin;
use tokio::io::AsyncRead;
use tokio::sync::oneshot;

/// A readable child output stream
pub type OutputStream = Pin<Box<dyn AsyncRead + Send>>;

/// Environment variable a launcher sets on every child; descendants inherit it
pub const TREE_MARKER_ENV: &str = "CORRAL_TREE";

/// What a tree killer needs to find a launched tree again
///
/// The root pid alone is not enough once the root has been reaped: its pid
/// may be reused and its descendants are reparented. The process group and
/// the inherited marker still identify what is left.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProcessTree {
    pub pid: u32,
    /// Process group led by the root, if the launcher created one
    pub pgid: Option<u32>,
    /// Value of [`TREE_MARKER_ENV`] given to the root
    pub marker: Option<String>,
}

impl ProcessTree {
    pub fn new(pid: u32) -> Self {
        Self {
            pid,
            pgid: None,
            marker: None,
        }
    }

    pub fn with_group(mut self, pgid: u32) -> Self {
        self.pgid = Some(pgid);
        self
    }

    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = Some(marker.into());
        self
    }
}

/// A process freshly created by a [`crate::ProcessLauncher`]
///
/// The output streams are present only in captured mode. `exit` fires once
/// the launcher has reaped the child; it is dropped without a value if the
/// launcher could not observe the exit.
pub struct LaunchedProcess {
    pub pid: u32,
    /// Set when the child leads its own process group
    pub pgid: Option<u32>,
    /// Tree marker set in the child's environment
    pub marker: Option<String>,
    pub stdout: Option<OutputStream>,
    pub stderr: Option<OutputStream>,
    pub exit: oneshot::Receiver<ExitStatus>,
}

impl LaunchedProcess {
    pub fn tree(&self) -> ProcessTree {
        ProcessTree {
            pid: self.pid,
            pgid: self.pgid,
            marker: self.marker.clone(),
        }
    }
}

impl fmt::Debug for LaunchedProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LaunchedProcess")
            .field("pid", &self.pid)
            .field("pgid", &self.pgid)
            .field("marker", &self.marker)
            .field("stdout", &self.stdout.is_some())
            .field("stderr", &self.stderr.is_some())
            .finish()
    }
}

/// Exit status of a child process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitStatus {
    /// Exit code if the process exited normally
    pub code: Option<i32>,

    /// Signal number if the process was signaled
    pub signal: Option<i32>,
}

impl ExitStatus {
    pub fn success() -> Self {
        Self {
            code: Some(0),
            signal: None,
        }
    }

    pub fn with_code(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    pub fn signaled(signal: i32) -> Self {
        Self {
            code: None,
            signal: Some(signal),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }

    /// Shell-style numeric status: the exit code, or `128 + signal`
    pub fn as_exit_code(&self) -> i32 {
        match (self.code, self.signal) {
            (Some(code), _) => code,
            (None, Some(signal)) => 128 + signal,
            (None, None) => 1,
        }
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {}", code),
            (None, Some(signal)) => write!(f, "signal {}", signal),
            (None, None) => f.write_str("unknown status"),
        }
    }
}
