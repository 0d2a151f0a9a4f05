//! Linux launcher implementation

use corral_host_api::{HostResult, LaunchRequest, LaunchedProcess, ProcessLauncher};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::process::spawn_in_group;

/// Default shell used to interpret command lines
pub const DEFAULT_SHELL: &str = "/bin/sh";

/// Launches processes through a shell, each under its own tree marker
#[derive(Debug, Clone)]
pub struct LinuxLauncher {
    shell: PathBuf,
}

impl LinuxLauncher {
    pub fn new() -> Self {
        Self::with_shell(DEFAULT_SHELL)
    }

    pub fn with_shell(shell: impl Into<PathBuf>) -> Self {
        Self {
            shell: shell.into(),
        }
    }

    pub fn shell(&self) -> &Path {
        &self.shell
    }
}

impl Default for LinuxLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessLauncher for LinuxLauncher {
    fn launch(&self, request: &LaunchRequest) -> HostResult<LaunchedProcess> {
        let process = spawn_in_group(&self.shell, request)?;
        info!(pid = process.pid, pgid = ?process.pgid, shell = %self.shell.display(), "Launched process");
        Ok(process)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corral_host_api::{HostError, OutputMode, ShellPolicy};
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn launch_through_default_shell() {
        let launcher = LinuxLauncher::new();
        assert_eq!(launcher.shell(), Path::new("/bin/sh"));

        let request = LaunchRequest::new(
            vec!["echo".into(), "one".into(), "|".into(), "tr".into(), "o".into(), "0".into()],
            OutputMode::Captured,
        );
        let process = launcher.launch(&request).unwrap();

        let mut out = String::new();
        process.stdout.unwrap().read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "0ne\n");
    }

    #[tokio::test]
    async fn quoted_policy_disables_shell_syntax() {
        let launcher = LinuxLauncher::new();
        let request = LaunchRequest::new(
            vec!["echo".into(), "a".into(), "|".into(), "b".into()],
            OutputMode::Captured,
        )
        .with_shell(ShellPolicy::Quoted);
        let process = launcher.launch(&request).unwrap();

        let mut out = String::new();
        process.stdout.unwrap().read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "a | b\n");
    }

    #[tokio::test]
    async fn each_launch_gets_its_own_tree() {
        let launcher = LinuxLauncher::new();
        let request = LaunchRequest::new(vec!["true".into()], OutputMode::Captured);
        let first = launcher.launch(&request).unwrap();
        let second = launcher.launch(&request).unwrap();

        assert!(first.marker.is_some());
        assert_ne!(first.marker, second.marker);
        assert_eq!(first.pgid, Some(first.pid));
    }

    #[tokio::test]
    async fn launch_with_missing_shell() {
        let launcher = LinuxLauncher::with_shell("/definitely/not/a/shell");
        let request = LaunchRequest::new(vec!["true".into()], OutputMode::Inherited);
        assert!(matches!(
            launcher.launch(&request),
            Err(HostError::SpawnFailed(_))
        ));
    }
}
