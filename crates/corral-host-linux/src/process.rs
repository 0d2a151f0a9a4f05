//! Process spawning utilities

use corral_host_api::{
    ExitStatus, HostError, HostResult, LaunchRequest, LaunchedProcess, OutputMode, OutputStream,
    ShellPolicy, TREE_MARKER_ENV,
};
use nix::unistd::{setpgid, Pid};
use std::borrow::Cow;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::process::Command;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Build the command line handed to `<shell> -c`
pub fn command_line(argv: &[String], policy: ShellPolicy) -> HostResult<String> {
    match argv.first() {
        None => return Err(HostError::SpawnFailed("Empty argv".into())),
        Some(program) if program.trim().is_empty() => {
            return Err(HostError::SpawnFailed("Empty program name".into()));
        }
        Some(_) => {}
    }

    let line = match policy {
        ShellPolicy::Raw => argv.join(" "),
        ShellPolicy::Quoted => argv
            .iter()
            .map(|part| shell_escape::unix::escape(Cow::from(part.as_str())).into_owned())
            .collect::<Vec<_>>()
            .join(" "),
    };

    Ok(line)
}

static NEXT_TREE: AtomicU64 = AtomicU64::new(1);

/// A tree marker unique within this host process
pub fn next_tree_marker() -> String {
    format!("{}-{}", std::process::id(), NEXT_TREE.fetch_add(1, Ordering::Relaxed))
}

/// Spawn a request through `shell`
///
/// Captured children lead their own process group, so the pid doubles as
/// the group id. Inherited children stay in the host's group and keep the
/// terminal's foreground. Every child carries a fresh tree marker in its
/// environment. A background task reaps it and reports the exit status.
pub fn spawn_in_group(shell: &Path, request: &LaunchRequest) -> HostResult<LaunchedProcess> {
    let line = command_line(&request.argv, request.shell)?;
    let marker = next_tree_marker();

    let mut cmd = Command::new(shell);
    cmd.arg("-c").arg(&line);
    cmd.env(TREE_MARKER_ENV, &marker);

    match request.output {
        OutputMode::Captured => {
            cmd.stdin(Stdio::null());
            cmd.stdout(Stdio::piped());
            cmd.stderr(Stdio::piped());

            // SAFETY: setpgid is async-signal-safe and touches no parent state
            unsafe {
                cmd.pre_exec(|| {
                    setpgid(Pid::from_raw(0), Pid::from_raw(0)).map_err(std::io::Error::from)?;
                    Ok(())
                });
            }
        }
        OutputMode::Inherited => {
            cmd.stdin(Stdio::inherit());
            cmd.stdout(Stdio::inherit());
            cmd.stderr(Stdio::inherit());
        }
    }

    let mut child = cmd
        .spawn()
        .map_err(|e| HostError::SpawnFailed(format!("Failed to spawn '{}': {}", line, e)))?;

    let pid = child
        .id()
        .ok_or_else(|| HostError::Internal("Spawned process has no pid".into()))?;

    let stdout = child
        .stdout
        .take()
        .map(|s| Box::pin(s) as OutputStream);
    let stderr = child
        .stderr
        .take()
        .map(|s| Box::pin(s) as OutputStream);

    let pgid = request.output.is_captured().then_some(pid);

    debug!(pid = pid, marker = %marker, command = %line, captured = pgid.is_some(), "Process spawned");

    let (exit_tx, exit_rx) = oneshot::channel();
    tokio::spawn(async move {
        match child.wait().await {
            Ok(status) => {
                let status = convert_status(status);
                debug!(pid = pid, status = %status, "Process reaped");
                let _ = exit_tx.send(status);
            }
            Err(e) => {
                warn!(pid = pid, error = %e, "Wait failed");
            }
        }
    });

    Ok(LaunchedProcess {
        pid,
        pgid,
        marker: Some(marker),
        stdout,
        stderr,
        exit: exit_rx,
    })
}

/// Convert a std exit status
pub fn convert_status(status: std::process::ExitStatus) -> ExitStatus {
    if let Some(code) = status.code() {
        return ExitStatus::with_code(code);
    }

    use std::os::unix::process::ExitStatusExt;
    match status.signal() {
        Some(sig) => ExitStatus::signaled(sig),
        None => ExitStatus::with_code(-1),
    }
}
