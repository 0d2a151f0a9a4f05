//! Process-tree termination

use async_trait::async_trait;
use corral_host_api::{HostError, HostResult, KillMode, ProcessTree, TreeKiller};
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::collections::BTreeSet;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::tree::{TreeMembers, collect_tree, is_alive};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Terminates a process, its process group and all descendants
#[derive(Debug, Clone)]
pub struct LinuxTreeKiller {
    mode: KillMode,
    poll_interval: Duration,
}

impl LinuxTreeKiller {
    pub fn new(mode: KillMode) -> Self {
        Self {
            mode,
            poll_interval: POLL_INTERVAL,
        }
    }

    pub fn mode(&self) -> KillMode {
        self.mode
    }

    /// Wait until none of `pids` is alive. `None` waits without limit.
    /// Returns false if the deadline passed first.
    async fn wait_gone(&self, pids: &BTreeSet<u32>, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            if pids.iter().all(|&pid| !is_alive(pid)) {
                return true;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return false;
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

impl Default for LinuxTreeKiller {
    fn default() -> Self {
        Self::new(KillMode::default())
    }
}

/// Send `sig` to the tree's group, when it has one, and to every member.
///
/// Vanished processes are fine; the first real failure is reported after
/// every target has been tried.
fn signal_tree(members: &TreeMembers, sig: Signal) -> HostResult<()> {
    let mut failure = None;

    if let Some(pgid) = members.group {
        match signal::killpg(Pid::from_raw(pgid as i32), sig) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(e) => {
                warn!(pgid = pgid, signal = ?sig, error = %e, "Failed to signal process group");
                failure.get_or_insert(format!("{} to group {}: {}", sig, pgid, e));
            }
        }
    }

    for &pid in &members.pids {
        match signal::kill(Pid::from_raw(pid as i32), sig) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(e) => {
                warn!(pid = pid, signal = ?sig, error = %e, "Failed to signal process");
                failure.get_or_insert(format!("{} to {}: {}", sig, pid, e));
            }
        }
    }

    debug!(group = ?members.group, signal = ?sig, targets = members.pids.len(), "Signalled process tree");

    match failure {
        Some(msg) => Err(HostError::KillFailed(msg)),
        None => Ok(()),
    }
}

#[async_trait]
impl TreeKiller for LinuxTreeKiller {
    async fn kill_tree(&self, tree: &ProcessTree) -> HostResult<()> {
        let pid = tree.pid;
        if pid == 0 {
            return Err(HostError::ProcessNotFound(pid));
        }

        let mut members = collect_tree(tree);
        if members.is_empty() {
            debug!(pid = pid, "Nothing left of process tree");
            return Ok(());
        }

        if let KillMode::Graceful { timeout } = self.mode {
            signal_tree(&members, Signal::SIGTERM)?;
            if self.wait_gone(&members.pids, Some(timeout)).await {
                debug!(pid = pid, "Process tree exited after SIGTERM");
                return Ok(());
            }

            // Catch anything forked while we were waiting
            members.merge(collect_tree(tree));
            info!(pid = pid, timeout = ?timeout, "Process tree ignored SIGTERM, sending SIGKILL");
        }

        let survivors = TreeMembers {
            pids: members.pids.iter().copied().filter(|&p| is_alive(p)).collect(),
            group: members.group,
        };
        signal_tree(&survivors, Signal::SIGKILL)?;
        self.wait_gone(&members.pids, None).await;

        debug!(pid = pid, "Process tree killed");
        Ok(())
    }
}
