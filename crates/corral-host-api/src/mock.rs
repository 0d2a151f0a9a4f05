//! Mock host capabilities for testing

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

use crate::{
    ExitStatus, HostControl, HostError, HostResult, LaunchRequest, LaunchedProcess,
    OutputStream, ProcessLauncher, ProcessTree, TreeKiller,
};

/// Canned behaviour for a mock program, keyed by executable name
#[derive(Debug, Clone, Default)]
pub struct MockScript {
    /// Bytes the process writes to stdout
    pub stdout: Vec<u8>,
    /// Bytes the process writes to stderr
    pub stderr: Vec<u8>,
    /// Exit immediately with this status; `None` keeps it running until killed
    pub exit: Option<ExitStatus>,
}

impl MockScript {
    pub fn stdout(text: &str) -> Self {
        Self {
            stdout: text.as_bytes().to_vec(),
            ..Self::default()
        }
    }

    pub fn stderr(text: &str) -> Self {
        Self {
            stderr: text.as_bytes().to_vec(),
            ..Self::default()
        }
    }

    pub fn exiting(mut self, status: ExitStatus) -> Self {
        self.exit = Some(status);
        self
    }
}

/// Mock process state
#[derive(Debug)]
struct MockProcess {
    argv: Vec<String>,
    running: bool,
    exit_tx: Option<oneshot::Sender<ExitStatus>>,
}

type ProcessTable = Arc<Mutex<HashMap<u32, MockProcess>>>;

/// Mock launcher that fabricates processes in memory
pub struct MockLauncher {
    next_pid: AtomicU32,
    table: ProcessTable,
    scripts: Arc<Mutex<HashMap<String, MockScript>>>,
    launched: Arc<Mutex<Vec<LaunchRequest>>>,

    /// Configure launch to fail
    pub fail_spawn: Arc<Mutex<bool>>,
}

impl MockLauncher {
    pub fn new() -> Self {
        Self {
            next_pid: AtomicU32::new(1000),
            table: Arc::new(Mutex::new(HashMap::new())),
            scripts: Arc::new(Mutex::new(HashMap::new())),
            launched: Arc::new(Mutex::new(Vec::new())),
            fail_spawn: Arc::new(Mutex::new(false)),
        }
    }

    /// Register canned behaviour for an executable name
    pub fn script(&self, program: impl Into<String>, script: MockScript) {
        self.scripts.lock().unwrap().insert(program.into(), script);
    }

    /// A tree killer that terminates processes from this launcher
    pub fn killer(&self) -> MockTreeKiller {
        MockTreeKiller::with_table(self.table.clone())
    }

    /// Every launch request seen so far, in order
    pub fn launched(&self) -> Vec<LaunchRequest> {
        self.launched.lock().unwrap().clone()
    }

    /// Pids of processes that have not exited
    pub fn running_pids(&self) -> Vec<u32> {
        let mut pids: Vec<u32> = self
            .table
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, p)| p.running)
            .map(|(pid, _)| *pid)
            .collect();
        pids.sort_unstable();
        pids
    }

    pub fn is_running(&self, pid: u32) -> bool {
        self.table
            .lock()
            .unwrap()
            .get(&pid)
            .is_some_and(|p| p.running)
    }

    /// Command line a pid was launched with
    pub fn argv_of(&self, pid: u32) -> Option<Vec<String>> {
        self.table.lock().unwrap().get(&pid).map(|p| p.argv.clone())
    }

    /// Simulate the process exiting on its own
    pub fn simulate_exit(&self, pid: u32, status: ExitStatus) {
        let mut table = self.table.lock().unwrap();
        if let Some(process) = table.get_mut(&pid) {
            process.running = false;
            if let Some(tx) = process.exit_tx.take() {
                let _ = tx.send(status);
            }
        }
    }
}

impl Default for MockLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessLauncher for MockLauncher {
    fn launch(&self, request: &LaunchRequest) -> HostResult<LaunchedProcess> {
        self.launched.lock().unwrap().push(request.clone());

        if *self.fail_spawn.lock().unwrap() {
            return Err(HostError::SpawnFailed("Mock spawn failure".into()));
        }

        let Some(program) = request.program() else {
            return Err(HostError::SpawnFailed("Empty argv".into()));
        };

        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(program)
            .cloned()
            .unwrap_or_default();

        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
        let (exit_tx, exit_rx) = oneshot::channel();

        let (stdout, stderr): (Option<OutputStream>, Option<OutputStream>) =
            if request.output.is_captured() {
                (
                    Some(Box::pin(Cursor::new(script.stdout)) as OutputStream),
                    Some(Box::pin(Cursor::new(script.stderr)) as OutputStream),
                )
            } else {
                (None, None)
            };

        let mut process = MockProcess {
            argv: request.argv.clone(),
            running: true,
            exit_tx: Some(exit_tx),
        };

        if let Some(status) = script.exit {
            process.running = false;
            if let Some(tx) = process.exit_tx.take() {
                let _ = tx.send(status);
            }
        }

        self.table.lock().unwrap().insert(pid, process);

        // Captured children get their own group, like the real launcher
        let pgid = request.output.is_captured().then_some(pid);

        Ok(LaunchedProcess {
            pid,
            pgid,
            marker: Some(format!("mock-{}", pid)),
            stdout,
            stderr,
            exit: exit_rx,
        })
    }
}

/// Mock tree killer that records every request
pub struct MockTreeKiller {
    table: ProcessTable,
    killed: Arc<Mutex<Vec<ProcessTree>>>,

    /// Pids whose termination should fail
    pub fail_pids: Arc<Mutex<HashSet<u32>>>,
}

impl MockTreeKiller {
    /// A killer not attached to any launcher; every kill succeeds
    pub fn new() -> Self {
        Self::with_table(Arc::new(Mutex::new(HashMap::new())))
    }

    fn with_table(table: ProcessTable) -> Self {
        Self {
            table,
            killed: Arc::new(Mutex::new(Vec::new())),
            fail_pids: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Root pids passed to `kill_tree`, in call order
    pub fn killed(&self) -> Vec<u32> {
        self.killed.lock().unwrap().iter().map(|t| t.pid).collect()
    }

    /// Full trees passed to `kill_tree`, in call order
    pub fn killed_trees(&self) -> Vec<ProcessTree> {
        self.killed.lock().unwrap().clone()
    }

    pub fn fail_for(&self, pid: u32) {
        self.fail_pids.lock().unwrap().insert(pid);
    }
}

impl Default for MockTreeKiller {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TreeKiller for MockTreeKiller {
    async fn kill_tree(&self, tree: &ProcessTree) -> HostResult<()> {
        let pid = tree.pid;
        self.killed.lock().unwrap().push(tree.clone());

        if self.fail_pids.lock().unwrap().contains(&pid) {
            return Err(HostError::KillFailed(format!("Mock kill failure for {}", pid)));
        }

        let mut table = self.table.lock().unwrap();
        if let Some(process) = table.get_mut(&pid) {
            process.running = false;
            if let Some(tx) = process.exit_tx.take() {
                let _ = tx.send(ExitStatus::signaled(15)); // SIGTERM
            }
        }

        Ok(())
    }
}

/// Calls observed by [`MockHostControl`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostCall {
    ResumeInput,
    Exit(i32),
}

/// Mock host control that records instead of exiting
#[derive(Default)]
pub struct MockHostControl {
    calls: Arc<Mutex<Vec<HostCall>>>,
}

impl MockHostControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Exit codes requested so far
    pub fn exit_codes(&self) -> Vec<i32> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                HostCall::Exit(code) => Some(code),
                HostCall::ResumeInput => None,
            })
            .collect()
    }
}

impl HostControl for MockHostControl {
    fn resume_input(&self) {
        self.calls.lock().unwrap().push(HostCall::ResumeInput);
    }

    fn exit(&self, code: i32) {
        self.calls.lock().unwrap().push(HostCall::Exit(code));
    }
}
