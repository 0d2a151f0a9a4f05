//! The supervisor: tracks named child processes and their output

use async_trait::async_trait;
use corral_host_api::{
    ExitStatus, LaunchRequest, OutputMode, ProcessLauncher, ProcessTree, ShellPolicy, TreeKiller,
};
use corral_util::{ProcessName, RunMode};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{Notify, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, warn};

use crate::{
    ActionCatalog, ActionSignal, Cleanup, EventLog, ExitTrigger, IdentityHook, LineHook, LogKind,
    OutputSink, ProcessRegistry, Props, SupervisorError, SupervisorEvent, SupervisorResult,
    TriggerSender, pump_lines,
};

/// How long `clean` waits for output pumps to reach EOF
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Termination state of a tracked process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    /// A tree kill is in flight
    Stopping,
    Killed,
    Exited(ExitStatus),
}

/// A spawned process tracked by a supervisor
///
/// Cloning shares the termination state.
#[derive(Clone)]
pub struct ProcessHandle {
    name: ProcessName,
    tree: ProcessTree,
    captured: bool,
    state: Arc<Mutex<ProcessState>>,
}

impl ProcessHandle {
    fn new(name: ProcessName, tree: ProcessTree, captured: bool) -> Self {
        Self {
            name,
            tree,
            captured,
            state: Arc::new(Mutex::new(ProcessState::Running)),
        }
    }

    pub fn name(&self) -> &ProcessName {
        &self.name
    }

    pub fn pid(&self) -> u32 {
        self.tree.pid
    }

    /// What the tree killer needs to find this process's descendants
    pub fn tree(&self) -> &ProcessTree {
        &self.tree
    }

    /// Whether stdout/stderr are piped into events
    pub fn is_captured(&self) -> bool {
        self.captured
    }

    pub fn state(&self) -> ProcessState {
        *lock(&self.state)
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state(), ProcessState::Running | ProcessState::Stopping)
    }

    /// Record an observed exit. Returns true when the process ended on its own.
    fn mark_exited(&self, status: ExitStatus) -> bool {
        let mut state = lock(&self.state);
        match *state {
            ProcessState::Running => {
                *state = ProcessState::Exited(status);
                true
            }
            _ => false,
        }
    }

    /// Returns false once the tree has been killed
    fn begin_stop(&self) -> bool {
        let mut state = lock(&self.state);
        match *state {
            ProcessState::Running | ProcessState::Stopping => {
                *state = ProcessState::Stopping;
                true
            }
            // The root is gone, its background children may not be
            ProcessState::Exited(_) => true,
            ProcessState::Killed => false,
        }
    }

    fn finish_stop(&self, killed: bool) {
        let mut state = lock(&self.state);
        if *state == ProcessState::Stopping {
            *state = if killed {
                ProcessState::Killed
            } else {
                ProcessState::Running
            };
        }
    }
}

impl fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("name", &self.name)
            .field("tree", &self.tree)
            .field("captured", &self.captured)
            .field("state", &self.state())
            .finish()
    }
}

/// Construction options for a [`Supervisor`]
#[derive(Clone)]
pub struct SupervisorOptions {
    /// Label used in diagnostics
    pub label: String,
    pub mode: RunMode,
    pub shell: ShellPolicy,
    /// Applied to every line before it is emitted
    pub line_hook: Arc<dyn LineHook>,
}

impl SupervisorOptions {
    pub fn new(mode: RunMode) -> Self {
        Self {
            label: "supervisor".into(),
            mode,
            shell: ShellPolicy::default(),
            line_hook: Arc::new(IdentityHook),
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn shell(mut self, shell: ShellPolicy) -> Self {
        self.shell = shell;
        self
    }

    pub fn line_hook(mut self, hook: impl LineHook + 'static) -> Self {
        self.line_hook = Arc::new(hook);
        self
    }
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self::new(RunMode::default())
    }
}

/// Owns a set of named child processes and emits their output as events
pub struct Supervisor {
    label: String,
    mode: RunMode,
    shell: ShellPolicy,
    launcher: Arc<dyn ProcessLauncher>,
    killer: Arc<dyn TreeKiller>,
    actions: Arc<dyn ActionCatalog>,
    log: EventLog,
    events: Mutex<Option<mpsc::UnboundedReceiver<SupervisorEvent>>>,
    processes: Mutex<HashMap<ProcessName, ProcessHandle>>,
    /// Handles displaced by a reused name; still terminated by `clean`
    detached: Mutex<Vec<ProcessHandle>>,
    /// Woken whenever a tracked process stops running
    idle: Arc<Notify>,
    /// Output readers that have not been awaited yet
    pumps: Mutex<Vec<JoinHandle<()>>>,
    triggers: TriggerSender,
}

impl Supervisor {
    /// Create a supervisor and register it for exit cleanup
    pub fn new(
        registry: &ProcessRegistry,
        launcher: Arc<dyn ProcessLauncher>,
        killer: Arc<dyn TreeKiller>,
        actions: Arc<dyn ActionCatalog>,
        options: SupervisorOptions,
    ) -> Arc<Self> {
        let (log, rx) = EventLog::new(options.line_hook);

        let supervisor = Arc::new(Self {
            label: options.label,
            mode: options.mode,
            shell: options.shell,
            launcher,
            killer,
            actions,
            log,
            events: Mutex::new(Some(rx)),
            processes: Mutex::new(HashMap::new()),
            detached: Mutex::new(Vec::new()),
            idle: Arc::new(Notify::new()),
            pumps: Mutex::new(Vec::new()),
            triggers: registry.trigger_sender(),
        });

        registry.register(supervisor.clone());
        supervisor
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    /// Take the event stream. Only the first caller gets it.
    pub fn subscribe(&self) -> Option<mpsc::UnboundedReceiver<SupervisorEvent>> {
        lock(&self.events).take()
    }

    /// Spawn `command` through the shell and track it as `id`
    ///
    /// Reusing a tracked name replaces the mapping entry; the displaced
    /// process stays under supervision until `clean`.
    pub fn spawn<I, S>(&self, id: impl Into<ProcessName>, command: I) -> SupervisorResult<ProcessHandle>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = id.into();
        let argv: Vec<String> = command.into_iter().map(Into::into).collect();
        let request =
            LaunchRequest::new(argv, OutputMode::for_mode(self.mode)).with_shell(self.shell);

        let launched = match self.launcher.launch(&request) {
            Ok(launched) => launched,
            Err(e) => {
                let err = SupervisorError::SpawnFailed {
                    name: name.clone(),
                    reason: e.to_string(),
                };
                warn!(supervisor = %self.label, name = %name, error = %e, "Spawn failed");
                self.log(&err.to_string(), LogKind::Error);
                return Err(err);
            }
        };

        let handle = ProcessHandle::new(name.clone(), launched.tree(), request.output.is_captured());

        // Tracked before anything can observe its exit
        let previous = lock(&self.processes).insert(name.clone(), handle.clone());
        if let Some(previous) = previous {
            warn!(
                supervisor = %self.label,
                name = %name,
                previous_pid = previous.pid(),
                "Process name reused, previous process detached"
            );
            lock(&self.detached).push(previous);
        }

        {
            let mut pumps = lock(&self.pumps);
            pumps.retain(|pump| !pump.is_finished());
            if let Some(stdout) = launched.stdout {
                pumps.push(tokio::spawn(pump_lines(stdout, self.log.clone(), LogKind::Data)));
            }
            if let Some(stderr) = launched.stderr {
                pumps.push(tokio::spawn(pump_lines(stderr, self.log.clone(), LogKind::Error)));
            }
        }

        let forward = self.mode.forwards_child_exit().then(|| self.triggers.clone());
        tokio::spawn(watch_exit(handle.clone(), launched.exit, forward, self.idle.clone()));

        info!(
            supervisor = %self.label,
            name = %name,
            pid = handle.pid(),
            captured = handle.is_captured(),
            "Process spawned"
        );

        Ok(handle)
    }

    /// Emit `line` as a `kind` event after applying the line hook
    pub fn log(&self, line: &str, kind: LogKind) {
        self.log.log(line, kind);
    }

    /// Run the named action
    ///
    /// Emits a clear signal and an announcement before the handler runs.
    pub fn run(&self, name: &str, props: Props) -> SupervisorResult<()> {
        let action = self
            .actions
            .find(name)
            .ok_or_else(|| SupervisorError::UnknownAction(name.to_string()))?;

        self.log.emit(SupervisorEvent::Action(ActionSignal::Clear));
        self.log(&format!("Running action {}", name), LogKind::Data);
        info!(supervisor = %self.label, action = name, "Running action");

        action.on_run(self, &props)
    }

    /// Terminate the named process and its descendants
    pub async fn kill(&self, name: &str) -> SupervisorResult<()> {
        let handle = self
            .get(name)
            .ok_or_else(|| SupervisorError::UnknownProcess(ProcessName::new(name)))?;

        self.log(&format!("Killing process {}", name), LogKind::Data);

        if let Err(e) = self.terminate(&handle).await {
            self.log(&e.to_string(), LogKind::Error);
            return Err(e);
        }

        self.untrack(&handle);
        self.log(&format!("Action {} killed successfully", name), LogKind::Data);
        Ok(())
    }

    /// Terminate every tracked process, waiting for each to be confirmed
    ///
    /// A failure does not stop the remaining terminations; all failures are
    /// returned together. Output already written by the children is emitted
    /// before this returns.
    pub async fn clean(&self) -> SupervisorResult<()> {
        let mut handles: Vec<ProcessHandle> = lock(&self.detached).clone();
        let mut tracked: Vec<ProcessHandle> = lock(&self.processes).values().cloned().collect();
        tracked.sort_by(|a, b| a.name().cmp(b.name()));
        handles.extend(tracked);

        if handles.is_empty() {
            self.drain_output().await;
            return Ok(());
        }

        debug!(supervisor = %self.label, count = handles.len(), "Cleaning processes");

        let mut failures = Vec::new();
        for handle in handles {
            match self.terminate(&handle).await {
                Ok(()) => self.untrack(&handle),
                Err(e) => {
                    self.log(&e.to_string(), LogKind::Error);
                    failures.push(e);
                }
            }
        }

        self.drain_output().await;

        if failures.is_empty() {
            info!(supervisor = %self.label, "All processes terminated");
            Ok(())
        } else {
            Err(SupervisorError::CleanupFailed { failures })
        }
    }

    /// Wait until no tracked or detached process is running
    ///
    /// Returns at once when nothing was ever spawned.
    pub async fn wait_idle(&self) {
        loop {
            // Registered before the check so no wakeup is missed
            let notified = self.idle.notified();
            if !self.has_running() {
                debug!(supervisor = %self.label, "No process running");
                return;
            }
            notified.await;
        }
    }

    /// End the event stream once the subscriber has read what is queued
    pub fn close_events(&self) {
        self.log.close();
    }

    /// Wait for output readers to hit EOF
    async fn drain_output(&self) {
        let pumps = std::mem::take(&mut *lock(&self.pumps));
        let deadline = Instant::now() + OUTPUT_DRAIN_TIMEOUT;

        for pump in pumps {
            if timeout_at(deadline, pump).await.is_err() {
                warn!(supervisor = %self.label, "Output still open after cleanup, not waiting");
                return;
            }
        }
    }

    fn has_running(&self) -> bool {
        lock(&self.processes).values().any(ProcessHandle::is_running)
            || lock(&self.detached).iter().any(ProcessHandle::is_running)
    }

    /// Handle for a tracked name
    pub fn get(&self, name: &str) -> Option<ProcessHandle> {
        lock(&self.processes).get(name).cloned()
    }

    pub fn is_tracked(&self, name: &str) -> bool {
        lock(&self.processes).contains_key(name)
    }

    /// Tracked names, sorted
    pub fn names(&self) -> Vec<ProcessName> {
        let mut names: Vec<ProcessName> = lock(&self.processes).keys().cloned().collect();
        names.sort();
        names
    }

    async fn terminate(&self, handle: &ProcessHandle) -> SupervisorResult<()> {
        if !handle.begin_stop() {
            debug!(name = %handle.name(), pid = handle.pid(), "Process tree already killed");
            return Ok(());
        }

        match self.killer.kill_tree(handle.tree()).await {
            Ok(()) => {
                handle.finish_stop(true);
                self.idle.notify_waiters();
                info!(name = %handle.name(), pid = handle.pid(), "Process tree terminated");
                Ok(())
            }
            Err(e) => {
                handle.finish_stop(false);
                warn!(name = %handle.name(), pid = handle.pid(), error = %e, "Process tree termination failed");
                Err(SupervisorError::TerminationFailed {
                    name: handle.name().clone(),
                    pid: handle.pid(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Drop a terminated handle, unless its name now maps to a newer process
    fn untrack(&self, handle: &ProcessHandle) {
        {
            let mut processes = lock(&self.processes);
            if processes.get(handle.name()).is_some_and(|h| h.pid() == handle.pid()) {
                processes.remove(handle.name());
            }
        }
        lock(&self.detached).retain(|h| h.pid() != handle.pid());
    }
}

impl OutputSink for Supervisor {
    fn on_data(&self, line: &str) {
        self.log(line, LogKind::Data);
    }

    fn on_error(&self, line: &str) {
        self.log(line, LogKind::Error);
    }
}

#[async_trait]
impl Cleanup for Supervisor {
    fn label(&self) -> &str {
        &self.label
    }

    async fn clean(&self) -> SupervisorResult<()> {
        Supervisor::clean(self).await
    }
}

impl fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Supervisor")
            .field("label", &self.label)
            .field("mode", &self.mode)
            .field("processes", &self.names())
            .finish()
    }
}

async fn watch_exit(
    handle: ProcessHandle,
    exit: oneshot::Receiver<ExitStatus>,
    forward: Option<TriggerSender>,
    idle: Arc<Notify>,
) {
    let Ok(status) = exit.await else {
        debug!(name = %handle.name(), pid = handle.pid(), "Exit not observable");
        return;
    };

    let natural = handle.mark_exited(status);
    info!(name = %handle.name(), pid = handle.pid(), status = %status, natural = natural, "Process exited");
    idle.notify_waiters();

    if !natural {
        return;
    }
    if let Some(triggers) = forward {
        triggers.fire(ExitTrigger::ChildExited {
            name: handle.name().clone(),
            status,
        });
    }
}
