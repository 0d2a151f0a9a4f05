//! Exit coordination: clean every supervisor before the host exits

use corral_host_api::{ExitStatus, HostControl};
use corral_util::{ProcessName, RunMode};
use std::any::Any;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::signal::unix::{SignalKind, signal};
use tracing::{debug, error, info, warn};

use crate::{ProcessRegistry, SupervisorError, SupervisorResult};

/// Host signals that end the host process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostSignal {
    Interrupt,
    Terminate,
    /// Commonly sent right before a restart
    User1,
    User2,
}

impl HostSignal {
    pub fn name(&self) -> &'static str {
        match self {
            HostSignal::Interrupt => "SIGINT",
            HostSignal::Terminate => "SIGTERM",
            HostSignal::User1 => "SIGUSR1",
            HostSignal::User2 => "SIGUSR2",
        }
    }
}

impl fmt::Display for HostSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Why the host is shutting down
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitTrigger {
    /// Explicit exit with a code
    Exit(i32),
    /// A supervised child ended on its own
    ChildExited { name: ProcessName, status: ExitStatus },
    Signal(HostSignal),
    /// Unhandled fault in the host
    Fault(String),
}

impl ExitTrigger {
    /// Host exit code for this trigger
    pub fn exit_code(&self) -> i32 {
        match self {
            ExitTrigger::Exit(code) => *code,
            ExitTrigger::ChildExited { status, .. } => status.as_exit_code(),
            ExitTrigger::Signal(_) => 0,
            ExitTrigger::Fault(_) => 1,
        }
    }
}

impl fmt::Display for ExitTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitTrigger::Exit(code) => write!(f, "exit({})", code),
            ExitTrigger::ChildExited { name, status } => write!(f, "{} exited with {}", name, status),
            ExitTrigger::Signal(signal) => write!(f, "{}", signal),
            ExitTrigger::Fault(message) => write!(f, "fault: {}", message),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Idle,
    ShuttingDown,
    Finished,
}

/// Result of a shutdown request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// The host was told to exit with this code
    Exited(i32),
    /// Cleanup ran; ending the process is left to the embedding host
    Returned(i32),
    /// Another trigger already started shutdown; nothing was done
    AlreadyInProgress,
}

impl ShutdownOutcome {
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ShutdownOutcome::Exited(code) | ShutdownOutcome::Returned(code) => Some(*code),
            ShutdownOutcome::AlreadyInProgress => None,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Runs the shutdown sequence once per host lifetime
pub struct ExitCoordinator {
    registry: ProcessRegistry,
    mode: RunMode,
    host: Arc<dyn HostControl>,
    state: Mutex<CoordinatorState>,
}

impl ExitCoordinator {
    pub fn new(registry: ProcessRegistry, mode: RunMode, host: Arc<dyn HostControl>) -> Self {
        Self {
            registry,
            mode,
            host,
            state: Mutex::new(CoordinatorState::Idle),
        }
    }

    pub fn state(&self) -> CoordinatorState {
        *lock(&self.state)
    }

    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    /// Clean every registered supervisor, then exit the host if this
    /// coordinator owns exit
    ///
    /// Only the first trigger runs the sequence. Cleanup failures and
    /// panics are logged and never abort the remaining members.
    pub async fn shutdown(&self, trigger: ExitTrigger) -> ShutdownOutcome {
        {
            let mut state = lock(&self.state);
            if *state != CoordinatorState::Idle {
                debug!(trigger = %trigger, state = ?*state, "Shutdown already in progress");
                return ShutdownOutcome::AlreadyInProgress;
            }
            *state = CoordinatorState::ShuttingDown;
        }

        match &trigger {
            ExitTrigger::Fault(message) => error!(fault = %message, "Unhandled fault, shutting down"),
            ExitTrigger::Signal(signal) => info!(signal = %signal, "Received signal, shutting down"),
            other => info!(trigger = %other, "Shutting down"),
        }

        self.host.resume_input();

        for member in self.registry.members() {
            let label = member.label().to_string();
            let task = tokio::spawn(async move { member.clean().await });

            match task.await {
                Ok(Ok(())) => debug!(member = %label, "Cleaned"),
                Ok(Err(e)) => warn!(member = %label, error = %e, "Cleanup incomplete"),
                Err(e) => error!(member = %label, error = %e, "Cleanup task failed"),
            }
        }

        let code = trigger.exit_code();
        *lock(&self.state) = CoordinatorState::Finished;

        if self.mode.owns_exit() {
            info!(code, "Exiting");
            self.host.exit(code);
            ShutdownOutcome::Exited(code)
        } else {
            info!(code, mode = %self.mode, "Shutdown complete, exit left to host");
            ShutdownOutcome::Returned(code)
        }
    }

    /// Wait for the first host signal or exit trigger, then shut down
    ///
    /// Can only be called once per registry.
    pub async fn watch(&self) -> SupervisorResult<ShutdownOutcome> {
        let mut triggers = self
            .registry
            .take_triggers()
            .ok_or(SupervisorError::AlreadyWatching)?;

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigusr1 = signal(SignalKind::user_defined1())?;
        let mut sigusr2 = signal(SignalKind::user_defined2())?;

        debug!("Watching for exit triggers");

        let trigger = tokio::select! {
            _ = sigint.recv() => ExitTrigger::Signal(HostSignal::Interrupt),
            _ = sigterm.recv() => ExitTrigger::Signal(HostSignal::Terminate),
            _ = sigusr1.recv() => ExitTrigger::Signal(HostSignal::User1),
            _ = sigusr2.recv() => ExitTrigger::Signal(HostSignal::User2),
            received = triggers.recv() => received.unwrap_or(ExitTrigger::Exit(0)),
        };

        Ok(self.shutdown(trigger).await)
    }

    /// Route panics anywhere in the host to a fault trigger
    ///
    /// The previous hook still runs, so the panic message is printed as usual.
    pub fn install_panic_hook(&self) {
        let triggers = self.registry.trigger_sender();
        let previous = std::panic::take_hook();

        std::panic::set_hook(Box::new(move |info| {
            previous(info);
            let mut message = panic_message(info.payload());
            if let Some(location) = info.location() {
                message = format!("{} at {}", message, location);
            }
            triggers.fire(ExitTrigger::Fault(message));
        }));
    }
}

impl fmt::Debug for ExitCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExitCoordinator")
            .field("mode", &self.mode)
            .field("state", &self.state())
            .field("members", &self.registry.len())
            .finish()
    }
}

/// Text of a panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Cleanup;
    use async_trait::async_trait;
    use corral_host_api::{HostCall, MockHostControl};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    /// Records cleanup order into a shared log
    struct Recorder {
        label: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
        fail: bool,
    }

    #[async_trait]
    impl Cleanup for Recorder {
        fn label(&self) -> &str {
            self.label
        }

        async fn clean(&self) -> SupervisorResult<()> {
            self.log.lock().unwrap().push(self.label);
            if self.fail {
                return Err(SupervisorError::CleanupFailed { failures: vec![] });
            }
            Ok(())
        }
    }

    struct Panics;

    #[async_trait]
    impl Cleanup for Panics {
        fn label(&self) -> &str {
            "panics"
        }

        async fn clean(&self) -> SupervisorResult<()> {
            panic!("cleanup exploded");
        }
    }

    /// Blocks in `clean` until released
    struct Gate {
        entered: Arc<Notify>,
        release: Arc<Notify>,
        runs: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Cleanup for Gate {
        fn label(&self) -> &str {
            "gate"
        }

        async fn clean(&self) -> SupervisorResult<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            self.entered.notify_one();
            self.release.notified().await;
            Ok(())
        }
    }

    fn recorder(
        registry: &ProcessRegistry,
        log: &Arc<Mutex<Vec<&'static str>>>,
        label: &'static str,
        fail: bool,
    ) {
        registry.register(Arc::new(Recorder {
            label,
            log: log.clone(),
            fail,
        }));
    }

    fn coordinator(mode: RunMode) -> (ExitCoordinator, ProcessRegistry, Arc<MockHostControl>) {
        let registry = ProcessRegistry::new();
        let host = Arc::new(MockHostControl::new());
        let coordinator = ExitCoordinator::new(registry.clone(), mode, host.clone());
        (coordinator, registry, host)
    }

    #[test]
    fn exit_codes_follow_trigger() {
        assert_eq!(ExitTrigger::Exit(0).exit_code(), 0);
        assert_eq!(ExitTrigger::Exit(3).exit_code(), 3);
        assert_eq!(ExitTrigger::Signal(HostSignal::Interrupt).exit_code(), 0);
        assert_eq!(ExitTrigger::Fault("boom".into()).exit_code(), 1);
        assert_eq!(
            ExitTrigger::ChildExited {
                name: "build".into(),
                status: ExitStatus::with_code(2),
            }
            .exit_code(),
            2
        );
        assert_eq!(
            ExitTrigger::ChildExited {
                name: "build".into(),
                status: ExitStatus::signaled(9),
            }
            .exit_code(),
            137
        );
    }

    #[test]
    fn panic_payloads_become_text() {
        let static_str: Box<dyn Any + Send> = Box::new("static");
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let other: Box<dyn Any + Send> = Box::new(42u8);

        assert_eq!(panic_message(static_str.as_ref()), "static");
        assert_eq!(panic_message(owned.as_ref()), "owned");
        assert_eq!(panic_message(other.as_ref()), "unknown panic");
    }

    #[tokio::test]
    async fn cli_mode_cleans_in_order_then_exits() {
        let (coordinator, registry, host) = coordinator(RunMode::Cli);
        let log = Arc::new(Mutex::new(Vec::new()));
        recorder(&registry, &log, "first", false);
        recorder(&registry, &log, "second", false);

        let outcome = coordinator.shutdown(ExitTrigger::Exit(3)).await;

        assert_eq!(outcome, ShutdownOutcome::Exited(3));
        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
        assert_eq!(host.calls(), vec![HostCall::ResumeInput, HostCall::Exit(3)]);
        assert_eq!(coordinator.state(), CoordinatorState::Finished);
    }

    #[tokio::test]
    async fn embedded_mode_leaves_exit_to_host() {
        let (coordinator, registry, host) = coordinator(RunMode::Embedded);
        let log = Arc::new(Mutex::new(Vec::new()));
        recorder(&registry, &log, "only", false);

        let outcome = coordinator.shutdown(ExitTrigger::Signal(HostSignal::Terminate)).await;

        assert_eq!(outcome, ShutdownOutcome::Returned(0));
        assert_eq!(*log.lock().unwrap(), vec!["only"]);
        assert!(host.exit_codes().is_empty());
    }

    #[tokio::test]
    async fn ui_mode_leaves_exit_to_host() {
        let (coordinator, _registry, host) = coordinator(RunMode::Ui);
        let outcome = coordinator.shutdown(ExitTrigger::Fault("boom".into())).await;
        assert_eq!(outcome, ShutdownOutcome::Returned(1));
        assert!(host.exit_codes().is_empty());
    }

    #[tokio::test]
    async fn fault_exits_non_zero() {
        let (coordinator, _registry, host) = coordinator(RunMode::Cli);
        coordinator.shutdown(ExitTrigger::Fault("boom".into())).await;
        assert_eq!(host.exit_codes(), vec![1]);
    }

    #[tokio::test]
    async fn failing_member_does_not_stop_others() {
        let (coordinator, registry, host) = coordinator(RunMode::Cli);
        let log = Arc::new(Mutex::new(Vec::new()));
        recorder(&registry, &log, "broken", true);
        recorder(&registry, &log, "healthy", false);

        coordinator.shutdown(ExitTrigger::Exit(0)).await;

        assert_eq!(*log.lock().unwrap(), vec!["broken", "healthy"]);
        assert_eq!(host.exit_codes(), vec![0]);
    }

    #[tokio::test]
    async fn panicking_member_does_not_stop_others() {
        let (coordinator, registry, host) = coordinator(RunMode::Cli);
        let log = Arc::new(Mutex::new(Vec::new()));
        registry.register(Arc::new(Panics));
        recorder(&registry, &log, "after", false);

        let outcome = coordinator.shutdown(ExitTrigger::Exit(5)).await;

        assert_eq!(outcome, ShutdownOutcome::Exited(5));
        assert_eq!(*log.lock().unwrap(), vec!["after"]);
        assert_eq!(host.exit_codes(), vec![5]);
    }

    #[tokio::test]
    async fn second_trigger_is_ignored() {
        let (coordinator, registry, host) = coordinator(RunMode::Cli);
        let log = Arc::new(Mutex::new(Vec::new()));
        recorder(&registry, &log, "once", false);

        coordinator.shutdown(ExitTrigger::Exit(0)).await;
        let again = coordinator.shutdown(ExitTrigger::Signal(HostSignal::Interrupt)).await;

        assert_eq!(again, ShutdownOutcome::AlreadyInProgress);
        assert_eq!(*log.lock().unwrap(), vec!["once"]);
        assert_eq!(host.exit_codes(), vec![0]);
    }

    #[tokio::test]
    async fn concurrent_trigger_during_cleanup_is_ignored() {
        let (coordinator, registry, host) = coordinator(RunMode::Cli);
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let runs = Arc::new(AtomicUsize::new(0));
        registry.register(Arc::new(Gate {
            entered: entered.clone(),
            release: release.clone(),
            runs: runs.clone(),
        }));

        let coordinator = Arc::new(coordinator);
        let first = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.shutdown(ExitTrigger::Exit(0)).await })
        };

        entered.notified().await;
        assert_eq!(coordinator.state(), CoordinatorState::ShuttingDown);

        let second = coordinator.shutdown(ExitTrigger::Signal(HostSignal::Terminate)).await;
        assert_eq!(second, ShutdownOutcome::AlreadyInProgress);

        release.notify_one();
        assert_eq!(first.await.unwrap(), ShutdownOutcome::Exited(0));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(host.exit_codes(), vec![0]);
    }

    #[tokio::test]
    async fn watch_shuts_down_on_trigger() {
        let (coordinator, registry, host) = coordinator(RunMode::Cli);
        registry.trigger_sender().fire(ExitTrigger::Exit(7));

        let outcome = coordinator.watch().await.unwrap();

        assert_eq!(outcome, ShutdownOutcome::Exited(7));
        assert_eq!(host.exit_codes(), vec![7]);
        assert!(matches!(coordinator.watch().await, Err(SupervisorError::AlreadyWatching)));
    }
}
