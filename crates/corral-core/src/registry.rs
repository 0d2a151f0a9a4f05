//! Process-wide registry of supervisors
//!
//! One registry exists per host process. Every supervisor registers itself
//! at construction; the exit coordinator fans cleanup out over the members
//! and receives exit triggers through the registry's channel.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::{ExitTrigger, SupervisorResult};

/// Something the exit coordinator must clean before the host exits
#[async_trait]
pub trait Cleanup: Send + Sync {
    /// Label used in diagnostics
    fn label(&self) -> &str;

    /// Terminate everything owned; resolves once termination is confirmed
    async fn clean(&self) -> SupervisorResult<()>;
}

/// Sends exit triggers to the coordinator
#[derive(Debug, Clone)]
pub struct TriggerSender {
    tx: mpsc::UnboundedSender<ExitTrigger>,
}

impl TriggerSender {
    pub fn fire(&self, trigger: ExitTrigger) {
        if self.tx.send(trigger).is_err() {
            trace!("Exit trigger dropped, coordinator gone");
        }
    }
}

struct RegistryInner {
    members: Mutex<Vec<Arc<dyn Cleanup>>>,
    triggers: TriggerSender,
    trigger_rx: Mutex<Option<mpsc::UnboundedReceiver<ExitTrigger>>>,
}

/// Append-only set of live supervisors, shared by cloning
#[derive(Clone)]
pub struct ProcessRegistry {
    inner: Arc<RegistryInner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ProcessRegistry {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(RegistryInner {
                members: Mutex::new(Vec::new()),
                triggers: TriggerSender { tx },
                trigger_rx: Mutex::new(Some(rx)),
            }),
        }
    }

    pub fn register(&self, member: Arc<dyn Cleanup>) {
        debug!(member = member.label(), "Registered for exit cleanup");
        lock(&self.inner.members).push(member);
    }

    /// Snapshot of members in registration order
    pub fn members(&self) -> Vec<Arc<dyn Cleanup>> {
        lock(&self.inner.members).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.inner.members).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn trigger_sender(&self) -> TriggerSender {
        self.inner.triggers.clone()
    }

    /// Take the trigger receiver. Only the first caller gets it.
    pub fn take_triggers(&self) -> Option<mpsc::UnboundedReceiver<ExitTrigger>> {
        lock(&self.inner.trigger_rx).take()
    }
}

impl Default for ProcessRegistry {
    fn default() -> Self {
        Self::new()
    }
}
