//! Output routing: from child streams to supervisor events

use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::trace;

use corral_host_api::OutputStream;

use crate::{LineHook, LogKind, SupervisorEvent};

/// Receives complete output lines from a child
pub trait OutputSink: Send + Sync {
    fn on_data(&self, line: &str);
    fn on_error(&self, line: &str);
}

/// Applies the line hook and forwards events to the subscriber
///
/// Clones share one sender, so [`EventLog::close`] ends the stream for all
/// of them.
#[derive(Clone)]
pub struct EventLog {
    hook: Arc<dyn LineHook>,
    tx: Arc<Mutex<Option<mpsc::UnboundedSender<SupervisorEvent>>>>,
}

impl EventLog {
    pub fn new(hook: Arc<dyn LineHook>) -> (Self, mpsc::UnboundedReceiver<SupervisorEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let log = Self {
            hook,
            tx: Arc::new(Mutex::new(Some(tx))),
        };
        (log, rx)
    }

    /// Stop emitting. The subscriber still receives what was already sent,
    /// then sees the stream end.
    pub fn close(&self) {
        if self.tx.lock().unwrap_or_else(PoisonError::into_inner).take().is_some() {
            trace!("Event stream closed");
        }
    }

    /// Transform `line` through the hook and emit it as `kind`
    pub fn log(&self, line: &str, kind: LogKind) {
        let line = self.hook.process_line(line);
        self.emit(SupervisorEvent::log(kind, line));
    }

    pub fn emit(&self, event: SupervisorEvent) {
        let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        // Nobody listening is fine
        match tx.as_ref() {
            Some(tx) if tx.send(event).is_ok() => {}
            _ => trace!("Event dropped, no subscriber"),
        }
    }
}

impl OutputSink for EventLog {
    fn on_data(&self, line: &str) {
        self.log(line, LogKind::Data);
    }

    fn on_error(&self, line: &str) {
        self.log(line, LogKind::Error);
    }
}

/// Read `stream` line by line until EOF, feeding trimmed lines to `sink`
///
/// Lines are split on `\n` and decoded lossily. Lines that are empty after
/// trimming are skipped.
pub async fn pump_lines<S: OutputSink>(stream: OutputStream, sink: S, kind: LogKind) {
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&buf);
                let line = text.trim();
                if line.is_empty() {
                    continue;
                }
                match kind {
                    LogKind::Data => sink.on_data(line),
                    LogKind::Error => sink.on_error(line),
                }
            }
            Err(e) => {
                sink.on_error(&format!("Failed to read process output: {}", e));
                break;
            }
        }
    }
}
