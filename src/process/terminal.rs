/*!
 * Terminal Interface
 *
 * The host surface a process writes to and reports lifecycle events to.
 * Processes never own their terminal: they hold a weak reference and
 * silently drop output once the terminal is gone.
 */

use super::types::ProcessEvent;
use crate::core::types::{Pid, Stream};
use parking_lot::Mutex;
use std::io::Write;
use std::sync::{Arc, Weak};
use tracing::trace;

pub trait Terminal: Send + Sync {
    /// Output produced by a process
    fn write(&self, pid: Pid, stream: Stream, text: &str);

    /// Lifecycle notification
    fn process_event(&self, _pid: Pid, _event: &ProcessEvent) {}
}

/// Non-owning handle to a terminal
#[derive(Clone, Default)]
pub struct TerminalRef(Option<Weak<dyn Terminal>>);

impl TerminalRef {
    pub fn new<T: Terminal + 'static>(terminal: &Arc<T>) -> Self {
        let terminal: Arc<dyn Terminal> = terminal.clone();
        Self(Some(Arc::downgrade(&terminal)))
    }

    pub fn from_dyn(terminal: &Arc<dyn Terminal>) -> Self {
        Self(Some(Arc::downgrade(terminal)))
    }

    /// A reference that was never attached
    pub fn detached() -> Self {
        Self(None)
    }

    fn upgrade(&self) -> Option<Arc<dyn Terminal>> {
        self.0.as_ref().and_then(Weak::upgrade)
    }

    pub fn is_attached(&self) -> bool {
        self.upgrade().is_some()
    }

    /// Returns false when the terminal is gone
    pub fn write(&self, pid: Pid, stream: Stream, text: &str) -> bool {
        match self.upgrade() {
            Some(terminal) => {
                terminal.write(pid, stream, text);
                true
            }
            None => {
                trace!(pid, "Output dropped, terminal detached");
                false
            }
        }
    }

    pub fn notify(&self, pid: Pid, event: &ProcessEvent) -> bool {
        match self.upgrade() {
            Some(terminal) => {
                terminal.process_event(pid, event);
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for TerminalRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("TerminalRef")
            .field(&if self.is_attached() { "attached" } else { "detached" })
            .finish()
    }
}

/// Terminal backed by the host's stdout/stderr
#[derive(Debug, Default)]
pub struct StdioTerminal;

impl Terminal for StdioTerminal {
    fn write(&self, _pid: Pid, stream: Stream, text: &str) {
        // a closed pipe on the host side is not the script's problem
        let _ = match stream {
            Stream::Stdout => {
                let mut out = std::io::stdout().lock();
                out.write_all(text.as_bytes()).and_then(|_| out.flush())
            }
            Stream::Stderr => std::io::stderr().lock().write_all(text.as_bytes()),
        };
    }
}

/// Terminal that records everything it receives
#[derive(Debug, Default)]
pub struct BufferTerminal {
    output: Mutex<Vec<(Pid, Stream, String)>>,
    events: Mutex<Vec<(Pid, ProcessEvent)>>,
}

impl BufferTerminal {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Concatenated stdout text of one process
    pub fn stdout(&self, pid: Pid) -> String {
        self.output
            .lock()
            .iter()
            .filter(|(p, s, _)| *p == pid && *s == Stream::Stdout)
            .map(|(_, _, text)| text.as_str())
            .collect()
    }

    pub fn events(&self, pid: Pid) -> Vec<ProcessEvent> {
        self.events
            .lock()
            .iter()
            .filter(|(p, _)| *p == pid)
            .map(|(_, e)| e.clone())
            .collect()
    }

    pub fn all_events(&self) -> Vec<(Pid, ProcessEvent)> {
        self.events.lock().clone()
    }
}

impl Terminal for BufferTerminal {
    fn write(&self, pid: Pid, stream: Stream, text: &str) {
        self.output.lock().push((pid, stream, text.to_string()));
    }

    fn process_event(&self, pid: Pid, event: &ProcessEvent) {
        self.events.lock().push((pid, event.clone()));
    }
}
