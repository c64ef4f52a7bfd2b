/*!
 * Process Lifecycle
 *
 * State shared between the host-facing `Process` and the jobs running on
 * its worker. The shutdown flag guards the single terminate transition;
 * the finished check guards the single final terminal event.
 */

use super::terminal::TerminalRef;
use super::types::{ExitStatus, ProcessEvent, ProcessState};
use crate::core::types::{ExitCode, Pid};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

#[derive(Debug)]
pub struct Lifecycle {
    pid: Pid,
    state: RwLock<ProcessState>,
    status: RwLock<ExitStatus>,
    shutdown: AtomicBool,
    terminal: TerminalRef,
}

impl Lifecycle {
    pub fn new(pid: Pid, terminal: TerminalRef) -> Self {
        Self {
            pid,
            state: RwLock::new(ProcessState::Ready),
            status: RwLock::new(ExitStatus::Pending),
            shutdown: AtomicBool::new(false),
            terminal,
        }
    }

    pub fn state(&self) -> ProcessState {
        *self.state.read()
    }

    pub fn status(&self) -> ExitStatus {
        self.status.read().clone()
    }

    pub fn terminal(&self) -> &TerminalRef {
        &self.terminal
    }

    pub fn is_finished(&self) -> bool {
        self.state().is_finished()
    }

    /// Ready <-> Running; ignored once finished
    pub fn set_running(&self, running: bool) {
        let mut state = self.state.write();
        if !state.is_finished() {
            *state = if running {
                ProcessState::Running
            } else {
                ProcessState::Ready
            };
        }
    }

    /// True for the first caller only
    pub fn begin_shutdown(&self) -> bool {
        !self.shutdown.swap(true, Ordering::AcqRel)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Move into a finished state; false when already finished
    fn finish(&self, final_state: ProcessState) -> bool {
        let mut state = self.state.write();
        if state.is_finished() {
            return false;
        }
        *state = final_state;
        true
    }

    pub fn mark_exited(&self, code: ExitCode) -> bool {
        if !self.finish(ProcessState::Exited) {
            return false;
        }
        *self.status.write() = ExitStatus::Exited(code);
        info!(pid = self.pid, code, "Process exited");
        self.notify(&ProcessEvent::Exited { code });
        true
    }

    pub fn mark_terminated(&self) -> bool {
        if !self.finish(ProcessState::Terminated) {
            return false;
        }
        info!(pid = self.pid, "Process terminated");
        self.notify(&ProcessEvent::Terminated);
        true
    }

    /// Record a failed entry point; a recorded exit is never overwritten
    pub fn record_fault(&self, message: &str) {
        {
            let mut status = self.status.write();
            if matches!(*status, ExitStatus::Exited(_)) {
                return;
            }
            *status = ExitStatus::Faulted(message.to_string());
        }
        self.notify(&ProcessEvent::Faulted {
            message: message.to_string(),
        });
    }

    pub fn notify(&self, event: &ProcessEvent) {
        if !self.terminal.notify(self.pid, event) {
            debug!(pid = self.pid, ?event, "No terminal to notify");
        }
    }
}
