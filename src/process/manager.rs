/*!
 * Process Management
 * Pid allocation, spawning, termination and reaping for one terminal session
 */

use super::process::Process;
use super::terminal::TerminalRef;
use super::types::{ProcessInfo, ProcessSpec};
use crate::core::config::KernelConfig;
use crate::core::errors::{ProcessError, ProcessResult};
use crate::core::limits::FIRST_PID;
use crate::core::types::{Pid, SignalNo};
use crate::monitoring::{Diagnostic, DiagnosticKind, DiagnosticSink, TracingSink};
use crate::signals::SignalOutcome;
use crate::syscalls::SyscallTable;
use ahash::RandomState;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

pub struct ProcessManager {
    processes: DashMap<Pid, Arc<Process>, RandomState>,
    // held across allocate + insert so two spawns never pick the same pid
    pid_lock: Mutex<()>,
    session_id: String,
    terminal: TerminalRef,
    config: KernelConfig,
    syscalls: SyscallTable,
    sink: Arc<dyn DiagnosticSink>,
}

impl ProcessManager {
    pub fn new(terminal: TerminalRef) -> Self {
        let session_id = Uuid::new_v4().to_string();
        info!(session = %session_id, "Process manager initialized");
        Self {
            processes: DashMap::with_hasher(RandomState::new()),
            pid_lock: Mutex::new(()),
            session_id,
            terminal,
            config: KernelConfig::default(),
            syscalls: SyscallTable::standard(),
            sink: Arc::new(TracingSink),
        }
    }

    pub fn with_config(mut self, config: KernelConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_syscalls(mut self, syscalls: SyscallTable) -> Self {
        self.syscalls = syscalls;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    fn allocate_pid(&self) -> ProcessResult<Pid> {
        (FIRST_PID..=Pid::MAX)
            .find(|pid| !self.processes.contains_key(pid))
            .ok_or(ProcessError::PidExhausted)
    }

    /// Construct a process for the script at `path`; returns its pid
    #[instrument(skip_all, fields(session = %self.session_id))]
    pub fn spawn(
        &self,
        path: impl AsRef<Path>,
        args: Vec<String>,
        envp: HashMap<String, String>,
    ) -> ProcessResult<Pid> {
        let _guard = self.pid_lock.lock();
        let pid = self.allocate_pid()?;
        let spec = ProcessSpec::new(pid, path).with_args(args).with_env(envp);

        let process = Process::builder(spec)
            .terminal(self.terminal.clone())
            .syscalls(self.syscalls.clone())
            .config(self.config.clone())
            .sink(Arc::clone(&self.sink))
            .spawn()
            .inspect_err(|err| {
                if matches!(err, ProcessError::Construction { .. }) {
                    self.sink.report(&Diagnostic::new(
                        pid,
                        DiagnosticKind::Construction,
                        err.to_string(),
                    ));
                }
            })?;

        self.processes.insert(pid, process);
        info!(pid, "Process spawned");
        Ok(pid)
    }

    pub fn get(&self, pid: Pid) -> Option<Arc<Process>> {
        self.processes.get(&pid).map(|entry| Arc::clone(entry.value()))
    }

    fn require(&self, pid: Pid) -> ProcessResult<Arc<Process>> {
        self.get(pid).ok_or(ProcessError::NotFound(pid))
    }

    pub fn execute(&self, pid: Pid) -> ProcessResult<()> {
        self.require(pid)?.execute();
        Ok(())
    }

    pub async fn execute_async(&self, pid: Pid) -> ProcessResult<()> {
        self.require(pid)?.execute_async().await;
        Ok(())
    }

    pub fn invoke(
        &self,
        pid: Pid,
        name: &str,
        args: Vec<JsonValue>,
    ) -> ProcessResult<Option<JsonValue>> {
        Ok(self.require(pid)?.invoke(name, args))
    }

    pub fn signal(&self, pid: Pid, signo: SignalNo) -> ProcessResult<SignalOutcome> {
        self.require(pid)?.signal(signo)
    }

    /// Terminate the process and release its pid
    pub fn terminate(&self, pid: Pid) -> ProcessResult<()> {
        let process = self.require(pid)?;
        process.terminate();
        self.processes.remove(&pid);
        info!(pid, "Process terminated and removed");
        Ok(())
    }

    /// Remove processes that exited or were terminated; returns their pids
    pub fn reap(&self) -> Vec<Pid> {
        let finished: Vec<Pid> = self
            .processes
            .iter()
            .filter(|entry| !entry.value().is_alive())
            .map(|entry| *entry.key())
            .collect();

        let mut reaped = Vec::with_capacity(finished.len());
        for pid in finished {
            if let Some((_, process)) = self.processes.remove(&pid) {
                // joins the worker of a process that exited on its own
                process.terminate();
                reaped.push(pid);
            }
        }
        reaped.sort_unstable();
        reaped
    }

    /// Snapshot of every process, ordered by pid
    pub fn list(&self) -> Vec<ProcessInfo> {
        let mut infos: Vec<ProcessInfo> = self
            .processes
            .iter()
            .map(|entry| entry.value().info())
            .collect();
        infos.sort_by_key(|info| info.pid);
        infos
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    /// Terminate every process in the session
    pub fn shutdown_all(&self) {
        let pids: Vec<Pid> = self.processes.iter().map(|entry| *entry.key()).collect();
        for pid in pids {
            if let Some((_, process)) = self.processes.remove(&pid) {
                process.terminate();
            }
        }
        info!(session = %self.session_id, "All processes shut down");
    }
}

impl std::fmt::Debug for ProcessManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessManager")
            .field("session_id", &self.session_id)
            .field("processes", &self.processes.len())
            .finish()
    }
}
