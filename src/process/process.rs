/*!
 * Process
 *
 * A script running as a pseudo-process: identity, environment, arguments,
 * a weak terminal reference and an execution queue whose worker owns the
 * engine context and the fd table. Everything that touches the engine is a
 * job on that queue.
 */

use super::env::Environment;
use super::lifecycle::Lifecycle;
use super::queue::{ExecutionQueue, QueueError, QueueHandle};
use super::terminal::TerminalRef;
use super::types::{ExitStatus, ProcessEvent, ProcessInfo, ProcessSpec, ProcessState};
use crate::core::config::{FaultPolicy, KernelConfig};
use crate::core::errors::{ProcessError, ProcessResult};
use crate::core::limits::{ENTRY_POINT, SIGNAL_HANDLER};
use crate::core::types::{Pid, SignalNo};
use crate::engine::{EngineContext, EngineError, InterruptState, ScriptError, ScriptExecutor};
use crate::monitoring::{Diagnostic, DiagnosticSink, TracingSink};
use crate::signals::{Signal, SignalOutcome};
use crate::syscalls::{bind_syscalls, FdTable, SyscallShared, SyscallTable};
use serde_json::Value as JsonValue;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Worker-side state of a process; never leaves the worker thread
pub struct ProcessRuntime {
    executor: ScriptExecutor,
    shared: Rc<SyscallShared>,
    symbols: Vec<String>,
}

impl ProcessRuntime {
    fn build(
        spec: &ProcessSpec,
        env: Environment,
        terminal: TerminalRef,
        table: &SyscallTable,
        config: &KernelConfig,
        interrupt: Arc<InterruptState>,
    ) -> ProcessResult<Self> {
        let pid = spec.pid;
        let construction = |reason: String| ProcessError::Construction { pid, reason };

        let engine = EngineContext::create(&config.engine, Arc::clone(&interrupt))
            .map_err(|e| construction(e.to_string()))?;
        let shared = Rc::new(SyscallShared::new(
            pid,
            env,
            spec.args.clone(),
            terminal,
            Arc::clone(&interrupt),
        ));
        let symbols =
            bind_syscalls(&engine, table, &shared).map_err(|e| construction(e.to_string()))?;
        let executor = ScriptExecutor::new(pid, engine, interrupt, config.call_timeout);

        Ok(Self {
            executor,
            shared,
            symbols,
        })
    }

    pub fn executor(&mut self) -> &mut ScriptExecutor {
        &mut self.executor
    }

    fn fd_table(&self) -> ProcessResult<std::cell::RefMut<'_, FdTable>> {
        self.shared.fd.try_borrow_mut().map_err(|_| {
            ProcessError::Script(ScriptError::Engine {
                pid: self.shared.pid,
                source: EngineError::Internal("fd table is busy".to_string()),
            })
        })
    }

    /// Release the engine and clear every descriptor
    fn teardown(&mut self) {
        self.executor.engine_mut().destroy();
        if let Ok(mut fd) = self.shared.fd.try_borrow_mut() {
            fd.clear_all();
        }
        debug!(pid = self.shared.pid, "Process runtime torn down");
    }
}

/// Results of the two steps of `execute`
struct ExecuteOutcome {
    load: Result<(), ScriptError>,
    main: Option<Result<JsonValue, ScriptError>>,
}

pub struct Process {
    pid: Pid,
    path: PathBuf,
    args: Vec<String>,
    env: Environment,
    symbols: Vec<String>,
    lifecycle: Arc<Lifecycle>,
    interrupt: Arc<InterruptState>,
    fault_policy: FaultPolicy,
    sink: Arc<dyn DiagnosticSink>,
    queue: QueueHandle<ProcessRuntime>,
}

/// Builder for Process
pub struct ProcessBuilder {
    spec: ProcessSpec,
    terminal: TerminalRef,
    queue: Option<ExecutionQueue>,
    syscalls: SyscallTable,
    config: KernelConfig,
    sink: Arc<dyn DiagnosticSink>,
}

impl ProcessBuilder {
    pub fn new(spec: ProcessSpec) -> Self {
        Self {
            spec,
            terminal: TerminalRef::detached(),
            queue: None,
            syscalls: SyscallTable::standard(),
            config: KernelConfig::default(),
            sink: Arc::new(TracingSink),
        }
    }

    pub fn terminal(mut self, terminal: TerminalRef) -> Self {
        self.terminal = terminal;
        self
    }

    /// Custom queue; by default one is created from the config
    pub fn queue(mut self, queue: ExecutionQueue) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn syscalls(mut self, syscalls: SyscallTable) -> Self {
        self.syscalls = syscalls;
        self
    }

    pub fn config(mut self, config: KernelConfig) -> Self {
        self.config = config;
        self
    }

    pub fn sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Start the worker, create the engine and bind the syscalls on it
    #[instrument(skip(self), fields(pid = self.spec.pid, path = %self.spec.path.display()))]
    pub fn spawn(self) -> ProcessResult<Arc<Process>> {
        let Self {
            spec,
            terminal,
            queue,
            syscalls,
            config,
            sink,
        } = self;
        let pid = spec.pid;
        let env = Environment::from(spec.envp.clone());
        let interrupt = Arc::new(InterruptState::new());
        let lifecycle = Arc::new(Lifecycle::new(pid, terminal.clone()));

        let queue = queue.unwrap_or_else(|| {
            ExecutionQueue::new(format!("jskern-pid-{}", pid)).with_capacity(config.queue_capacity)
        });

        let worker_spec = spec.clone();
        let worker_env = env.clone();
        let worker_interrupt = Arc::clone(&interrupt);
        let worker_config = config.clone();
        let queue = queue.start(move || {
            ProcessRuntime::build(
                &worker_spec,
                worker_env,
                terminal,
                &syscalls,
                &worker_config,
                worker_interrupt,
            )
        })?;

        let symbols = queue.submit(|rt: &mut ProcessRuntime| rt.symbols.clone())?;
        info!(symbols = symbols.len(), "Process constructed");

        Ok(Arc::new(Process {
            pid,
            path: spec.path,
            args: spec.args,
            env,
            symbols,
            lifecycle,
            interrupt,
            fault_policy: config.fault_policy,
            sink,
            queue,
        }))
    }
}

/// Runs on the worker around every job
fn guarded<R>(
    pid: Pid,
    lifecycle: &Lifecycle,
    rt: &mut ProcessRuntime,
    f: impl FnOnce(&mut ProcessRuntime) -> ProcessResult<R>,
) -> ProcessResult<R> {
    if lifecycle.is_finished() {
        return Err(ProcessError::Terminated(pid));
    }
    lifecycle.set_running(true);
    let result = f(rt);
    lifecycle.set_running(false);

    if let Some(code) = rt.executor.interrupt().exit_requested() {
        rt.teardown();
        lifecycle.mark_exited(code);
    }
    result
}

impl Process {
    pub fn builder(spec: ProcessSpec) -> ProcessBuilder {
        ProcessBuilder::new(spec)
    }

    /// Construct with every collaborator given explicitly
    pub fn spawn(
        spec: ProcessSpec,
        terminal: TerminalRef,
        queue: ExecutionQueue,
        syscalls: SyscallTable,
        config: KernelConfig,
        sink: Arc<dyn DiagnosticSink>,
    ) -> ProcessResult<Arc<Process>> {
        ProcessBuilder::new(spec)
            .terminal(terminal)
            .queue(queue)
            .syscalls(syscalls)
            .config(config)
            .sink(sink)
            .spawn()
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn get_env(&self, name: &str) -> Option<String> {
        self.env.get(name)
    }

    pub fn set_env(&self, name: impl Into<String>, value: impl Into<String>) {
        self.env.set(name, value);
    }

    /// Capability names bound at construction, in binding order
    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn state(&self) -> ProcessState {
        self.lifecycle.state()
    }

    pub fn status(&self) -> ExitStatus {
        self.lifecycle.status()
    }

    pub fn is_alive(&self) -> bool {
        !self.lifecycle.is_finished() && !self.lifecycle.is_shutting_down()
    }

    pub fn terminal(&self) -> &TerminalRef {
        self.lifecycle.terminal()
    }

    pub fn info(&self) -> ProcessInfo {
        ProcessInfo {
            pid: self.pid,
            path: self.path.clone(),
            args: self.args.clone(),
            state: self.state(),
            status: self.status(),
            symbols: self.symbols.clone(),
        }
    }

    fn closed_error(&self, err: QueueError) -> ProcessError {
        if err == QueueError::Closed && !self.is_alive() {
            ProcessError::Terminated(self.pid)
        } else {
            ProcessError::Queue(err)
        }
    }

    fn run<F, R>(&self, f: F) -> ProcessResult<R>
    where
        F: FnOnce(&mut ProcessRuntime) -> ProcessResult<R> + Send + 'static,
        R: Send + 'static,
    {
        if !self.is_alive() {
            return Err(ProcessError::Terminated(self.pid));
        }
        let pid = self.pid;
        let lifecycle = Arc::clone(&self.lifecycle);
        self.queue
            .submit(move |rt: &mut ProcessRuntime| guarded(pid, &lifecycle, rt, f))
            .map_err(|e| self.closed_error(e))?
    }

    async fn run_async<F, R>(&self, f: F) -> ProcessResult<R>
    where
        F: FnOnce(&mut ProcessRuntime) -> ProcessResult<R> + Send + 'static,
        R: Send + 'static,
    {
        if !self.is_alive() {
            return Err(ProcessError::Terminated(self.pid));
        }
        let pid = self.pid;
        let lifecycle = Arc::clone(&self.lifecycle);
        self.queue
            .submit_async(move |rt: &mut ProcessRuntime| guarded(pid, &lifecycle, rt, f))
            .await
            .map_err(|e| self.closed_error(e))?
    }

    /// Hand a failure to the sink; non-script errors only reach the log
    fn report(&self, err: &ProcessError) {
        match err {
            ProcessError::Script(script) => {
                if let Some(diagnostic) = Diagnostic::from_script_error(self.pid, script) {
                    self.sink.report(&diagnostic);
                }
            }
            other => warn!(pid = self.pid, error = %other, "Process operation rejected"),
        }
    }

    fn execute_job(
        &self,
    ) -> impl FnOnce(&mut ProcessRuntime) -> ProcessResult<ExecuteOutcome> + Send + 'static {
        let path = self.path.clone();
        let args = self.args.clone();
        let lifecycle = Arc::clone(&self.lifecycle);
        move |rt: &mut ProcessRuntime| {
            // only reached once the worker accepted the job for a live process
            lifecycle.notify(&ProcessEvent::Started);
            let load = rt.executor.load_script(&path);
            if rt.executor.interrupt().exit_requested().is_some() {
                return Ok(ExecuteOutcome { load, main: None });
            }
            let argv = JsonValue::from(args);
            let main = rt.executor.call(ENTRY_POINT, &[argv]);
            Ok(ExecuteOutcome {
                load,
                main: Some(main),
            })
        }
    }

    fn finish_execute(&self, outcome: ProcessResult<ExecuteOutcome>) {
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(err) => {
                self.report(&err);
                return;
            }
        };

        if let Err(err) = &outcome.load {
            self.report(&ProcessError::Script(err.clone()));
            if err.kind().is_some() {
                self.lifecycle.record_fault(&err.to_string());
            }
        }

        match outcome.main {
            Some(Ok(value)) => {
                debug!(pid = self.pid, result = %value, "main returned");
            }
            Some(Err(err)) => {
                self.report(&ProcessError::Script(err.clone()));
                if err.kind().is_some() {
                    self.lifecycle.record_fault(&err.to_string());
                    if self.fault_policy == FaultPolicy::Terminate {
                        info!(pid = self.pid, "main faulted, terminating by policy");
                        self.terminate();
                    }
                }
            }
            None => {}
        }
    }

    /// Load the script at `path`, then call `main` with the process arguments
    ///
    /// Both steps run as one job. Failures are reported to the sink and
    /// recorded in `status()`.
    #[instrument(skip(self), fields(pid = self.pid, path = %self.path.display()))]
    pub fn execute(&self) {
        let outcome = self.run(self.execute_job());
        self.finish_execute(outcome);
    }

    /// `execute` for async hosts
    pub async fn execute_async(&self) {
        let outcome = self.run_async(self.execute_job()).await;
        self.finish_execute(outcome);
    }

    /// Evaluate another script file in this process's namespace
    pub fn try_load_script(&self, path: impl AsRef<Path>) -> ProcessResult<()> {
        let path = path.as_ref().to_path_buf();
        let result = self.run(move |rt: &mut ProcessRuntime| {
            rt.executor.load_script(&path).map_err(ProcessError::from)
        });
        if let Err(err) = &result {
            self.report(err);
        }
        result
    }

    /// Reporting variant of `try_load_script`
    pub fn load_script(&self, path: impl AsRef<Path>) {
        let _ = self.try_load_script(path);
    }

    /// Call a global function with JSON arguments
    pub fn try_invoke(&self, name: &str, args: Vec<JsonValue>) -> ProcessResult<JsonValue> {
        let target = name.to_string();
        let result = self.run(move |rt: &mut ProcessRuntime| {
            rt.executor.call(&target, &args).map_err(ProcessError::from)
        });
        if let Err(err) = &result {
            self.report(err);
        }
        result
    }

    /// Reporting variant of `try_invoke`; `None` on any failure
    pub fn invoke(&self, name: &str, args: Vec<JsonValue>) -> Option<JsonValue> {
        self.try_invoke(name, args).ok()
    }

    /// Async variant of `invoke`
    pub async fn invoke_async(&self, name: &str, args: Vec<JsonValue>) -> Option<JsonValue> {
        let target = name.to_string();
        let result = self
            .run_async(move |rt: &mut ProcessRuntime| {
                rt.executor.call(&target, &args).map_err(ProcessError::from)
            })
            .await;
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                self.report(&err);
                None
            }
        }
    }

    /// Deliver a signal as a call to the script's `onsignal(signo)`
    #[instrument(skip(self), fields(pid = self.pid))]
    pub fn signal(&self, signo: SignalNo) -> ProcessResult<SignalOutcome> {
        let signal = Signal::from_number(signo)?;
        if !self.is_alive() {
            return Err(ProcessError::Terminated(self.pid));
        }
        if !signal.can_catch() {
            self.terminate();
            return Ok(SignalOutcome::Terminated);
        }

        let handled = self.run(move |rt: &mut ProcessRuntime| {
            if !rt.executor.has_function(SIGNAL_HANDLER) {
                return Ok(None);
            }
            rt.executor
                .call(SIGNAL_HANDLER, &[JsonValue::from(signal.number())])
                .map(Some)
                .map_err(ProcessError::from)
        });

        match handled {
            Ok(Some(value)) => Ok(SignalOutcome::Handled(value)),
            Ok(None) if signal.is_fatal() => {
                info!(%signal, "Unhandled fatal signal");
                self.terminate();
                Ok(SignalOutcome::Terminated)
            }
            Ok(None) => Ok(SignalOutcome::Ignored),
            Err(err) => {
                self.report(&err);
                Err(err)
            }
        }
    }

    /// Run `f` against the fd table on the worker
    pub fn with_fd<F, R>(&self, f: F) -> ProcessResult<R>
    where
        F: FnOnce(&FdTable) -> R + Send + 'static,
        R: Send + 'static,
    {
        self.run(move |rt: &mut ProcessRuntime| Ok(f(&*rt.fd_table()?)))
    }

    /// Mutable variant of `with_fd`
    pub fn with_fd_mut<F, R>(&self, f: F) -> ProcessResult<R>
    where
        F: FnOnce(&mut FdTable) -> R + Send + 'static,
        R: Send + 'static,
    {
        self.run(move |rt: &mut ProcessRuntime| Ok(f(&mut *rt.fd_table()?)))
    }

    /// Stop the process: interrupt the running job, drop queued ones,
    /// destroy the engine and clear the fd table. Idempotent.
    pub fn terminate(&self) {
        if !self.lifecycle.begin_shutdown() {
            return;
        }
        debug!(pid = self.pid, "Terminating process");
        self.interrupt.cancel();
        self.queue.shutdown(|rt: &mut ProcessRuntime| rt.teardown());
        self.lifecycle.mark_terminated();
    }
}

impl Drop for Process {
    fn drop(&mut self) {
        self.terminate();
    }
}

impl std::fmt::Debug for Process {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Process")
            .field("pid", &self.pid)
            .field("path", &self.path)
            .field("state", &self.state())
            .field("symbols", &self.symbols.len())
            .finish()
    }
}
