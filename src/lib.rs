/*!
 * jskern Library
 * Script pseudo-processes over an embedded JavaScript engine
 */

pub mod core;
pub mod engine;
pub mod monitoring;
pub mod process;
pub mod signals;
pub mod syscalls;

// Re-exports
pub use crate::core::{
    EngineLimits, FaultPolicy, KernelConfig, KernelError, KernelResult, Pid, ProcessError,
    ProcessResult, Stream,
};
pub use engine::{EngineContext, ScriptError, ScriptExecutor};
pub use monitoring::{init_tracing, Diagnostic, DiagnosticKind, DiagnosticSink, MemorySink, TracingSink};
pub use process::{
    BufferTerminal, ExecutionQueue, ExitStatus, Process, ProcessEvent, ProcessManager, ProcessSpec,
    ProcessState, StdioTerminal, Terminal, TerminalRef,
};
pub use signals::{Signal, SignalOutcome};
pub use syscalls::{Fd, FdTable, Syscall, SyscallContext, SyscallError, SyscallTable};
