/*!
 * Error Types
 * Centralized error handling with thiserror, miette, and serde support
 */

use crate::core::types::Pid;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// Re-export subsystem errors so callers only need `core::errors`
pub use crate::engine::types::{EngineError, ScriptError};
pub use crate::process::queue::QueueError;
pub use crate::signals::SignalError;
pub use crate::syscalls::types::SyscallError;

/// Process-related errors
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum ProcessError {
    #[error("Process {pid} could not be constructed: {reason}")]
    #[diagnostic(
        code(process::construction_failed),
        help("Capability binding or engine creation failed. The process never ran.")
    )]
    Construction { pid: Pid, reason: String },

    #[error("Process {0} has terminated")]
    #[diagnostic(
        code(process::terminated),
        help("The process released its engine context. Spawn a new process.")
    )]
    Terminated(Pid),

    #[error("Process {0} not found")]
    #[diagnostic(
        code(process::not_found),
        help("The process may have terminated or never existed. Check PID validity.")
    )]
    NotFound(Pid),

    #[error("No free pid left in this session")]
    #[diagnostic(
        code(process::pid_exhausted),
        help("Every pid is in use. Terminate or reap finished processes.")
    )]
    PidExhausted,

    #[error("Execution queue error: {0}")]
    #[diagnostic(code(process::queue))]
    Queue(#[from] QueueError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Script(#[from] ScriptError),

    #[error("Signal error: {0}")]
    #[diagnostic(
        code(process::signal),
        help("Supported signals: SIGHUP(1), SIGINT(2), SIGKILL(9), SIGUSR1(10), SIGUSR2(12), SIGTERM(15).")
    )]
    Signal(#[from] SignalError),
}

/// Process operation result
pub type ProcessResult<T> = Result<T, ProcessError>;

/// Unified kernel error type with miette diagnostics
#[derive(Error, Debug, Diagnostic)]
pub enum KernelError {
    #[error("Process error: {0}")]
    #[diagnostic(transparent)]
    Process(#[from] ProcessError),

    #[error("Engine error: {0}")]
    #[diagnostic(
        code(kernel::engine_error),
        help("The embedded interpreter rejected the operation.")
    )]
    Engine(#[from] EngineError),

    #[error("Syscall error: {0}")]
    #[diagnostic(code(kernel::syscall_error))]
    Syscall(#[from] SyscallError),

    #[error("I/O error: {0}")]
    #[diagnostic(
        code(kernel::io_error),
        help("Filesystem or I/O operation failed. Check file permissions and paths.")
    )]
    Io(String),

    #[error("Configuration error: {0}")]
    #[diagnostic(
        code(kernel::configuration_error),
        help("Invalid configuration. Review configuration parameters.")
    )]
    Configuration(String),
}

// Implement conversion from std::io::Error
impl From<std::io::Error> for KernelError {
    fn from(err: std::io::Error) -> Self {
        KernelError::Io(err.to_string())
    }
}

impl From<ScriptError> for KernelError {
    fn from(err: ScriptError) -> Self {
        KernelError::Process(ProcessError::Script(err))
    }
}

impl From<QueueError> for KernelError {
    fn from(err: QueueError) -> Self {
        KernelError::Process(ProcessError::Queue(err))
    }
}
