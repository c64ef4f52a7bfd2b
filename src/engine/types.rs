/*!
 * Engine Types
 * Error and result types for the embedded interpreter
 */

use crate::core::types::{ExitCode, Pid};
use crate::monitoring::DiagnosticKind;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Engine operation result
pub type EngineResult<T> = Result<T, EngineError>;

/// Outcome of one eval or call, computed inside the execution queue
pub type ScriptResult<T> = Result<T, ScriptError>;

/// Failures of the interpreter itself, independent of script behavior
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "error", content = "details")]
pub enum EngineError {
    #[error("engine runtime could not be created: {0}")]
    Creation(String),

    #[error("engine context has been destroyed")]
    Destroyed,

    #[error("value conversion failed: {0}")]
    Conversion(String),

    #[error("engine failure: {0}")]
    Internal(String),
}

impl From<rquickjs::Error> for EngineError {
    fn from(err: rquickjs::Error) -> Self {
        EngineError::Internal(err.to_string())
    }
}

/// Script-level failures, each recoverable by the owning process
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum ScriptError {
    #[error("Kernel Exec Error: cannot load {path}: {reason}")]
    #[diagnostic(
        code(script::load),
        help("The script file is missing, unreadable or not valid UTF-8.")
    )]
    Load { path: String, reason: String },

    #[error("Kernel Exec Error: evaluating {path} raised {exception}")]
    #[diagnostic(
        code(script::evaluation),
        help("Top-level code threw. Definitions made before the throw remain visible.")
    )]
    Evaluation { path: String, exception: String },

    #[error("process {pid}: function {name} not found")]
    #[diagnostic(code(script::symbol_not_found))]
    SymbolNotFound { pid: Pid, name: String },

    #[error("process {pid}: JavaScript Error in function {name}: {exception}")]
    #[diagnostic(code(script::call))]
    Call {
        pid: Pid,
        name: String,
        exception: String,
    },

    #[error("process {pid}: {target} exceeded its {limit_ms}ms budget")]
    #[diagnostic(
        code(script::timeout),
        help("Raise call_timeout or break the work into smaller calls.")
    )]
    Timeout {
        pid: Pid,
        target: String,
        limit_ms: u64,
    },

    #[error("process {pid}: {target} was cancelled")]
    #[diagnostic(code(script::cancelled))]
    Cancelled { pid: Pid, target: String },

    #[error("process {pid}: script exited with code {code}")]
    #[diagnostic(code(script::exited))]
    Exited { pid: Pid, code: ExitCode },

    #[error("process {pid}: {source}")]
    #[diagnostic(code(script::engine))]
    Engine { pid: Pid, source: EngineError },
}

impl ScriptError {
    /// Diagnostic category this error is reported under
    ///
    /// `None` for outcomes that are not failures (a requested exit).
    pub fn kind(&self) -> Option<DiagnosticKind> {
        match self {
            ScriptError::Load { .. } => Some(DiagnosticKind::Load),
            ScriptError::Evaluation { .. } => Some(DiagnosticKind::Evaluation),
            ScriptError::SymbolNotFound { .. } => Some(DiagnosticKind::SymbolNotFound),
            ScriptError::Call { .. } => Some(DiagnosticKind::Call),
            ScriptError::Timeout { .. } => Some(DiagnosticKind::Timeout),
            ScriptError::Cancelled { .. } => Some(DiagnosticKind::Cancelled),
            ScriptError::Engine { .. } => Some(DiagnosticKind::Engine),
            ScriptError::Exited { .. } => None,
        }
    }

    pub fn is_symbol_not_found(&self) -> bool {
        matches!(self, ScriptError::SymbolNotFound { .. })
    }
}
