/*!
 * Diagnostic Sink
 *
 * Script failures never propagate to the host as panics or errors from
 * `execute`/`invoke`; they are formatted into a `Diagnostic` and handed to
 * a sink. Presentation is the sink's business.
 */

use super::tracer::generate_trace_id;
use crate::core::types::Pid;
use crate::engine::ScriptError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    Load,
    Evaluation,
    SymbolNotFound,
    Call,
    Timeout,
    Cancelled,
    Engine,
    Construction,
}

/// One formatted failure report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub trace_id: String,
    pub pid: Pid,
    pub kind: DiagnosticKind,
    pub message: String,
}

impl Diagnostic {
    pub fn new(pid: Pid, kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            trace_id: generate_trace_id(),
            pid,
            kind,
            message: message.into(),
        }
    }

    /// `None` when the error is not a reportable failure
    pub fn from_script_error(pid: Pid, err: &ScriptError) -> Option<Self> {
        err.kind().map(|kind| Self::new(pid, kind, err.to_string()))
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Receiver of diagnostics produced by processes
pub trait DiagnosticSink: Send + Sync {
    fn report(&self, diagnostic: &Diagnostic);
}

/// Default sink: structured log lines
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, diagnostic: &Diagnostic) {
        match diagnostic.kind {
            DiagnosticKind::SymbolNotFound | DiagnosticKind::Cancelled => warn!(
                trace_id = %diagnostic.trace_id,
                pid = diagnostic.pid,
                kind = ?diagnostic.kind,
                "{}",
                diagnostic.message
            ),
            _ => error!(
                trace_id = %diagnostic.trace_id,
                pid = diagnostic.pid,
                kind = ?diagnostic.kind,
                "{}",
                diagnostic.message
            ),
        }
    }
}

/// Collects diagnostics in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Mutex<Vec<Diagnostic>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<Diagnostic> {
        self.entries.lock().clone()
    }

    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.entries.lock().iter().filter(|d| d.kind == kind).count()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl DiagnosticSink for MemorySink {
    fn report(&self, diagnostic: &Diagnostic) {
        self.entries.lock().push(diagnostic.clone());
    }
}
