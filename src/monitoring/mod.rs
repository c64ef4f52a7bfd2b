/*!
 * Monitoring
 * Structured tracing and the diagnostic sink
 */

pub mod diagnostics;
mod tracer;

pub use diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSink, MemorySink, TracingSink};
pub use tracer::{generate_trace_id, init_tracing, SyscallSpan};
