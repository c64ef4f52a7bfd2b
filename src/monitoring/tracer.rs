/*!
 * Structured Tracing
 * Subscriber setup and per-syscall spans using the tracing crate
 */

use crate::core::types::Pid;
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use tracing::{debug, span, warn, Level};
use tracing_subscriber::{fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Syscalls slower than this are logged at warn level
const SLOW_SYSCALL: Duration = Duration::from_millis(10);

/// Initialize structured tracing once per host process
///
/// Environment variables:
/// - RUST_LOG: Set log level (default: info)
/// - JSKERN_TRACE_JSON: Enable JSON output (default: false)
pub fn init_tracing() {
    TRACING_INIT.get_or_init(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let use_json = std::env::var("JSKERN_TRACE_JSON")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let registry = tracing_subscriber::registry().with(env_filter);

        let result = if use_json {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_thread_names(true)
                        .with_current_span(true)
                        .with_span_list(true),
                )
                .try_init()
        } else {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_target(true)
                        .with_thread_names(true)
                        .with_span_events(FmtSpan::CLOSE)
                        .compact(),
                )
                .try_init()
        };

        if let Err(err) = result {
            eprintln!("tracing init skipped: {err}");
        }
    });
}

/// Generate a unique trace ID for correlating log lines
pub fn generate_trace_id() -> String {
    Uuid::new_v4().to_string()
}

/// Span covering one host capability call made by a script
pub struct SyscallSpan {
    span: tracing::Span,
    start: Instant,
    syscall_name: String,
}

impl SyscallSpan {
    pub fn new(syscall_name: &str, pid: Pid, argc: usize) -> Self {
        let span = span!(
            Level::DEBUG,
            "syscall",
            syscall = syscall_name,
            pid = pid,
            argc = argc,
            result = tracing::field::Empty,
        );
        Self {
            span,
            start: Instant::now(),
            syscall_name: syscall_name.to_string(),
        }
    }

    pub fn record_result(&self, success: bool) {
        self.span
            .record("result", if success { "success" } else { "error" });
    }
}

impl Drop for SyscallSpan {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        let _entered = self.span.enter();
        if duration > SLOW_SYSCALL {
            warn!(
                syscall = %self.syscall_name,
                duration_ms = duration.as_millis() as u64,
                slow = true,
                "slow syscall detected"
            );
        } else {
            debug!(
                syscall = %self.syscall_name,
                duration_us = duration.as_micros() as u64,
                "syscall completed"
            );
        }
    }
}
