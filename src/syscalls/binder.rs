/*!
 * Capability Binder
 *
 * Installs a process's syscall table into the engine's global object. Runs
 * once, on the worker thread, before any script source is evaluated.
 */

use super::fd::FdTable;
use super::handler::{Syscall, SyscallContext, SyscallTable};
use super::types::SyscallError;
use crate::core::types::Pid;
use crate::engine::convert::{js_to_json, json_to_js};
use crate::engine::{EngineContext, InterruptState};
use crate::monitoring::SyscallSpan;
use crate::process::env::Environment;
use crate::process::terminal::TerminalRef;
use ahash::AHashSet;
use rquickjs::function::Rest;
use rquickjs::{Ctx, Exception, Function, Value};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument};

/// Why a syscall table could not be bound
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BindError {
    #[error("syscall {0:?} registered more than once")]
    Duplicate(String),

    #[error("syscall name {0:?} is not a valid identifier")]
    InvalidName(String),

    #[error("syscall {0:?} would shadow an existing global")]
    Collision(String),

    #[error("engine rejected syscall {name:?}: {reason}")]
    Engine { name: String, reason: String },
}

/// Per-process state the bound functions close over
///
/// Owned by the worker thread; the fd table sits in a `RefCell` because the
/// engine hands out shared access only.
pub struct SyscallShared {
    pub pid: Pid,
    pub fd: RefCell<FdTable>,
    pub env: Environment,
    pub args: Vec<String>,
    pub terminal: TerminalRef,
    pub interrupt: Arc<InterruptState>,
}

impl SyscallShared {
    pub fn new(
        pid: Pid,
        env: Environment,
        args: Vec<String>,
        terminal: TerminalRef,
        interrupt: Arc<InterruptState>,
    ) -> Self {
        Self {
            pid,
            fd: RefCell::new(FdTable::new()),
            env,
            args,
            terminal,
            interrupt,
        }
    }
}

const RESERVED_WORDS: &[&str] = &[
    "await", "break", "case", "catch", "class", "const", "continue", "debugger", "default",
    "delete", "do", "else", "enum", "export", "extends", "false", "finally", "for", "function",
    "if", "implements", "import", "in", "instanceof", "interface", "let", "new", "null",
    "package", "private", "protected", "public", "return", "static", "super", "switch", "this",
    "throw", "true", "try", "typeof", "var", "void", "while", "with", "yield",
];

/// Whether `name` can be referenced from script source as a bare identifier
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_' || first == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        && !RESERVED_WORDS.contains(&name)
}

/// Install every syscall in `table` as a global function
///
/// Returns the bound names in table order. Nothing is installed when the
/// table itself is malformed.
#[instrument(skip_all, fields(pid = shared.pid, count = table.len()))]
pub fn bind_syscalls(
    engine: &EngineContext,
    table: &SyscallTable,
    shared: &Rc<SyscallShared>,
) -> Result<Vec<String>, BindError> {
    let mut seen = AHashSet::with_capacity(table.len());
    for syscall in table.iter() {
        let name = syscall.name();
        if !is_valid_identifier(name) {
            return Err(BindError::InvalidName(name.to_string()));
        }
        if !seen.insert(name) {
            return Err(BindError::Duplicate(name.to_string()));
        }
    }

    let mut symbols = Vec::with_capacity(table.len());
    for syscall in table.iter() {
        let name = syscall.name().to_string();
        engine
            .with(|ctx| install(&ctx, Arc::clone(syscall), Rc::clone(shared)))
            .map_err(|e| BindError::Engine {
                name: name.clone(),
                reason: e.to_string(),
            })??;
        symbols.push(name);
    }

    debug!(symbols = ?symbols, "Syscalls bound");
    Ok(symbols)
}

fn install<'js>(
    ctx: &Ctx<'js>,
    syscall: Arc<dyn Syscall>,
    shared: Rc<SyscallShared>,
) -> Result<(), BindError> {
    let name = syscall.name().to_string();
    let engine_err = |e: rquickjs::Error| {
        let _ = ctx.catch();
        BindError::Engine {
            name: name.clone(),
            reason: e.to_string(),
        }
    };

    let globals = ctx.globals();
    if globals.contains_key(name.as_str()).map_err(engine_err)? {
        return Err(BindError::Collision(name.clone()));
    }

    let function = Function::new(
        ctx.clone(),
        move |ctx: Ctx<'js>, args: Rest<Value<'js>>| -> rquickjs::Result<Value<'js>> {
            dispatch(&ctx, syscall.as_ref(), &shared, args.0)
        },
    )
    .map_err(engine_err)?;
    globals.set(name.as_str(), function).map_err(engine_err)
}

/// Body of every bound function
fn dispatch<'js>(
    ctx: &Ctx<'js>,
    syscall: &dyn Syscall,
    shared: &SyscallShared,
    args: Vec<Value<'js>>,
) -> rquickjs::Result<Value<'js>> {
    // A script that caught the exit unwind gets no further capabilities
    if shared.interrupt.exit_requested().is_some() {
        return Err(Exception::throw_internal(ctx, "process exited"));
    }

    let span = SyscallSpan::new(syscall.name(), shared.pid, args.len());

    let mut json_args = Vec::with_capacity(args.len());
    for value in args {
        let converted = js_to_json(ctx, value)
            .map_err(|e| Exception::throw_type(ctx, &format!("{}: {}", syscall.name(), e)))?;
        json_args.push(converted);
    }

    let result = {
        let Ok(mut fd) = shared.fd.try_borrow_mut() else {
            span.record_result(false);
            return Err(Exception::throw_internal(ctx, "fd table is busy"));
        };
        let mut sys_ctx = SyscallContext {
            pid: shared.pid,
            fd: &mut fd,
            env: &shared.env,
            args: &shared.args,
            terminal: &shared.terminal,
            interrupt: &shared.interrupt,
        };
        syscall.call(&mut sys_ctx, &json_args)
    };
    span.record_result(result.is_ok());

    // Unwind out of the script right away; the interrupt hook keeps it from resuming
    if shared.interrupt.exit_requested().is_some() {
        return Err(Exception::throw_internal(ctx, "process exited"));
    }

    match result {
        Ok(value) => json_to_js(ctx, &value)
            .map_err(|e| Exception::throw_internal(ctx, &format!("{}: {}", syscall.name(), e))),
        Err(err) => Err(throw_syscall_error(ctx, syscall.name(), &err)),
    }
}

fn throw_syscall_error(ctx: &Ctx<'_>, name: &str, err: &SyscallError) -> rquickjs::Error {
    let message = format!("{}: {}", name, err);
    match err {
        SyscallError::BadFd(_) => Exception::throw_range(ctx, &message),
        SyscallError::InvalidArgument(_) => Exception::throw_type(ctx, &message),
        SyscallError::Unavailable(_) => Exception::throw_message(ctx, &message),
    }
}
