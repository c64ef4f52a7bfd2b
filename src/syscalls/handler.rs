/*!
 * Syscall Handler Trait
 * Defines the interface for host capabilities and the table they are registered in
 */

use super::fd::FdTable;
use super::types::{SyscallError, SyscallResult};
use crate::core::types::{ExitCode, Pid, Stream};
use crate::engine::InterruptState;
use crate::process::env::Environment;
use crate::process::terminal::TerminalRef;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Everything a capability may touch on behalf of the calling script
pub struct SyscallContext<'a> {
    pub pid: Pid,
    pub fd: &'a mut FdTable,
    pub env: &'a Environment,
    pub args: &'a [String],
    pub terminal: &'a TerminalRef,
    pub(crate) interrupt: &'a InterruptState,
}

impl SyscallContext<'_> {
    /// Send text to the owning terminal
    pub fn write_terminal(&self, stream: Stream, text: &str) -> SyscallResult<()> {
        if self.terminal.write(self.pid, stream, text) {
            Ok(())
        } else {
            Err(SyscallError::unavailable("terminal detached"))
        }
    }

    /// Ask the kernel to end this process once the current call unwinds
    pub fn request_exit(&self, code: ExitCode) {
        self.interrupt.request_exit(code);
    }
}

/// A host capability exposed to scripts as a global function
///
/// Arguments and return values cross the engine boundary as JSON; a
/// `SyscallError` is thrown into the script as an exception.
pub trait Syscall: Send + Sync {
    /// Global name the capability is bound under
    fn name(&self) -> &str;

    fn call(&self, ctx: &mut SyscallContext<'_>, args: &[Value]) -> SyscallResult<Value>;
}

type SyscallFn = dyn Fn(&mut SyscallContext<'_>, &[Value]) -> SyscallResult<Value> + Send + Sync;

/// Capability backed by a closure
pub struct FnSyscall {
    name: String,
    f: Box<SyscallFn>,
}

impl FnSyscall {
    pub fn new<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut SyscallContext<'_>, &[Value]) -> SyscallResult<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            f: Box::new(f),
        }
    }
}

impl Syscall for FnSyscall {
    fn name(&self) -> &str {
        &self.name
    }

    fn call(&self, ctx: &mut SyscallContext<'_>, args: &[Value]) -> SyscallResult<Value> {
        (self.f)(ctx, args)
    }
}

/// Ordered set of capabilities bound into every process built from it
///
/// Registration does not check names; duplicates and invalid identifiers
/// are rejected when a process binds the table.
#[derive(Clone)]
pub struct SyscallTable {
    syscalls: Arc<Vec<Arc<dyn Syscall>>>,
}

impl SyscallTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self {
            syscalls: Arc::new(Vec::new()),
        }
    }

    /// The standard capability set
    pub fn standard() -> Self {
        use super::{env, fd, io, process};
        Self::new()
            .register(Arc::new(io::Print))
            .register(Arc::new(fd::WriteFd))
            .register(Arc::new(fd::ReadFd))
            .register(Arc::new(fd::CloseFd))
            .register(Arc::new(env::GetEnv))
            .register(Arc::new(env::SetEnv))
            .register(Arc::new(process::GetPid))
            .register(Arc::new(process::GetArgs))
            .register(Arc::new(process::Exit))
    }

    /// Register a capability in the table
    pub fn register(mut self, syscall: Arc<dyn Syscall>) -> Self {
        Arc::make_mut(&mut self.syscalls).push(syscall);
        self
    }

    /// Register a closure-backed capability
    pub fn register_fn<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut SyscallContext<'_>, &[Value]) -> SyscallResult<Value> + Send + Sync + 'static,
    {
        self.register(Arc::new(FnSyscall::new(name, f)))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Syscall>> {
        self.syscalls.iter()
    }

    pub fn names(&self) -> Vec<String> {
        self.syscalls.iter().map(|s| s.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.syscalls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.syscalls.is_empty()
    }
}

impl Default for SyscallTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl fmt::Debug for SyscallTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Positional argument; missing trailing arguments read as `null`
pub fn arg(args: &[Value], index: usize) -> SyscallResult<&Value> {
    static NULL: Value = Value::Null;
    Ok(args.get(index).unwrap_or(&NULL))
}

/// Positional argument that must be a string
pub fn string_arg(args: &[Value], index: usize) -> SyscallResult<&str> {
    arg(args, index)?.as_str().ok_or_else(|| {
        SyscallError::invalid_argument(format!("argument {} must be a string", index + 1))
    })
}
