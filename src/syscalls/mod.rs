/*!
 * Syscalls Module
 * Host capabilities exposed to scripts, the fd table and the binder
 */

pub mod binder;
pub mod env;
pub mod fd;
pub mod handler;
pub mod io;
pub mod process;
pub mod types;

// Re-export for convenience
pub use binder::{bind_syscalls, is_valid_identifier, BindError, SyscallShared};
pub use fd::{Fd, FdTable};
pub use handler::{arg, string_arg, FnSyscall, Syscall, SyscallContext, SyscallTable};
pub use types::{SyscallError, SyscallResult};
