/*!
 * Core Types
 * Common types used across the kernel
 */

use serde::{Deserialize, Serialize};
use std::fmt;

/// Process ID type, scoped to one terminal session
pub type Pid = u16;

/// Signal number type
pub type SignalNo = u32;

/// Exit code reported by a script through `exit()`
pub type ExitCode = i32;

/// Common result type for kernel operations
pub type KernelResult<T> = Result<T, super::errors::KernelError>;

/// Output stream a process writes to on its terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stream {
    Stdout,
    Stderr,
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stream::Stdout => write!(f, "stdout"),
            Stream::Stderr => write!(f, "stderr"),
        }
    }
}
