/*!
 * Syscall Types
 * Error and result types for host capabilities
 */

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result of a host capability; `Ok` carries the value handed back to the script
pub type SyscallResult<T> = Result<T, SyscallError>;

/// Errors raised by capabilities, surfaced to the script as thrown exceptions
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "error", content = "details")]
pub enum SyscallError {
    /// Descriptor outside the table or not an integer
    #[error("bad file descriptor: {0}")]
    BadFd(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The resource behind the capability is gone (detached terminal)
    #[error("unavailable: {0}")]
    Unavailable(String),
}

impl SyscallError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }
}
