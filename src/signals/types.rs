/*!
 * Signal Types
 * UNIX-style signal numbers understood by script processes
 */

use crate::core::types::SignalNo;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Signal operation result
pub type SignalResult<T> = Result<T, SignalError>;

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalError {
    #[error("Invalid signal: {0}")]
    InvalidSignal(SignalNo),
}

/// Signals a process can receive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum Signal {
    /// Hangup detected on controlling terminal
    SIGHUP = 1,
    /// Interrupt from keyboard (Ctrl+C)
    SIGINT = 2,
    /// Kill signal (cannot be caught)
    SIGKILL = 9,
    /// User-defined signal 1
    SIGUSR1 = 10,
    /// User-defined signal 2
    SIGUSR2 = 12,
    /// Termination signal
    SIGTERM = 15,
}

impl Signal {
    /// Convert from signal number
    pub fn from_number(n: SignalNo) -> SignalResult<Self> {
        match n {
            1 => Ok(Signal::SIGHUP),
            2 => Ok(Signal::SIGINT),
            9 => Ok(Signal::SIGKILL),
            10 => Ok(Signal::SIGUSR1),
            12 => Ok(Signal::SIGUSR2),
            15 => Ok(Signal::SIGTERM),
            _ => Err(SignalError::InvalidSignal(n)),
        }
    }

    /// Get signal number
    pub fn number(&self) -> SignalNo {
        *self as SignalNo
    }

    /// Whether a script handler may intercept the signal
    pub fn can_catch(&self) -> bool {
        !matches!(self, Signal::SIGKILL)
    }

    /// Whether an unhandled delivery ends the process
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Signal::SIGHUP | Signal::SIGINT | Signal::SIGKILL | Signal::SIGTERM
        )
    }

    pub fn description(&self) -> &'static str {
        match self {
            Signal::SIGHUP => "Hangup",
            Signal::SIGINT => "Interrupt",
            Signal::SIGKILL => "Killed",
            Signal::SIGUSR1 => "User defined signal 1",
            Signal::SIGUSR2 => "User defined signal 2",
            Signal::SIGTERM => "Terminated",
        }
    }
}

impl TryFrom<SignalNo> for Signal {
    type Error = SignalError;

    fn try_from(n: SignalNo) -> Result<Self, Self::Error> {
        Self::from_number(n)
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.number())
    }
}

/// What delivering a signal did to the process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalOutcome {
    /// The script's handler ran; carries its return value
    Handled(serde_json::Value),
    /// No handler and the signal is not fatal
    Ignored,
    /// The process was terminated
    Terminated,
}
