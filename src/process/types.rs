/*!
 * Process Types
 * Common types for process management
 */

use crate::core::types::{ExitCode, Pid};
use path_clean::PathClean;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Process state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    /// Constructed, waiting for work
    Ready,
    /// A job is executing on the worker
    Running,
    /// The script called `exit`
    Exited,
    /// Shut down by the host
    Terminated,
}

impl ProcessState {
    pub fn is_finished(self) -> bool {
        matches!(self, ProcessState::Exited | ProcessState::Terminated)
    }
}

/// Last recorded outcome of the process's entry point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "detail")]
pub enum ExitStatus {
    Pending,
    Exited(ExitCode),
    Faulted(String),
}

/// Lifecycle notifications delivered to the terminal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum ProcessEvent {
    Started,
    Faulted { message: String },
    Exited { code: ExitCode },
    Terminated,
}

/// Identity and inputs of a process, fixed at construction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessSpec {
    pub pid: Pid,
    pub path: PathBuf,
    pub args: Vec<String>,
    pub envp: HashMap<String, String>,
}

impl ProcessSpec {
    /// The path is normalized lexically; it is not required to exist yet
    pub fn new(pid: Pid, path: impl AsRef<Path>) -> Self {
        Self {
            pid,
            path: path.as_ref().clean(),
            args: Vec::new(),
            envp: HashMap::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_env<I, K, V>(mut self, envp: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.envp = envp
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }
}

/// Point-in-time view of a process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub pid: Pid,
    pub path: PathBuf,
    pub args: Vec<String>,
    pub state: ProcessState,
    pub status: ExitStatus,
    pub symbols: Vec<String>,
}
