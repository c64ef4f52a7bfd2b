/*!
 * Process Module
 * Script processes, their execution queues and the session process table
 */

pub mod env;
pub mod lifecycle;
pub mod manager;
#[allow(clippy::module_inception)]
pub mod process;
pub mod queue;
pub mod terminal;
pub mod types;

// Re-export for convenience
pub use env::Environment;
pub use manager::ProcessManager;
pub use process::{Process, ProcessBuilder, ProcessRuntime};
pub use queue::{ExecutionQueue, QueueError, QueueHandle};
pub use terminal::{BufferTerminal, StdioTerminal, Terminal, TerminalRef};
pub use types::{ExitStatus, ProcessEvent, ProcessInfo, ProcessSpec, ProcessState};
