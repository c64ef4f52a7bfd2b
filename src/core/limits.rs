/*!
 * System Limits and Constants
 *
 * Centralized location for kernel-wide limits and defaults.
 * Organized by domain: descriptors, engine, execution.
 */

use std::time::Duration;

// =============================================================================
// DESCRIPTOR LIMITS
// =============================================================================

/// Number of virtual file descriptor slots per process
pub const FD_TABLE_SIZE: usize = 256;

// =============================================================================
// ENGINE LIMITS
// =============================================================================

/// Heap ceiling for one engine runtime (64MB)
pub const DEFAULT_ENGINE_MEMORY: usize = 64 * 1024 * 1024;

/// Native stack budget for one engine runtime (1MB)
pub const DEFAULT_ENGINE_STACK: usize = 1024 * 1024;

/// Allocation volume that triggers an engine GC cycle (4MB)
pub const DEFAULT_ENGINE_GC_THRESHOLD: usize = 4 * 1024 * 1024;

// =============================================================================
// EXECUTION LIMITS
// =============================================================================

/// Wall-clock budget for a single eval or call
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Pending jobs a process queue accepts before submitters block
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Name of the script function started by `execute`
pub const ENTRY_POINT: &str = "main";

/// Name of the script function that receives delivered signals
pub const SIGNAL_HANDLER: &str = "onsignal";

// =============================================================================
// PROCESS TABLE LIMITS
// =============================================================================

/// First pid handed out by a process manager
/// Pid 0 is never allocated
pub const FIRST_PID: u16 = 1;
