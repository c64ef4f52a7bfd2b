/*!
 * Engine Module
 * Embedded JavaScript interpreter: context lifecycle, interrupts, execution
 */

pub mod context;
pub mod convert;
pub mod executor;
pub mod interrupt;
pub mod types;

// Re-export for convenience
pub use context::EngineContext;
pub use executor::ScriptExecutor;
pub use interrupt::{InterruptReason, InterruptState};
pub use types::{EngineError, EngineResult, ScriptError, ScriptResult};
