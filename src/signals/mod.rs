/*!
 * Signals Module
 * Signal numbers and delivery outcomes for script processes
 */

pub mod types;

// Re-export public API
pub use types::{Signal, SignalError, SignalOutcome, SignalResult};
