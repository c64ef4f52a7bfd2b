/*!
 * Interrupt Controller
 *
 * Shared between the interpreter's interrupt hook (polled on the worker
 * thread while script code runs) and the host (cancel, exit requests).
 * All state is atomic; the hook never takes a lock.
 */

use crate::core::types::ExitCode;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, AtomicU8, Ordering};
use std::time::{Duration, Instant};

/// Why the interpreter was asked to stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptReason {
    Deadline,
    Cancelled,
    Exit,
}

const TRIP_NONE: u8 = 0;
const TRIP_DEADLINE: u8 = 1;
const TRIP_CANCELLED: u8 = 2;
const TRIP_EXIT: u8 = 3;

/// Deadline value meaning "no deadline armed"
const NO_DEADLINE: u64 = 0;

#[derive(Debug)]
pub struct InterruptState {
    epoch: Instant,
    /// Nanoseconds after `epoch`, `NO_DEADLINE` when disarmed
    deadline: AtomicU64,
    cancelled: AtomicBool,
    exit_requested: AtomicBool,
    exit_code: AtomicI32,
    tripped: AtomicU8,
}

impl InterruptState {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            deadline: AtomicU64::new(NO_DEADLINE),
            cancelled: AtomicBool::new(false),
            exit_requested: AtomicBool::new(false),
            exit_code: AtomicI32::new(0),
            tripped: AtomicU8::new(TRIP_NONE),
        }
    }

    /// Start a new engine entry with an optional wall-clock budget
    pub fn arm(&self, budget: Option<Duration>) {
        self.tripped.store(TRIP_NONE, Ordering::Release);
        let deadline = match budget {
            Some(budget) => self
                .epoch
                .elapsed()
                .checked_add(budget)
                .map_or(u64::MAX, ticks),
            None => NO_DEADLINE,
        };
        self.deadline.store(deadline, Ordering::Release);
    }

    /// End the current engine entry; reports whether the hook fired during it
    pub fn disarm(&self) -> Option<InterruptReason> {
        self.deadline.store(NO_DEADLINE, Ordering::Release);
        match self.tripped.swap(TRIP_NONE, Ordering::AcqRel) {
            TRIP_DEADLINE => Some(InterruptReason::Deadline),
            TRIP_CANCELLED => Some(InterruptReason::Cancelled),
            TRIP_EXIT => Some(InterruptReason::Exit),
            _ => None,
        }
    }

    /// Polled by the interpreter; `true` aborts the running script
    pub fn should_interrupt(&self) -> bool {
        if self.cancelled.load(Ordering::Acquire) {
            self.tripped.store(TRIP_CANCELLED, Ordering::Release);
            return true;
        }
        if self.exit_requested.load(Ordering::Acquire) {
            self.tripped.store(TRIP_EXIT, Ordering::Release);
            return true;
        }
        let deadline = self.deadline.load(Ordering::Acquire);
        if deadline != NO_DEADLINE && ticks(self.epoch.elapsed()) >= deadline {
            self.tripped.store(TRIP_DEADLINE, Ordering::Release);
            return true;
        }
        false
    }

    /// Sticky: every later engine entry is interrupted immediately
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Record a script-requested exit; the first code wins
    pub fn request_exit(&self, code: ExitCode) {
        if self
            .exit_requested
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.exit_code.store(code, Ordering::Release);
        }
    }

    pub fn exit_requested(&self) -> Option<ExitCode> {
        self.exit_requested
            .load(Ordering::Acquire)
            .then(|| self.exit_code.load(Ordering::Acquire))
    }
}

impl Default for InterruptState {
    fn default() -> Self {
        Self::new()
    }
}

/// Nanoseconds since the epoch, offset by one so that zero stays NO_DEADLINE;
/// saturates for budgets too large to represent
fn ticks(offset: Duration) -> u64 {
    u64::try_from(offset.as_nanos())
        .unwrap_or(u64::MAX)
        .saturating_add(1)
}
