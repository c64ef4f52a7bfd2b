/*!
 * Engine Context Manager
 *
 * One QuickJS runtime + context per process. The pair is created on the
 * process's worker thread and never leaves it.
 */

use super::interrupt::InterruptState;
use super::types::{EngineError, EngineResult};
use crate::core::config::EngineLimits;
use rquickjs::{Context, Ctx, Runtime};
use std::sync::Arc;
use tracing::{debug, trace};

struct LiveEngine {
    // Declared first so it is released before the runtime that owns it
    context: Context,
    runtime: Runtime,
}

/// Exclusively owned interpreter instance
pub struct EngineContext {
    inner: Option<LiveEngine>,
}

impl EngineContext {
    /// Create a fresh context with no exception state and no globals beyond the builtins
    pub fn create(limits: &EngineLimits, interrupt: Arc<InterruptState>) -> EngineResult<Self> {
        let runtime = Runtime::new().map_err(|e| EngineError::Creation(e.to_string()))?;
        if limits.memory_limit > 0 {
            runtime.set_memory_limit(limits.memory_limit);
        }
        if limits.max_stack_size > 0 {
            runtime.set_max_stack_size(limits.max_stack_size);
        }
        runtime.set_gc_threshold(limits.gc_threshold);
        runtime.set_interrupt_handler(Some(Box::new(move || interrupt.should_interrupt())));

        let context = Context::full(&runtime).map_err(|e| EngineError::Creation(e.to_string()))?;

        debug!(
            memory_limit = limits.memory_limit,
            max_stack_size = limits.max_stack_size,
            "Engine context created"
        );
        Ok(Self {
            inner: Some(LiveEngine { context, runtime }),
        })
    }

    pub fn is_live(&self) -> bool {
        self.inner.is_some()
    }

    /// Run `f` inside the context
    pub fn with<F, R>(&self, f: F) -> EngineResult<R>
    where
        F: for<'js> FnOnce(Ctx<'js>) -> R,
    {
        let live = self.inner.as_ref().ok_or(EngineError::Destroyed)?;
        Ok(live.context.with(f))
    }

    /// Drive queued promise jobs to completion; returns how many ran
    pub fn run_pending_jobs(&self) -> usize {
        let Some(live) = self.inner.as_ref() else {
            return 0;
        };
        let mut ran = 0;
        while live.runtime.is_job_pending() {
            match live.runtime.execute_pending_job() {
                Ok(true) => ran += 1,
                Ok(false) => break,
                Err(_) => {
                    // The job's rejection stays with its promise
                    trace!("Pending job raised");
                    ran += 1;
                }
            }
        }
        ran
    }

    /// Tear down: drop the interrupt hook, discard any pending exception,
    /// release context and runtime. Safe to call any number of times.
    pub fn destroy(&mut self) {
        let Some(live) = self.inner.take() else {
            return;
        };
        live.runtime.set_interrupt_handler(None);
        live.context.with(|ctx| {
            let _ = ctx.catch();
        });
        drop(live.context);
        live.runtime.run_gc();
        drop(live.runtime);
        debug!("Engine context destroyed");
    }
}

impl Drop for EngineContext {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl std::fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineContext")
            .field("live", &self.is_live())
            .finish()
    }
}
