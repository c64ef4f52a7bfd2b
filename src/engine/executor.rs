/*!
 * Script Executor
 *
 * Loads script files and calls global functions. The interpreter keeps a
 * single pending-exception slot per context; every entry point here reads
 * and clears it before returning, so each eval or call yields its own
 * `ScriptResult` and nothing leaks into the next one.
 */

use super::context::EngineContext;
use super::convert::{describe_exception, js_to_json, json_to_js};
use super::interrupt::{InterruptReason, InterruptState};
use super::types::{EngineError, ScriptError, ScriptResult};
use crate::core::types::Pid;
use rquickjs::context::EvalOptions;
use rquickjs::function::Args;
use rquickjs::{Ctx, Value};
use serde_json::Value as JsonValue;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// How an engine entry went wrong, before interrupt classification
enum Fault {
    Missing,
    Exception(String),
    Engine(EngineError),
}

/// Consume the pending exception for a failed engine entry
fn fault_from<'js>(ctx: &Ctx<'js>, err: rquickjs::Error) -> Fault {
    match err {
        rquickjs::Error::Exception => Fault::Exception(describe_exception(&ctx.catch())),
        other => {
            let _ = ctx.catch();
            Fault::Engine(EngineError::from(other))
        }
    }
}

pub struct ScriptExecutor {
    pid: Pid,
    engine: EngineContext,
    interrupt: Arc<InterruptState>,
    call_timeout: Option<Duration>,
}

impl ScriptExecutor {
    pub fn new(
        pid: Pid,
        engine: EngineContext,
        interrupt: Arc<InterruptState>,
        call_timeout: Option<Duration>,
    ) -> Self {
        Self {
            pid,
            engine,
            interrupt,
            call_timeout,
        }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn engine(&self) -> &EngineContext {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut EngineContext {
        &mut self.engine
    }

    pub fn interrupt(&self) -> &InterruptState {
        &self.interrupt
    }

    /// Read a script file and evaluate it in the global scope
    #[instrument(skip(self), fields(pid = self.pid))]
    pub fn load_script(&mut self, path: &Path) -> ScriptResult<()> {
        let origin = path.display().to_string();
        let source = std::fs::read_to_string(path).map_err(|e| ScriptError::Load {
            path: origin.clone(),
            reason: e.to_string(),
        })?;
        debug!(bytes = source.len(), "Script source read");
        self.eval_source(&origin, source)
    }

    /// Evaluate source text as a sloppy-mode global script
    ///
    /// Top-level code that throws leaves every definition made before the
    /// throw in place.
    pub fn eval_source(&mut self, origin: &str, source: String) -> ScriptResult<()> {
        self.interrupt.arm(self.call_timeout);
        let outcome = self.engine.with(|ctx| {
            let mut options = EvalOptions::default();
            options.global = true;
            options.strict = false;
            ctx.eval_with_options::<Value, _>(source, options)
                .map(|_| ())
                .map_err(|e| fault_from(&ctx, e))
        });
        self.engine.run_pending_jobs();
        let reason = self.interrupt.disarm();

        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(fault)) => Err(self.classify(origin, fault, reason, |exception| {
                ScriptError::Evaluation {
                    path: origin.to_string(),
                    exception,
                }
            })),
            Err(source) => Err(ScriptError::Engine {
                pid: self.pid,
                source,
            }),
        }
    }

    /// Whether `name` resolves to a callable global
    pub fn has_function(&self, name: &str) -> bool {
        self.engine
            .with(|ctx| {
                ctx.globals()
                    .get::<_, Value>(name)
                    .map(|v| v.is_function())
                    .unwrap_or(false)
            })
            .unwrap_or(false)
    }

    /// Call a global function with JSON arguments
    #[instrument(skip(self, args), fields(pid = self.pid, argc = args.len()))]
    pub fn call(&mut self, name: &str, args: &[JsonValue]) -> ScriptResult<JsonValue> {
        self.interrupt.arm(self.call_timeout);
        let outcome = self.engine.with(|ctx| -> Result<JsonValue, Fault> {
            let target: Value = ctx
                .globals()
                .get(name)
                .map_err(|e| fault_from(&ctx, e))?;
            let Some(function) = target.as_function() else {
                return Err(Fault::Missing);
            };

            let mut call_args = Args::new(ctx.clone(), args.len());
            for arg in args {
                let value = json_to_js(&ctx, arg).map_err(Fault::Engine)?;
                call_args.push_arg(value).map_err(|e| fault_from(&ctx, e))?;
            }

            let result: Value = function
                .call_arg(call_args)
                .map_err(|e| fault_from(&ctx, e))?;
            js_to_json(&ctx, result).map_err(Fault::Engine)
        });
        self.engine.run_pending_jobs();
        let reason = self.interrupt.disarm();

        match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(Fault::Missing)) => Err(ScriptError::SymbolNotFound {
                pid: self.pid,
                name: name.to_string(),
            }),
            Ok(Err(fault)) => Err(self.classify(name, fault, reason, |exception| {
                ScriptError::Call {
                    pid: self.pid,
                    name: name.to_string(),
                    exception,
                }
            })),
            Err(source) => Err(ScriptError::Engine {
                pid: self.pid,
                source,
            }),
        }
    }

    /// An exception raised because the interrupt hook fired is reported by
    /// its cause, not as a script error
    fn classify<F>(
        &self,
        target: &str,
        fault: Fault,
        reason: Option<InterruptReason>,
        on_exception: F,
    ) -> ScriptError
    where
        F: FnOnce(String) -> ScriptError,
    {
        // exit() throws before the hook has a chance to poll
        let reason = reason.or_else(|| {
            self.interrupt
                .exit_requested()
                .map(|_| InterruptReason::Exit)
        });
        match (reason, fault) {
            (Some(InterruptReason::Exit), _) => ScriptError::Exited {
                pid: self.pid,
                code: self.interrupt.exit_requested().unwrap_or_default(),
            },
            (Some(InterruptReason::Cancelled), _) => ScriptError::Cancelled {
                pid: self.pid,
                target: target.to_string(),
            },
            (Some(InterruptReason::Deadline), _) => ScriptError::Timeout {
                pid: self.pid,
                target: target.to_string(),
                limit_ms: self
                    .call_timeout
                    .map(|t| t.as_millis() as u64)
                    .unwrap_or_default(),
            },
            (None, Fault::Exception(exception)) => on_exception(exception),
            (None, Fault::Engine(source)) => ScriptError::Engine {
                pid: self.pid,
                source,
            },
            (None, Fault::Missing) => ScriptError::SymbolNotFound {
                pid: self.pid,
                name: target.to_string(),
            },
        }
    }
}

impl std::fmt::Debug for ScriptExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptExecutor")
            .field("pid", &self.pid)
            .field("engine", &self.engine)
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}
