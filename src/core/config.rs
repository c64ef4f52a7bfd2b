/*!
 * Kernel Configuration
 *
 * Defaults come from `core::limits`; a JSON file and `JSKERN_*`
 * environment variables can override them.
 */

use super::errors::KernelError;
use super::limits::*;
use super::serde::{is_default, optional_duration_millis};
use super::types::KernelResult;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// What happens to a process whose entry point raised an exception
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultPolicy {
    /// Record the fault and keep accepting invocations
    #[default]
    Continue,
    /// Terminate the process once `main` has faulted
    Terminate,
}

impl std::str::FromStr for FaultPolicy {
    type Err = KernelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "continue" => Ok(FaultPolicy::Continue),
            "terminate" => Ok(FaultPolicy::Terminate),
            other => Err(KernelError::Configuration(format!(
                "unknown fault policy '{}'",
                other
            ))),
        }
    }
}

/// Resource ceilings applied to every engine runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct EngineLimits {
    /// Heap ceiling in bytes (0 disables the limit)
    pub memory_limit: usize,
    /// Native stack budget in bytes (0 disables the limit)
    pub max_stack_size: usize,
    /// Allocation volume between GC cycles
    pub gc_threshold: usize,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            memory_limit: DEFAULT_ENGINE_MEMORY,
            max_stack_size: DEFAULT_ENGINE_STACK,
            gc_threshold: DEFAULT_ENGINE_GC_THRESHOLD,
        }
    }
}

impl EngineLimits {
    /// No ceilings at all (trusted scripts, benchmarks)
    pub fn unlimited() -> Self {
        Self {
            memory_limit: 0,
            max_stack_size: 0,
            gc_threshold: DEFAULT_ENGINE_GC_THRESHOLD,
        }
    }
}

/// Global kernel configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct KernelConfig {
    pub engine: EngineLimits,
    /// Budget for each eval/call, `None` lets scripts run unbounded
    #[serde(with = "optional_duration_millis")]
    pub call_timeout: Option<Duration>,
    pub queue_capacity: usize,
    #[serde(skip_serializing_if = "is_default")]
    pub fault_policy: FaultPolicy,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            engine: EngineLimits::default(),
            call_timeout: Some(DEFAULT_CALL_TIMEOUT),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            fault_policy: FaultPolicy::default(),
        }
    }
}

impl KernelConfig {
    /// Load configuration from a JSON file; missing keys keep their defaults
    pub fn from_json_file(path: impl AsRef<Path>) -> KernelResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw).map_err(|e| {
            KernelError::Configuration(format!("{}: {}", path.display(), e))
        })?;
        config.validate()?;
        debug!(path = %path.display(), "Loaded kernel configuration");
        Ok(config)
    }

    /// Defaults overlaid with `JSKERN_*` environment variables
    pub fn from_env() -> KernelResult<Self> {
        Self::default().with_env_overrides()
    }

    /// Overlay `JSKERN_*` environment variables onto this configuration
    ///
    /// - JSKERN_MEMORY_LIMIT: engine heap ceiling in bytes
    /// - JSKERN_STACK_SIZE: engine stack budget in bytes
    /// - JSKERN_CALL_TIMEOUT_MS: per-call budget, 0 disables
    /// - JSKERN_QUEUE_CAPACITY: pending jobs per process
    /// - JSKERN_FAULT_POLICY: `continue` or `terminate`
    pub fn with_env_overrides(mut self) -> KernelResult<Self> {
        if let Some(v) = env_parse::<usize>("JSKERN_MEMORY_LIMIT")? {
            self.engine.memory_limit = v;
        }
        if let Some(v) = env_parse::<usize>("JSKERN_STACK_SIZE")? {
            self.engine.max_stack_size = v;
        }
        if let Some(ms) = env_parse::<u64>("JSKERN_CALL_TIMEOUT_MS")? {
            self.call_timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }
        if let Some(v) = env_parse::<usize>("JSKERN_QUEUE_CAPACITY")? {
            self.queue_capacity = v;
        }
        if let Some(v) = env_parse::<FaultPolicy>("JSKERN_FAULT_POLICY")? {
            self.fault_policy = v;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_fault_policy(mut self, policy: FaultPolicy) -> Self {
        self.fault_policy = policy;
        self
    }

    pub fn with_engine_limits(mut self, limits: EngineLimits) -> Self {
        self.engine = limits;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn validate(&self) -> KernelResult<()> {
        if self.queue_capacity == 0 {
            return Err(KernelError::Configuration(
                "queue_capacity must be at least 1".to_string(),
            ));
        }
        if matches!(self.call_timeout, Some(t) if t.is_zero()) {
            return Err(KernelError::Configuration(
                "call_timeout must be positive; use null to disable".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_parse<T>(key: &str) -> KernelResult<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| KernelError::Configuration(format!("{}={}: {}", key, raw, e))),
        Err(_) => Ok(None),
    }
}
