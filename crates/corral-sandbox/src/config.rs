//! Sandbox configuration.

use std::time::Duration;

use crate::error::{SandboxError, SandboxResult};

/// Default wall-clock limit per execution.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default time an unresponsive worker gets past its deadline before it is
/// abandoned.
pub const DEFAULT_ABANDON_GRACE: Duration = Duration::from_millis(500);

/// Interpreter resource limits applied to every execution.
///
/// A value of `0` disables the corresponding limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionLimits {
    /// Largest accepted source text, in bytes.
    pub max_code_bytes: usize,
    /// Output kept per execution before truncation, in bytes.
    pub max_output_bytes: usize,
    /// Interpreter operations per execution.
    pub max_operations: u64,
    /// Function call nesting depth.
    pub max_call_levels: usize,
    /// Expression nesting depth at global level.
    pub max_expr_depth: usize,
    /// Expression nesting depth inside functions.
    pub max_function_expr_depth: usize,
    /// Longest string a script may build, in bytes.
    pub max_string_size: usize,
    /// Largest array a script may build.
    pub max_array_size: usize,
    /// Largest object map a script may build.
    pub max_map_size: usize,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            max_code_bytes: 64 * 1024,
            max_output_bytes: 1024 * 1024,
            max_operations: 0,
            max_call_levels: 32,
            max_expr_depth: 64,
            max_function_expr_depth: 32,
            max_string_size: 1024 * 1024,
            max_array_size: 100_000,
            max_map_size: 100_000,
        }
    }
}

/// Configuration for sandboxed execution.
///
/// # Limits
///
/// - **Timeout**: wall-clock time per execution, measured from the moment
///   the execution starts running (not while it waits for a slot).
/// - **Concurrency**: at most `max_concurrent` executions run at once; the
///   rest queue.
/// - **Resources**: see [`ExecutionLimits`].
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Wall-clock limit per execution. Must be non-zero.
    pub timeout: Duration,

    /// Extra time an unresponsive worker gets before it is abandoned.
    pub abandon_grace: Duration,

    /// Executions allowed to run at the same time. Must be at least 1.
    pub max_concurrent: usize,

    /// Interpreter resource limits.
    pub limits: ExecutionLimits,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            abandon_grace: DEFAULT_ABANDON_GRACE,
            max_concurrent: 1,
            limits: ExecutionLimits::default(),
        }
    }
}

impl SandboxConfig {
    /// Create a new sandbox configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the execution timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the abandonment grace period.
    pub fn with_abandon_grace(mut self, grace: Duration) -> Self {
        self.abandon_grace = grace;
        self
    }

    /// Set how many executions may run at once.
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max;
        self
    }

    /// Replace all resource limits.
    pub fn with_limits(mut self, limits: ExecutionLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Set the largest accepted source text.
    pub fn with_max_code_bytes(mut self, bytes: usize) -> Self {
        self.limits.max_code_bytes = bytes;
        self
    }

    /// Set the output truncation limit.
    pub fn with_max_output_bytes(mut self, bytes: usize) -> Self {
        self.limits.max_output_bytes = bytes;
        self
    }

    /// Set the operation budget (0 = unlimited).
    pub fn with_max_operations(mut self, ops: u64) -> Self {
        self.limits.max_operations = ops;
        self
    }

    /// Check that the configuration can be used.
    pub fn validate(&self) -> SandboxResult<()> {
        if self.timeout.is_zero() {
            return Err(SandboxError::ZeroTimeout(self.timeout));
        }
        if self.max_concurrent == 0 {
            return Err(SandboxError::InvalidConfig(
                "max_concurrent must be at least 1".to_string(),
            ));
        }
        if self.limits.max_output_bytes == 0 {
            return Err(SandboxError::InvalidConfig(
                "max_output_bytes must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
