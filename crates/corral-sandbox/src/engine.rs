//! The sandboxed execution engine.

use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::allowlist::Allowlist;
use crate::capture::{CapturedOutput, OutputCapture};
use crate::config::SandboxConfig;
use crate::deadline::{Deadline, Interrupt, run_with_deadline};
use crate::error::SandboxResult;
use crate::outcome::{CANCELLED_MESSAGE, ExecutionResult, NO_OUTPUT_MARKER};
use crate::services::ServiceSet;

/// Reported instead of a worker panic's payload.
const INTERNAL_FAILURE: &str = "internal error while executing script";

/// Runs untrusted scripts against a fixed allowlist and service set.
///
/// Each execution gets its own interpreter, output buffer and deadline, so a
/// `Sandbox` can be shared freely (`Arc<Sandbox>`); `max_concurrent` bounds
/// how many executions are in flight at once.
///
/// # Side effects
///
/// Execution is not atomic. A script stopped by its deadline or by
/// cancellation keeps every service call it already made: a value written to
/// a store or a request sent to an API stands.
pub struct Sandbox {
    config: SandboxConfig,
    allowlist: Allowlist,
    services: ServiceSet,
    permits: Semaphore,
}

impl Sandbox {
    /// Create a sandbox with every capability group enabled.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: SandboxConfig, services: ServiceSet) -> SandboxResult<Self> {
        Self::with_allowlist(config, Allowlist::standard(), services)
    }

    /// Create a sandbox with an explicit allowlist.
    pub fn with_allowlist(
        config: SandboxConfig,
        allowlist: Allowlist,
        services: ServiceSet,
    ) -> SandboxResult<Self> {
        config.validate()?;

        tracing::info!(
            timeout_ms = config.timeout.as_millis() as u64,
            max_concurrent = config.max_concurrent,
            capabilities = allowlist.capabilities().count(),
            services = services.len(),
            "Sandbox created"
        );

        let permits = Semaphore::new(config.max_concurrent);
        Ok(Self {
            config,
            allowlist,
            services,
            permits,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.config.timeout
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    pub fn allowlist(&self) -> &Allowlist {
        &self.allowlist
    }

    pub fn services(&self) -> &ServiceSet {
        &self.services
    }

    /// Execute a script and classify the outcome.
    pub async fn execute(&self, code: &str) -> ExecutionResult {
        self.execute_with_cancellation(code, &CancellationToken::new())
            .await
    }

    /// Execute a script, stopping early if `cancel` fires.
    ///
    /// Cancellation while waiting for a slot or while running yields
    /// `Failed` with [`CANCELLED_MESSAGE`].
    pub async fn execute_with_cancellation(
        &self,
        code: &str,
        cancel: &CancellationToken,
    ) -> ExecutionResult {
        if let Err(error) = self.check_size(code) {
            return ExecutionResult::failed(error);
        }

        let _permit = tokio::select! {
            permit = self.permits.acquire() => match permit {
                Ok(permit) => permit,
                Err(_) => return ExecutionResult::failed(INTERNAL_FAILURE),
            },
            _ = cancel.cancelled() => return ExecutionResult::failed(CANCELLED_MESSAGE),
        };

        let started = Instant::now();
        let code_len = code.len();
        let code = code.to_string();
        let allowlist = self.allowlist.clone();
        let services = self.services.clone();
        let limits = self.config.limits.clone();

        let outcome = run_with_deadline(
            self.config.timeout,
            self.config.abandon_grace,
            cancel,
            move |deadline| {
                let capture = OutputCapture::new(limits.max_output_bytes);
                let mut scope = allowlist.build(&services, capture.sink(), deadline, &limits);
                let result = scope.run(&code).map_err(|e| e.to_string());
                (result, capture.finish())
            },
        )
        .await;

        let result = classify(outcome);
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            ExecutionResult::Success { output } => {
                tracing::debug!(code_len, elapsed_ms, output_len = output.len(), "Script succeeded")
            }
            ExecutionResult::TimedOut { timeout } => tracing::warn!(
                code_len,
                elapsed_ms,
                timeout_ms = timeout.as_millis() as u64,
                "Script timed out"
            ),
            ExecutionResult::Failed { error } => {
                tracing::debug!(code_len, elapsed_ms, error = %error, "Script failed")
            }
        }
        result
    }

    /// Compile a script against the isolated scope without running it.
    ///
    /// Catches syntax errors and references to unknown variables. Calls to
    /// unknown functions are only detected when the script runs.
    pub fn check(&self, code: &str) -> Result<(), String> {
        self.check_size(code)?;
        let capture = OutputCapture::new(1);
        let deadline = Deadline::start(self.config.timeout, CancellationToken::new());
        let scope = self
            .allowlist
            .build(&self.services, capture.sink(), deadline, &self.config.limits);
        scope
            .compile(code)
            .map(|_| ())
            .map_err(|e| redact(&e.to_string()))
    }

    fn check_size(&self, code: &str) -> Result<(), String> {
        let limit = self.config.limits.max_code_bytes;
        if limit > 0 && code.len() > limit {
            return Err(format!(
                "script is {} bytes, larger than the {limit} byte limit",
                code.len()
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for Sandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sandbox")
            .field("config", &self.config)
            .field("allowlist", &self.allowlist)
            .field("services", &self.services)
            .finish()
    }
}

fn classify(outcome: Result<(Result<(), String>, CapturedOutput), Interrupt>) -> ExecutionResult {
    match outcome {
        Ok((Ok(()), output)) => {
            let text = output.into_text();
            if text.is_empty() {
                ExecutionResult::success(NO_OUTPUT_MARKER)
            } else {
                ExecutionResult::success(text)
            }
        }
        Ok((Err(error), _)) => ExecutionResult::failed(redact(&error)),
        Err(Interrupt::TimedOut { limit }) => ExecutionResult::TimedOut { timeout: limit },
        Err(Interrupt::Cancelled) => ExecutionResult::failed(CANCELLED_MESSAGE),
        Err(Interrupt::Panicked) => ExecutionResult::failed(INTERNAL_FAILURE),
    }
}

/// Replace host paths in an error description.
///
/// The working directory becomes `.` and the home directory `~`.
pub(crate) fn redact(message: &str) -> String {
    let mut redacted = message.to_string();

    if let Ok(cwd) = std::env::current_dir() {
        let cwd = cwd.to_string_lossy();
        if cwd.len() > 1 {
            redacted = redacted.replace(cwd.as_ref(), ".");
        }
    }
    if let Some(home) = dirs::home_dir() {
        let home = home.to_string_lossy();
        if home.len() > 1 {
            redacted = redacted.replace(home.as_ref(), "~");
        }
    }

    redacted
}
