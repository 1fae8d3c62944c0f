//! Error types for sandbox construction and service calls.
//!
//! Script failures are never errors at this level: they are reported as
//! [`ExecutionResult`](crate::ExecutionResult) values. [`SandboxError`] only
//! covers the cases where a [`Sandbox`](crate::Sandbox) cannot be built.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while constructing a sandbox.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// The sandbox configuration is unusable.
    #[error("Invalid sandbox configuration: {0}")]
    InvalidConfig(String),

    /// A service handle name cannot be bound in the script scope.
    #[error("Invalid service name '{name}': {reason}")]
    InvalidServiceName { name: String, reason: String },

    /// Two service handles share a binding name.
    #[error("Duplicate service name: {0}")]
    DuplicateService(String),

    /// A service handle failed to initialize.
    #[error("Failed to initialize service '{name}': {reason}")]
    ServiceInit { name: String, reason: String },

    /// Unknown capability group name.
    #[error("Unknown capability: {0}")]
    UnknownCapability(String),

    /// The execution timeout must be positive.
    #[error("Execution timeout must be greater than zero (got {0:?})")]
    ZeroTimeout(Duration),
}

/// Result type for sandbox construction.
pub type SandboxResult<T> = std::result::Result<T, SandboxError>;

/// Errors returned by a [`Service`](crate::Service) method call.
///
/// These surface to the script as run-time errors, which in turn become
/// `Failed` results unless the script catches them.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The service has no method with this name.
    #[error("{service} has no method '{method}'")]
    UnknownMethod { service: String, method: String },

    /// The arguments passed by the script are malformed.
    #[error("invalid arguments for {method}: {reason}")]
    InvalidArguments { method: String, reason: String },

    /// The request could not be completed.
    #[error("request failed: {0}")]
    Request(String),

    /// The remote side answered with an error status.
    #[error("request returned status {status}: {body}")]
    Status { status: u16, body: String },
}

impl ServiceError {
    /// Create an invalid-arguments error.
    pub fn invalid_arguments(method: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArguments {
            method: method.into(),
            reason: reason.into(),
        }
    }
}
