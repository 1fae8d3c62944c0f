//! Error types for the tool crate.

use thiserror::Error;

/// Result type alias using the tool error type.
pub type Result<T> = std::result::Result<T, ToolError>;

/// Error type for tool operations.
///
/// Script failures are not errors here: they come back as
/// [`ToolResult::Error`](crate::ToolResult::Error) so the model can react.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Tool not found in registry.
    #[error("Tool not found: {0}")]
    NotFound(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
