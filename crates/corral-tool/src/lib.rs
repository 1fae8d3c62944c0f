//! Exposes a corral [`Sandbox`](corral_sandbox::Sandbox) as a tool a language
//! model can call.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use corral_tool::{ScriptTool, Tool, ToolContext};
//!
//! let tool = ScriptTool::new(Arc::new(sandbox));
//! let definition = tool.definition();
//! let result = tool
//!     .execute(serde_json::json!({"code": "print(1 + 1);"}), &ToolContext::default())
//!     .await?;
//! assert_eq!(result.to_llm_content(), "2\n");
//! ```

pub mod error;
pub mod script;
pub mod tool;

pub use error::{Result, ToolError};
pub use script::{SCRIPT_TOOL_NAME, ScriptParams, ScriptTool};
pub use tool::{
    ParamResult, ParameterValidationError, Tool, ToolContext, ToolDefinition, ToolRegistry,
    ToolResult,
};
