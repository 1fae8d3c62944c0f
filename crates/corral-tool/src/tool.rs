//! The seam between a model's tool call and the code that serves it.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, ToolError};

/// A bad argument in a tool call, phrased so the model can correct it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ParameterValidationError {
    #[error("missing required parameter '{name}': {hint}")]
    MissingRequired {
        name: &'static str,
        hint: &'static str,
    },

    #[error("'{name}' has invalid value: {message}")]
    InvalidValue {
        name: &'static str,
        message: String,
    },
}

pub type ParamResult<T> = std::result::Result<T, ParameterValidationError>;

/// Something a model can call by name with JSON arguments.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema of the arguments object.
    fn parameters(&self) -> Value;

    /// Serve one call. Problems the model can fix come back as
    /// [`ToolResult::Error`]; `Err` is reserved for host-side faults.
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolResult>;

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.parameters(),
        }
    }
}

/// Per-call state handed to [`Tool::execute`].
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub cancellation: CancellationToken,
    /// Call id assigned by the model, used only for log correlation.
    pub tool_call_id: Option<String>,
}

impl ToolContext {
    pub fn with_cancellation(cancellation: CancellationToken) -> Self {
        Self {
            cancellation,
            tool_call_id: None,
        }
    }

    pub fn with_tool_call_id(mut self, id: impl Into<String>) -> Self {
        self.tool_call_id = Some(id.into());
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

/// What goes back to the model after a call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolResult {
    Text { content: String },
    /// The model may retry with different arguments.
    Error { message: String },
}

impl ToolResult {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// The message body for the model. Errors get an `Error: ` prefix
    /// unless they already start with `Error`.
    pub fn to_llm_content(&self) -> String {
        match self {
            Self::Text { content } => content.clone(),
            Self::Error { message } if message.starts_with("Error") => message.clone(),
            Self::Error { message } => format!("Error: {message}"),
        }
    }
}

/// A tool as advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Tools keyed by name.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `tool`, replacing any tool with the same name.
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    /// Definitions in name order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|tool| tool.definition()).collect()
    }

    pub fn definitions_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.definitions())?)
    }

    /// Route a call to the tool named `name`.
    pub async fn execute(&self, name: &str, params: Value, ctx: &ToolContext) -> Result<ToolResult> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        tool.execute(params, ctx).await
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.tools.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Upper;

    #[async_trait]
    impl Tool for Upper {
        fn name(&self) -> &str {
            "upper"
        }

        fn description(&self) -> &str {
            "Uppercase the text parameter"
        }

        fn parameters(&self) -> Value {
            json!({
                "type": "object",
                "properties": {"text": {"type": "string"}},
                "required": ["text"]
            })
        }

        async fn execute(&self, params: Value, _ctx: &ToolContext) -> Result<ToolResult> {
            Ok(match params["text"].as_str() {
                Some(text) => ToolResult::text(text.to_uppercase()),
                None => ToolResult::error(
                    ParameterValidationError::MissingRequired {
                        name: "text",
                        hint: "pass the text to convert",
                    }
                    .to_string(),
                ),
            })
        }
    }

    #[test]
    fn test_llm_content_prefixing() {
        assert_eq!(ToolResult::text("hello").to_llm_content(), "hello");
        assert_eq!(
            ToolResult::error("something failed").to_llm_content(),
            "Error: something failed"
        );
        assert_eq!(
            ToolResult::error("Error executing code: boom").to_llm_content(),
            "Error executing code: boom"
        );
    }

    #[test]
    fn test_result_wire_format() {
        let json = serde_json::to_value(ToolResult::error("x")).unwrap();
        assert_eq!(json, json!({"type": "error", "message": "x"}));
        let restored: ToolResult = serde_json::from_value(json).unwrap();
        assert!(restored.is_error());
    }

    #[test]
    fn test_context_cancellation() {
        assert!(!ToolContext::default().is_cancelled());

        let token = CancellationToken::new();
        let ctx = ToolContext::with_cancellation(token.clone()).with_tool_call_id("call_1");
        assert_eq!(ctx.tool_call_id.as_deref(), Some("call_1"));
        token.cancel();
        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn test_registry_routes_by_name() {
        let mut registry = ToolRegistry::new();
        registry.register(Upper);
        let ctx = ToolContext::default();

        let definitions = registry.definitions();
        assert_eq!(definitions.len(), 1);
        assert_eq!(definitions[0].input_schema["required"][0], "text");
        assert!(registry.definitions_json().unwrap().contains("\"input_schema\""));

        let result = registry.execute("upper", json!({"text": "hi"}), &ctx).await.unwrap();
        assert_eq!(result, ToolResult::text("HI"));

        let missing = registry.execute("unknown", json!({}), &ctx).await;
        assert!(matches!(missing, Err(ToolError::NotFound(_))));
    }
}
