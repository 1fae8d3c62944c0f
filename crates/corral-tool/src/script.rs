//! The `execute_script` tool.

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use corral_sandbox::{ExecutionResult, Sandbox, format_secs};
use serde_json::{Value, json};

use crate::error::Result;
use crate::tool::{ParamResult, ParameterValidationError, Tool, ToolContext, ToolResult};

/// Name the tool is registered under.
pub const SCRIPT_TOOL_NAME: &str = "execute_script";

/// Validated parameters for the script tool.
#[derive(Debug, Clone)]
pub struct ScriptParams {
    /// The Rhai source to run.
    pub code: String,
}

impl TryFrom<Value> for ScriptParams {
    type Error = ParameterValidationError;

    fn try_from(params: Value) -> ParamResult<Self> {
        let code = params["code"]
            .as_str()
            .ok_or(ParameterValidationError::MissingRequired {
                name: "code",
                hint: "provide the Rhai script to execute",
            })?;

        if code.trim().is_empty() {
            return Err(ParameterValidationError::InvalidValue {
                name: "code",
                message: "code cannot be empty".to_string(),
            });
        }

        Ok(Self {
            code: code.to_string(),
        })
    }
}

/// Runs model-written scripts in a [`Sandbox`].
pub struct ScriptTool {
    sandbox: Arc<Sandbox>,
    description: String,
}

impl ScriptTool {
    pub fn new(sandbox: Arc<Sandbox>) -> Self {
        let description = describe(&sandbox);
        Self {
            sandbox,
            description,
        }
    }

    pub fn sandbox(&self) -> &Arc<Sandbox> {
        &self.sandbox
    }
}

fn describe(sandbox: &Sandbox) -> String {
    let mut text = format!(
        "Execute a short Rhai script in a sandbox and return everything it prints. \
         Use print() for results. Scripts stop after {}s. \
         Only these capability groups are available: {}.",
        format_secs(sandbox.timeout()),
        sandbox
            .allowlist()
            .capabilities()
            .map(|c| c.name())
            .collect::<Vec<_>>()
            .join(", ")
    );

    if sandbox.allowlist().contains(corral_sandbox::Capability::Json) {
        text.push_str(" Use json::dumps(value) and json::loads(text) for JSON.");
    }

    if !sandbox.services().is_empty() {
        text.push_str(" Pre-authorized service handles:");
        for handle in sandbox.services().iter() {
            let _ = write!(
                text,
                " `{}` ({}: {})",
                handle.name(),
                handle.kind(),
                handle.methods().join(", ")
            );
        }
        text.push_str(". Call them as name.method(args).");
    }

    text
}

#[async_trait]
impl Tool for ScriptTool {
    fn name(&self) -> &str {
        SCRIPT_TOOL_NAME
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "code": {
                    "type": "string",
                    "description": "Rhai script to execute. Output is whatever it prints."
                }
            },
            "required": ["code"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<ToolResult> {
        if ctx.is_cancelled() {
            return Ok(ToolResult::error("Operation cancelled"));
        }

        let script = match ScriptParams::try_from(params) {
            Ok(p) => p,
            Err(e) => return Ok(ToolResult::error(e.to_string())),
        };

        let result = self
            .sandbox
            .execute_with_cancellation(&script.code, &ctx.cancellation)
            .await;

        tracing::debug!(
            tool_call_id = ctx.tool_call_id.as_deref().unwrap_or("-"),
            success = result.is_success(),
            "execute_script finished"
        );

        Ok(match result {
            ExecutionResult::Success { output } => ToolResult::text(output),
            other => ToolResult::error(other.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_params_valid() {
        let params = ScriptParams::try_from(json!({"code": "print(1);"})).unwrap();
        assert_eq!(params.code, "print(1);");
    }

    #[test]
    fn test_script_params_missing_code() {
        let err = ScriptParams::try_from(json!({})).unwrap_err();
        assert!(matches!(
            err,
            ParameterValidationError::MissingRequired { name: "code", .. }
        ));
    }

    #[test]
    fn test_script_params_empty_code() {
        let err = ScriptParams::try_from(json!({"code": "  \n"})).unwrap_err();
        assert!(matches!(
            err,
            ParameterValidationError::InvalidValue { name: "code", .. }
        ));
    }
}
