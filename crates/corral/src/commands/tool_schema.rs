//! Tool-schema command - print the tool definition handed to a model.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;

use corral_tool::{ScriptTool, ToolRegistry};

use super::Context;

/// Arguments for the tool-schema command.
#[derive(Args, Debug)]
pub struct ToolSchemaArgs {}

/// Run the tool-schema command.
pub async fn run(_args: ToolSchemaArgs, ctx: &Context) -> Result<ExitCode> {
    let sandbox = ctx.sandbox(None)?;

    let mut registry = ToolRegistry::new();
    registry.register(ScriptTool::new(Arc::new(sandbox)));

    println!("{}", registry.definitions_json()?);
    Ok(ExitCode::SUCCESS)
}
