//! Capabilities command - show what scripts can reach.

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;

use corral_sandbox::{Capability, DISABLED_SYMBOLS, Sandbox, format_secs};

use super::Context;

/// Arguments for the capabilities command.
#[derive(Args, Debug)]
pub struct CapabilitiesArgs {
    /// Also list capability groups that are switched off
    #[arg(short, long)]
    pub all: bool,
}

/// Run the capabilities command.
pub async fn run(args: CapabilitiesArgs, ctx: &Context) -> Result<ExitCode> {
    let sandbox = ctx.sandbox(None)?;

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&report(&sandbox))?);
        return Ok(ExitCode::SUCCESS);
    }

    println!("Capability groups:");
    for capability in Capability::ALL {
        let enabled = sandbox.allowlist().contains(capability);
        if !enabled && !args.all {
            continue;
        }
        let marker = if enabled { "✓" } else { "·" };
        println!("  {} {:<12} {}", marker, capability.name(), capability.summary());
    }
    println!();

    if sandbox.services().is_empty() {
        println!("No service handles configured");
    } else {
        println!("Service handles:");
        for handle in sandbox.services().iter() {
            println!(
                "  {:<12} {:<8} {}",
                handle.name(),
                handle.kind(),
                handle.methods().join(", ")
            );
        }
    }
    println!();

    println!("Disabled: {}", DISABLED_SYMBOLS.join(", "));
    println!("Timeout:  {}s", format_secs(sandbox.timeout()));

    Ok(ExitCode::SUCCESS)
}

fn report(sandbox: &Sandbox) -> serde_json::Value {
    let capabilities: Vec<_> = Capability::ALL
        .iter()
        .map(|c| {
            serde_json::json!({
                "name": c.name(),
                "enabled": sandbox.allowlist().contains(*c),
                "summary": c.summary(),
            })
        })
        .collect();

    let services: Vec<_> = sandbox
        .services()
        .iter()
        .map(|h| {
            serde_json::json!({
                "name": h.name(),
                "kind": h.kind(),
                "methods": h.methods(),
            })
        })
        .collect();

    serde_json::json!({
        "capabilities": capabilities,
        "services": services,
        "disabled": DISABLED_SYMBOLS,
        "timeout_ms": sandbox.timeout().as_millis() as u64,
    })
}
