//! Corral - run short scripts in a capability-restricted sandbox
//!
//! Main entry point for the Corral CLI.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{capabilities, check, config, run, tool_schema};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Corral - run short scripts in a capability-restricted sandbox
#[derive(Parser)]
#[command(name = "corral")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Directory holding the project-local corral.toml (default: current directory)
    #[arg(long, global = true, env = "CORRAL_PROJECT_DIR")]
    pub project: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Execute a script in the sandbox
    Run(run::RunArgs),

    /// Compile a script without running it
    Check(check::CheckArgs),

    /// List capability groups and service handles
    Capabilities(capabilities::CapabilitiesArgs),

    /// Print the execute_script tool definition
    ToolSchema(tool_schema::ToolSchemaArgs),

    /// Configuration management
    Config(config::ConfigArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

/// How long shutdown waits for an abandoned script worker.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Console (human-readable, stderr) + rotating JSON file
    let filter = if cli.verbose {
        "corral=debug,corral_sandbox=debug,corral_tool=debug,corral_config=debug,info"
    } else {
        "corral=info,corral_sandbox=warn,corral_tool=warn,corral_config=warn,warn"
    };

    let log_dir = corral_config::user_config_dir()
        .map(|d| d.join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"));
    let file_appender = tracing_appender::rolling::RollingFileAppender::builder()
        .rotation(tracing_appender::rolling::Rotation::DAILY)
        .filename_prefix("corral")
        .filename_suffix("log")
        .build(&log_dir)
        .ok();
    let (non_blocking, _guard) = match file_appender {
        Some(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(non_blocking.map(|writer| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "corral=trace,corral_sandbox=trace,corral_tool=trace,corral_config=trace,info",
                ))
        }))
        .init();

    let ctx = commands::Context {
        json_output: cli.json,
        verbose: cli.verbose,
        project_dir: cli.project,
    };

    // Built by hand so a worker stuck past its deadline cannot hold up exit.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let result = runtime.block_on(async {
        match cli.command {
            Commands::Run(args) => run::run(args, &ctx).await,
            Commands::Check(args) => check::run(args, &ctx).await,
            Commands::Capabilities(args) => capabilities::run(args, &ctx).await,
            Commands::ToolSchema(args) => tool_schema::run(args, &ctx).await,
            Commands::Config(args) => config::run(args, &ctx).await,
        }
    });

    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    result
}
