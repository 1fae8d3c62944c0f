//! Config command - configuration management.

use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, Subcommand};

use corral_config::{Layer, SecretSource, ServiceConfig};

use super::Context;

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the resolved configuration and where it came from
    Show,

    /// Show configuration file path
    Path,

    /// Initialize a config file with defaults
    Init {
        /// Create project-local config (./corral.toml) instead of user config
        #[arg(long)]
        local: bool,
    },
}

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<ExitCode> {
    match args.command {
        ConfigCommand::Show => cmd_show(ctx)?,
        ConfigCommand::Path => cmd_path(ctx)?,
        ConfigCommand::Init { local } => cmd_init(local, ctx)?,
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_show(ctx: &Context) -> Result<()> {
    let loaded = ctx.load_config();
    let config = &loaded.config;

    if ctx.json_output {
        let report = serde_json::json!({
            "sources": loaded.files,
            "config": config,
            "warnings": loaded.warnings,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("# Corral Configuration\n");

    let sources = &loaded.files;
    if sources.is_empty() {
        println!("No config files loaded (using defaults)\n");
    } else {
        println!("Config files:");
        for source in sources {
            println!("  {}", source.display());
        }
        println!();
    }

    let sandbox = config.sandbox_or_default();
    println!("Sandbox:");
    println!("  timeout:        {}s", sandbox.timeout_secs);
    println!("  abandon grace:  {}ms", sandbox.abandon_grace_ms);
    println!("  max concurrent: {}", sandbox.max_concurrent);
    println!("  capabilities:   {}", sandbox.capabilities.join(", "));
    println!();

    if config.services.is_empty() {
        println!("No services configured\n");
    } else {
        println!("Services:");
        for (name, service) in &config.services {
            match service {
                ServiceConfig::Memory => println!("  {:<12} memory", name),
                ServiceConfig::Http(http) => {
                    let token = match corral_config::resolve_token(name, http) {
                        Ok(Some(secret)) => match secret.source {
                            SecretSource::EnvVar(var) => format!("(token from {} ✓)", var),
                            SecretSource::ConfigFile => "(plaintext token)".to_string(),
                        },
                        Ok(None) => "(no token)".to_string(),
                        Err(e) => format!("({})", e),
                    };
                    println!("  {:<12} http {}  {}", name, http.base_url, token);
                }
            }
        }
        println!();
    }

    if !loaded.warnings.is_empty() {
        println!("Warnings:");
        for w in &loaded.warnings {
            println!("  ⚠ {}", w);
        }
        println!();
    }

    if ctx.verbose {
        println!("---\nRaw config:\n");
        println!("{}", config.to_toml()?);
    }

    Ok(())
}

fn cmd_path(ctx: &Context) -> Result<()> {
    let paths = ctx.config_paths();

    if ctx.json_output {
        let report = serde_json::json!({ "user": paths.user, "project": paths.project });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    match &paths.user {
        Some(path) => println!("{}", path.display()),
        None => eprintln!("Could not determine config directory"),
    }
    Ok(())
}

fn cmd_init(local: bool, ctx: &Context) -> Result<()> {
    let layer = if local { Layer::Project } else { Layer::User };
    let path = ctx.config_paths().init(layer)?;
    println!("Created {}", path.display());
    Ok(())
}
