//! CLI command handlers.

pub mod capabilities;
pub mod check;
pub mod config;
pub mod run;
pub mod tool_schema;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use clap::Args;

use corral_config::{ConfigPaths, CorralConfig, LoadedConfig, ServiceConfig};
use corral_sandbox::{
    Allowlist, HttpService, HttpServiceConfig, MemoryStore, Sandbox, SandboxConfig, ServiceSet,
};

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
    /// Directory searched for `corral.toml`.
    pub project_dir: Option<PathBuf>,
}

impl Context {
    /// Load the layered configuration, logging any warnings.
    pub fn load_config(&self) -> LoadedConfig {
        let loaded = self.config_paths().load();
        for warning in &loaded.warnings {
            tracing::warn!("{}", warning);
        }
        loaded
    }

    /// Both config layers for this invocation.
    pub fn config_paths(&self) -> ConfigPaths {
        ConfigPaths::resolve(self.project_dir.as_deref())
    }

    /// Build a sandbox from the loaded configuration.
    ///
    /// `timeout_secs` overrides `[sandbox] timeout_secs`.
    pub fn sandbox(&self, timeout_secs: Option<u64>) -> Result<Sandbox> {
        let loaded = self.load_config();
        build_sandbox(&loaded.config, timeout_secs)
    }
}

/// Script source shared by `run` and `check`.
#[derive(Args, Debug)]
pub struct SourceArgs {
    /// Script file (reads stdin when neither FILE nor --code is given)
    pub file: Option<PathBuf>,

    /// Inline script source
    #[arg(short = 'e', long = "code", conflicts_with = "file")]
    pub code: Option<String>,
}

impl SourceArgs {
    pub fn read(&self) -> Result<String> {
        if let Some(code) = &self.code {
            return Ok(code.clone());
        }
        match &self.file {
            Some(path) => std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display())),
            None => std::io::read_to_string(std::io::stdin()).context("failed to read stdin"),
        }
    }
}

pub fn build_sandbox(config: &CorralConfig, timeout_secs: Option<u64>) -> Result<Sandbox> {
    let section = config.sandbox_or_default();
    section.validate()?;

    let sandbox_config = SandboxConfig::new()
        .with_timeout(Duration::from_secs(timeout_secs.unwrap_or(section.timeout_secs)))
        .with_abandon_grace(Duration::from_millis(section.abandon_grace_ms))
        .with_max_concurrent(section.max_concurrent)
        .with_max_code_bytes(section.max_code_bytes)
        .with_max_output_bytes(section.max_output_bytes)
        .with_max_operations(section.max_operations);

    let allowlist = Allowlist::from_names(&section.capabilities)
        .context("invalid [sandbox] capabilities")?;
    let services = build_services(config)?;

    Ok(Sandbox::with_allowlist(sandbox_config, allowlist, services)?)
}

fn build_services(config: &CorralConfig) -> Result<ServiceSet> {
    let mut services = ServiceSet::new();

    for (name, service) in &config.services {
        match service {
            ServiceConfig::Memory => {
                services.insert(name.clone(), Arc::new(MemoryStore::new()))?;
            }
            ServiceConfig::Http(http) => {
                let mut http_config = HttpServiceConfig::new(&http.base_url)
                    .with_timeout(Duration::from_secs(http.timeout_secs));
                for (header, value) in &http.headers {
                    http_config = http_config.with_header(header, value);
                }
                if let Some(secret) = corral_config::resolve_token(name, http)? {
                    tracing::debug!(service = %name, source = %secret.source, "Resolved service token");
                    http_config = http_config.with_token(secret.value);
                }
                services.insert(name.clone(), Arc::new(HttpService::new(name, http_config)?))?;
            }
        }
    }

    Ok(services)
}
