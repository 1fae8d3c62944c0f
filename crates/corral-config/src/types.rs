//! Configuration types mapping to the TOML schema.
//!
//! Top-level config:
//! ```toml
//! [sandbox]                # execution limits and capability groups
//! [services.kv]            # named service handles bound into every script
//! [services.github]
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Capability group names enabled when `capabilities` is not set.
pub const DEFAULT_CAPABILITIES: &[&str] = &[
    "arithmetic",
    "logic",
    "strings",
    "arrays",
    "maps",
    "iteration",
    "math",
    "builtins",
    "json",
];

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g. project-local
/// overrides) can be loaded and merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorralConfig {
    /// Execution settings (`[sandbox]`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sandbox: Option<SandboxSection>,

    /// Service handles (`[services.<name>]`), keyed by binding name.
    pub services: BTreeMap<String, ServiceConfig>,
}

impl CorralConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// The config written by `corral config init`.
    pub fn starter() -> Self {
        let mut services = BTreeMap::new();
        services.insert("kv".to_string(), ServiceConfig::Memory);
        Self {
            sandbox: Some(SandboxSection::default()),
            services,
        }
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> crate::Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> crate::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    ///
    /// `[sandbox]` is replaced as a whole; services are merged by name.
    pub fn merge(&mut self, other: CorralConfig) {
        if other.sandbox.is_some() {
            self.sandbox = other.sandbox;
        }

        for (name, service) in other.services {
            self.services.insert(name, service);
        }
    }

    /// The sandbox section, or its defaults.
    pub fn sandbox_or_default(&self) -> SandboxSection {
        self.sandbox.clone().unwrap_or_default()
    }

    /// Names of services that store a token directly in the file.
    pub fn plaintext_token_services(&self) -> Vec<&str> {
        self.services
            .iter()
            .filter(|(_, service)| service.has_plaintext_token())
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sandbox Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Sandbox section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxSection {
    /// Wall-clock limit per execution, in seconds.
    pub timeout_secs: u64,
    /// Grace period before an unresponsive worker is abandoned, in milliseconds.
    pub abandon_grace_ms: u64,
    /// Executions allowed to run at once.
    pub max_concurrent: usize,
    /// Enabled capability groups.
    pub capabilities: Vec<String>,
    /// Largest accepted script, in bytes.
    pub max_code_bytes: usize,
    /// Output kept per execution, in bytes.
    pub max_output_bytes: usize,
    /// Interpreter operation budget (0 = unlimited).
    pub max_operations: u64,
}

impl Default for SandboxSection {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            abandon_grace_ms: 500,
            max_concurrent: 1,
            capabilities: DEFAULT_CAPABILITIES.iter().map(|s| s.to_string()).collect(),
            max_code_bytes: 64 * 1024,
            max_output_bytes: 1024 * 1024,
            max_operations: 0,
        }
    }
}

impl SandboxSection {
    /// Check values that would make the sandbox unusable.
    pub fn validate(&self) -> crate::Result<()> {
        if self.timeout_secs == 0 {
            return Err(crate::ConfigError::Invalid(
                "[sandbox] timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.max_concurrent == 0 {
            return Err(crate::ConfigError::Invalid(
                "[sandbox] max_concurrent must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Service Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// One `[services.<name>]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ServiceConfig {
    /// In-process key/value store.
    Memory,
    /// Authenticated HTTP API client.
    Http(HttpServiceSection),
}

impl ServiceConfig {
    /// The `kind` value as written in the file.
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceConfig::Memory => "memory",
            ServiceConfig::Http(_) => "http",
        }
    }

    /// Returns true if a token is stored directly in the config file.
    pub fn has_plaintext_token(&self) -> bool {
        matches!(self, ServiceConfig::Http(http) if http.token.is_some())
    }
}

/// Settings for an HTTP service handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpServiceSection {
    /// Requests are confined to this URL.
    pub base_url: String,
    /// Environment variable holding the bearer token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,
    /// Bearer token stored in the file (plaintext, not recommended).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Per-request timeout, in seconds.
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
    /// Extra headers sent with every request.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

fn default_http_timeout() -> u64 {
    10
}
