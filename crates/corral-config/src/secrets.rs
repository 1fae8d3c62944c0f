//! Service token resolution.
//!
//! Resolution order:
//! 1. The environment variable named by `token_env`
//! 2. The `token` value in the config file (with warning at load time)
//!
//! A service that names a `token_env` which is unset fails to resolve even
//! when a plaintext token is present, so a missing secret is never masked
//! by a stale value in a file.

use crate::{ConfigError, HttpServiceSection, Result};

/// Result of token resolution with provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSecret {
    /// The secret value.
    pub value: String,
    /// Where the secret was found.
    pub source: SecretSource,
}

/// Where a secret was resolved from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretSource {
    /// Environment variable.
    EnvVar(String),
    /// Config file (plaintext, not recommended).
    ConfigFile,
}

impl std::fmt::Display for SecretSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecretSource::EnvVar(var) => write!(f, "env var {}", var),
            SecretSource::ConfigFile => write!(f, "config file (plaintext)"),
        }
    }
}

/// Resolve the bearer token for an HTTP service.
///
/// Returns `Ok(None)` when the service has no token configured at all.
pub fn resolve_token(service: &str, http: &HttpServiceSection) -> Result<Option<ResolvedSecret>> {
    resolve_token_with(service, http, |var| std::env::var(var).ok())
}

fn resolve_token_with(
    service: &str,
    http: &HttpServiceSection,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Option<ResolvedSecret>> {
    if let Some(env_var) = &http.token_env {
        return match lookup(env_var) {
            Some(value) if !value.is_empty() => Ok(Some(ResolvedSecret {
                value,
                source: SecretSource::EnvVar(env_var.clone()),
            })),
            _ => Err(ConfigError::TokenNotFound {
                service: service.to_string(),
                env_var: env_var.clone(),
            }),
        };
    }

    Ok(http.token.as_ref().map(|value| ResolvedSecret {
        value: value.clone(),
        source: SecretSource::ConfigFile,
    }))
}

// ─────────────────────────────────────────────────────────────────────────────
