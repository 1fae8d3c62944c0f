//! Configuration system for corral.
//!
//! Provides TOML-based configuration with:
//! - Execution settings (`[sandbox]`): timeout, concurrency, capability groups, limits
//! - Named service handles (`[services.<name>]`) bound into every script
//! - Config file layering (XDG user config + project-local overrides)
//! - Service token resolution (env var → config file)

pub mod discovery;
pub mod error;
pub mod secrets;
pub mod types;

pub use discovery::{load_config, user_config_dir, ConfigPaths, Layer, LoadedConfig};
pub use error::{ConfigError, Result};
pub use secrets::{resolve_token, ResolvedSecret, SecretSource};
pub use types::*;
