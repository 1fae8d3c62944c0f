//! Configuration error types.

/// Result type alias for config operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur during configuration loading and resolution.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read a config file.
    #[error("failed to read config file '{path}': {source}")]
    ReadFile {
        path: String,
        source: std::io::Error,
    },

    /// Failed to write a config file.
    #[error("failed to write config file '{path}': {source}")]
    WriteFile {
        path: String,
        source: std::io::Error,
    },

    /// Failed to parse TOML.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Failed to serialize config.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// `config init` found a file already in place.
    #[error("{} already exists", .0.display())]
    AlreadyExists(std::path::PathBuf),

    /// No per-user config directory could be determined.
    #[error("could not determine the user config directory")]
    NoUserDir,

    /// A value is present but unusable.
    #[error("invalid config: {0}")]
    Invalid(String),

    /// A service token was expected in an environment variable that is unset.
    #[error("token for service '{service}' not found: environment variable {env_var} is not set")]
    TokenNotFound { service: String, env_var: String },
}
