//! Where corral looks for configuration, and how the layers combine.
//!
//! There are exactly two layers: a per-user `config.toml` and a per-project
//! `corral.toml`. A project `[sandbox]` table replaces the user's whole;
//! `[services]` are merged by handle name. A file that fails to parse is
//! skipped with a warning and the other layer still applies.

use std::path::{Path, PathBuf};

use crate::{ConfigError, CorralConfig, Result};

const PROJECT_FILE: &str = "corral.toml";
const USER_FILE: &str = "config.toml";

/// Overrides the per-user config directory (tests, side-by-side installs).
const CONFIG_DIR_ENV: &str = "CORRAL_CONFIG_DIR";

/// One of the two configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    User,
    Project,
}

/// The merged configuration plus what went into it.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: CorralConfig,
    /// Files that were read and merged, user layer first.
    pub files: Vec<PathBuf>,
    pub warnings: Vec<String>,
}

/// Resolved locations of both layers for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPaths {
    /// `None` when no per-user directory can be determined.
    pub user: Option<PathBuf>,
    pub project: PathBuf,
}

impl ConfigPaths {
    /// Locate both layers; `project_dir` defaults to the working directory.
    pub fn resolve(project_dir: Option<&Path>) -> Self {
        Self {
            user: user_config_dir().map(|dir| dir.join(USER_FILE)),
            project: project_dir
                .unwrap_or_else(|| Path::new(""))
                .join(PROJECT_FILE),
        }
    }

    /// Read the user layer from `dir` instead of the default location.
    pub fn with_user_dir(mut self, dir: &Path) -> Self {
        self.user = Some(dir.join(USER_FILE));
        self
    }

    pub fn path(&self, layer: Layer) -> Option<&Path> {
        match layer {
            Layer::User => self.user.as_deref(),
            Layer::Project => Some(&self.project),
        }
    }

    /// Read and merge whichever layers exist.
    pub fn load(&self) -> LoadedConfig {
        let mut loaded = LoadedConfig {
            config: CorralConfig::new(),
            files: Vec::new(),
            warnings: Vec::new(),
        };

        for path in self.user.iter().chain(std::iter::once(&self.project)) {
            if !path.is_file() {
                continue;
            }
            match read_layer(path) {
                Ok(layer) => {
                    loaded.config.merge(layer);
                    loaded.files.push(path.clone());
                }
                Err(e) => loaded
                    .warnings
                    .push(format!("Skipped {}: {}", path.display(), e)),
            }
        }

        for name in loaded.config.plaintext_token_services() {
            loaded.warnings.push(format!(
                "[services.{name}] stores its token in plaintext; prefer token_env"
            ));
        }
        loaded
    }

    /// Write the starter config for `layer`. Existing files are left alone.
    pub fn init(&self, layer: Layer) -> Result<PathBuf> {
        let path = self.path(layer).ok_or(ConfigError::NoUserDir)?;
        if path.exists() {
            return Err(ConfigError::AlreadyExists(path.to_path_buf()));
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteFile {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        let contents = CorralConfig::starter().to_toml()?;
        std::fs::write(path, contents).map_err(|e| ConfigError::WriteFile {
            path: path.display().to_string(),
            source: e,
        })?;
        Ok(path.to_path_buf())
    }
}

/// Load both layers from their default locations.
pub fn load_config(project_dir: Option<&Path>) -> LoadedConfig {
    ConfigPaths::resolve(project_dir).load()
}

/// Per-user corral directory: `$CORRAL_CONFIG_DIR`, else the platform config dir.
pub fn user_config_dir() -> Option<PathBuf> {
    match std::env::var(CONFIG_DIR_ENV) {
        Ok(dir) if !dir.is_empty() => Some(PathBuf::from(dir)),
        _ => dirs::config_dir().map(|d| d.join("corral")),
    }
}

fn read_layer(path: &Path) -> Result<CorralConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    CorralConfig::from_toml(&contents)
}
