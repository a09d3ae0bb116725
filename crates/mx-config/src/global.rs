//! Global configuration.
//!
//! Global config is stored at `~/.config/mx/config.toml` (or platform
//! equivalent) and provides defaults that a project-local `mx.toml` overrides.

use crate::combine::Combine;
use crate::manifest::{Manifest, RepositorySettings, ResolutionSettings};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Error type for global config operations.
#[derive(Debug, Error)]
pub enum GlobalConfigError {
    #[error("failed to read global config: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("failed to parse global config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("failed to serialize global config: {0}")]
    SerializeError(#[from] toml::ser::Error),
}

/// Global configuration.
///
/// Same sections as [`Manifest`]; a catalog declared here is shared by every
/// project on the machine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub resolution: ResolutionSettings,

    #[serde(default, rename = "repository")]
    pub repositories: Vec<RepositorySettings>,

    #[serde(default)]
    pub catalog: BTreeMap<String, String>,
}

impl GlobalConfig {
    /// Parse global config from a TOML string.
    pub fn parse(s: &str) -> Result<Self, GlobalConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Parse global config from a file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, GlobalConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Serialize the global config to a TOML string.
    pub fn to_string(&self) -> Result<String, GlobalConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Write the global config to a file.
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<(), GlobalConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_string()?)?;
        Ok(())
    }

    /// Layer a project manifest over these defaults.
    pub fn apply_to(self, project: Manifest) -> Manifest {
        project.combine(Manifest {
            resolution: self.resolution,
            repositories: self.repositories,
            catalog: self.catalog,
        })
    }
}

/// Load the global configuration.
///
/// Returns `Ok(None)` if the global config file doesn't exist.
/// Returns `Err` if the file exists but can't be parsed.
pub fn load_global_config() -> Result<Option<GlobalConfig>, GlobalConfigError> {
    let config_file = match mx_cache::global_config_file() {
        Ok(path) => path,
        Err(_) => {
            debug!("Could not determine global config path");
            return Ok(None);
        }
    };

    if !config_file.exists() {
        debug!(
            "Global config file does not exist: {}",
            config_file.display()
        );
        return Ok(None);
    }

    debug!("Loading global config from: {}", config_file.display());
    Ok(Some(GlobalConfig::from_file(&config_file)?))
}
