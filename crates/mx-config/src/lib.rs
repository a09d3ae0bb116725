//! Configuration parsing for mx.
//!
//! This crate handles:
//! - Parsing `mx.toml` project manifests
//! - Parsing the global `config.toml`
//! - Merging the two with [`Combine`]

pub mod combine;
pub mod global;
pub mod manifest;

pub use combine::Combine;
pub use global::{load_global_config, GlobalConfig, GlobalConfigError};
pub use manifest::{Manifest, ManifestError, RepositorySettings, ResolutionSettings, RetrySettings};

use std::path::Path;
use thiserror::Error;

/// The manifest filename.
pub const MANIFEST_FILENAME: &str = "mx.toml";

/// Error returned by [`load_settings`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Global(#[from] GlobalConfigError),
}

/// Load the effective settings for a project directory.
///
/// Reads `<project_dir>/mx.toml` when present and layers it over the global
/// config. Missing files are treated as empty.
pub fn load_settings(project_dir: &Path) -> Result<Manifest, ConfigError> {
    let manifest_path = project_dir.join(MANIFEST_FILENAME);
    let project = if manifest_path.exists() {
        Manifest::from_file(&manifest_path)?
    } else {
        Manifest::default()
    };

    Ok(match load_global_config()? {
        Some(global) => global.apply_to(project),
        None => project,
    })
}
