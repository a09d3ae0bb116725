//! Cache management for mx.
//!
//! This crate handles:
//! - Global cache and config directories
//! - Atomic, crash-safe file writes into the cache
//! - Cache cleaning

use directories::ProjectDirs;
use mx_core::error::{Error, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Name of the global config file inside [`global_config_dir`].
pub const CONFIG_FILE_NAME: &str = "config.toml";

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("dev", "mx-build", "mx")
}

/// Get the global cache directory.
///
/// - Linux: `~/.cache/mx`
/// - macOS: `~/Library/Caches/dev.mx-build.mx`
/// - Windows: `%LOCALAPPDATA%\mx-build\mx\cache`
pub fn global_cache_dir() -> Result<PathBuf> {
    let dirs = project_dirs()
        .ok_or_else(|| Error::config("could not determine home directory for cache"))?;
    Ok(dirs.cache_dir().to_path_buf())
}

/// Get the global config directory.
///
/// - Linux: `~/.config/mx`
/// - macOS: `~/Library/Application Support/dev.mx-build.mx`
/// - Windows: `%APPDATA%\mx-build\mx\config`
pub fn global_config_dir() -> Result<PathBuf> {
    let dirs = project_dirs()
        .ok_or_else(|| Error::config("could not determine home directory for config"))?;
    Ok(dirs.config_dir().to_path_buf())
}

/// Get the path of the global config file.
pub fn global_config_file() -> Result<PathBuf> {
    Ok(global_config_dir()?.join(CONFIG_FILE_NAME))
}

/// Ensure a directory exists.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        debug!("Creating directory: {}", path.display());
        std::fs::create_dir_all(path).map_err(|e| Error::Io {
            message: format!("failed to create directory: {}", path.display()),
            path: Some(path.to_path_buf()),
            source: e,
        })?;
    }
    Ok(())
}

/// Write `contents` to `path` atomically.
///
/// The bytes go to a temporary file in the same directory, which is then
/// renamed over `path`. Readers see either the old file or the complete
/// new one, never a partial write.
pub fn atomic_write(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| Error::config(format!("cache path has no parent: {}", path.display())))?;
    ensure_dir(parent)?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .map_err(|e| Error::io("failed to create temporary file", parent, e))?;
    tmp.write_all(contents)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| Error::io("failed to write temporary file", tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| Error::io("failed to move file into cache", path, e.error))?;

    trace!(path = %path.display(), bytes = contents.len(), "Wrote cache file");
    Ok(())
}

/// Remove a cache directory and everything below it.
pub fn clean_cache(cache_dir: &Path) -> Result<()> {
    if cache_dir.exists() {
        debug!("Removing cache: {}", cache_dir.display());
        std::fs::remove_dir_all(cache_dir).map_err(|e| Error::Io {
            message: "failed to remove cache".to_string(),
            path: Some(cache_dir.to_path_buf()),
            source: e,
        })?;
    }
    Ok(())
}

/// Clean the global cache.
pub fn clean_global_cache() -> Result<()> {
    clean_cache(&global_cache_dir()?)
}
