//! mx.toml manifest parsing.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error type for manifest operations.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("failed to parse manifest: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("failed to serialize manifest: {0}")]
    SerializeError(#[from] toml::ser::Error),
}

/// Retry settings for network operations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RetrySettings {
    /// Total attempts, including the first one
    pub max_attempts: Option<u32>,
    /// Delay before the first retry
    pub initial_delay_ms: Option<u64>,
    /// Upper bound for any single delay
    pub max_delay_ms: Option<u64>,
}

/// `[resolution]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ResolutionSettings {
    /// Repository URLs, in priority order
    #[serde(default)]
    pub repositories: Vec<String>,
    /// Root of the artifact and metadata cache
    pub cache_dir: Option<PathBuf>,
    /// Maximum concurrent network operations
    pub jobs: Option<usize>,
    /// Per-request timeout
    pub timeout_secs: Option<u64>,
    /// Also download `-sources.jar` files
    pub download_sources: Option<bool>,
    /// Default platform, e.g. `jvm`, `android`, `linuxX64`
    pub platform: Option<String>,
    /// Default scope, `compile` or `runtime`
    pub scope: Option<String>,
    #[serde(default)]
    pub retry: RetrySettings,
}

/// A `[[repository]]` entry with optional credentials.
///
/// Credentials are never stored in the file; the entry names the environment
/// variables that hold them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RepositorySettings {
    pub url: String,
    pub username_env: Option<String>,
    pub password_env: Option<String>,
}

impl RepositorySettings {
    /// Read the `(username, password)` pair from the environment.
    ///
    /// Returns `None` unless both variables are named and set.
    pub fn credentials(&self) -> Option<(String, String)> {
        let user = std::env::var(self.username_env.as_deref()?).ok()?;
        let pass = std::env::var(self.password_env.as_deref()?).ok()?;
        Some((user, pass))
    }
}

/// A parsed mx.toml manifest.
///
/// # Example
///
/// ```toml
/// [resolution]
/// repositories = ["https://repo1.maven.org/maven2"]
/// platform = "jvm"
/// scope = "runtime"
///
/// [resolution.retry]
/// max-attempts = 5
///
/// [[repository]]
/// url = "https://maven.example.com/releases"
/// username-env = "EXAMPLE_USER"
/// password-env = "EXAMPLE_TOKEN"
///
/// [catalog]
/// slf4j-api = "org.slf4j:slf4j-api:2.0.9"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub resolution: ResolutionSettings,

    /// Repositories that need credentials or are listed one per table
    #[serde(default, rename = "repository")]
    pub repositories: Vec<RepositorySettings>,

    /// Version catalog: key to dependency notation
    #[serde(default)]
    pub catalog: BTreeMap<String, String>,
}

impl Manifest {
    /// Parse a manifest from a TOML string.
    pub fn parse(s: &str) -> Result<Self, ManifestError> {
        Ok(toml::from_str(s)?)
    }

    /// Parse a manifest from a file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Serialize the manifest to a TOML string.
    pub fn to_string(&self) -> Result<String, ManifestError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// All repositories in priority order: `[resolution].repositories`
    /// first, then `[[repository]]` entries. Duplicate URLs keep their
    /// first position, and the credentialed entry wins over a bare URL.
    pub fn all_repositories(&self) -> Vec<RepositorySettings> {
        let mut out: Vec<RepositorySettings> = Vec::new();
        let bare = self.resolution.repositories.iter().map(|url| RepositorySettings {
            url: url.clone(),
            username_env: None,
            password_env: None,
        });
        for repo in bare.chain(self.repositories.iter().cloned()) {
            let url = normalize_url(&repo.url);
            match out.iter_mut().find(|r| normalize_url(&r.url) == url) {
                Some(existing) => {
                    if existing.username_env.is_none() && repo.username_env.is_some() {
                        *existing = repo;
                    }
                }
                None => out.push(repo),
            }
        }
        out
    }
}

pub(crate) fn normalize_url(url: &str) -> &str {
    url.trim_end_matches('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_manifest() {
        let toml = r#"
[resolution]
repositories = ["https://repo1.maven.org/maven2/"]
cache-dir = "/tmp/mx-cache"
jobs = 4
download-sources = true
platform = "linuxX64"
scope = "compile"

[resolution.retry]
max-attempts = 5
initial-delay-ms = 50

[[repository]]
url = "https://maven.example.com/releases"
username-env = "EXAMPLE_USER"
password-env = "EXAMPLE_TOKEN"

[catalog]
slf4j-api = "org.slf4j:slf4j-api:2.0.9"
"#;
        let manifest = Manifest::parse(toml).unwrap();
        assert_eq!(manifest.resolution.jobs, Some(4));
        assert_eq!(manifest.resolution.download_sources, Some(true));
        assert_eq!(manifest.resolution.platform.as_deref(), Some("linuxX64"));
        assert_eq!(manifest.resolution.retry.max_attempts, Some(5));
        assert_eq!(manifest.resolution.retry.max_delay_ms, None);
        assert_eq!(manifest.repositories.len(), 1);
        assert_eq!(
            manifest.catalog.get("slf4j-api").map(String::as_str),
            Some("org.slf4j:slf4j-api:2.0.9")
        );
    }

    #[test]
    fn test_all_repositories_dedups() {
        let toml = r#"
[resolution]
repositories = ["https://a.example/maven", "https://b.example/maven/"]

[[repository]]
url = "https://b.example/maven"
username-env = "B_USER"
password-env = "B_PASS"

[[repository]]
url = "https://c.example/maven"
"#;
        let manifest = Manifest::parse(toml).unwrap();
        let repos = manifest.all_repositories();
        let urls: Vec<_> = repos.iter().map(|r| normalize_url(&r.url)).collect();
        assert_eq!(
            urls,
            vec!["https://a.example/maven", "https://b.example/maven", "https://c.example/maven"]
        );
        assert_eq!(repos[1].username_env.as_deref(), Some("B_USER"));
    }

    #[test]
    fn test_credentials_need_both_vars() {
        let repo = RepositorySettings {
            url: "https://x".into(),
            username_env: Some("MX_TEST_SURELY_UNSET_USER".into()),
            password_env: None,
        };
        assert!(repo.credentials().is_none());
    }

    #[test]
    fn test_roundtrip() {
        let mut manifest = Manifest::default();
        manifest.resolution.jobs = Some(2);
        manifest
            .catalog
            .insert("junit".into(), "junit:junit:4.13.2".into());
        let parsed = Manifest::parse(&manifest.to_string().unwrap()).unwrap();
        assert_eq!(parsed, manifest);
    }
}
