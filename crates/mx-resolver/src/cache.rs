//! Caching of whole resolution results.
//!
//! An identical request (roots, scope, platform, repositories, forced
//! versions, exclusions) maps to the same [`ResolutionKey`]; a stored
//! result lets the resolver skip graph building and downloads entirely.

use crate::assemble::ResolutionResult;
use crate::component::Scope;
use crate::coordinates::MavenCoordinates;
use crate::request::ResolutionRequest;
use crate::variant::Platform;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::Cursor;
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;

/// Error type for resolution cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to read cache file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("failed to decode cache: {0}")]
    DecodeError(#[from] bincode::Error),

    #[error("failed to write cache file: {0}")]
    WriteError(#[from] mx_core::Error),

    #[error("cache version mismatch")]
    VersionMismatch,

    #[error("cache entry refers to files that no longer exist")]
    Stale,
}

/// Current cache format version.
const CACHE_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct CacheHeader {
    version: u32,
    created_at: DateTime<Utc>,
    fingerprint: String,
}

/// Identity of a resolution request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolutionKey {
    pub coordinates: Vec<MavenCoordinates>,
    pub scope: Scope,
    pub platform: Platform,
    pub repositories: Vec<String>,
    pub force: Vec<String>,
    pub exclusions: Vec<String>,
    pub download_sources: bool,
}

impl ResolutionKey {
    pub fn new(request: &ResolutionRequest, roots: &[MavenCoordinates]) -> Self {
        Self {
            coordinates: roots.to_vec(),
            scope: request.scope,
            platform: request.platform.clone(),
            repositories: request.repositories.iter().map(|r| r.url().to_string()).collect(),
            force: request.force.iter().map(|(k, v)| format!("{k}:{v}")).collect(),
            exclusions: request.exclusions.iter().map(ToString::to_string).collect(),
            download_sources: request.download_sources,
        }
    }

    /// SHA-256 over a canonical rendering of the key.
    ///
    /// Root and repository order are significant; they determine
    /// classpath order and which repository wins.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for coords in &self.coordinates {
            hasher.update(format!("root:{coords}\n"));
        }
        for url in &self.repositories {
            hasher.update(format!("repo:{url}\n"));
        }
        for force in &self.force {
            hasher.update(format!("force:{force}\n"));
        }
        for exclusion in &self.exclusions {
            hasher.update(format!("exclude:{exclusion}\n"));
        }
        hasher.update(format!(
            "scope:{}\nplatform:{}\nsources:{}\n",
            self.scope, self.platform, self.download_sources
        ));
        format!("{:x}", hasher.finalize())
    }
}

/// Stores resolution results across runs.
pub trait IncrementalCache: Send + Sync {
    fn lookup(&self, key: &ResolutionKey) -> Option<ResolutionResult>;

    fn store(&self, key: &ResolutionKey, result: &ResolutionResult) -> Result<(), CacheError>;
}

/// Results stored as bincode files named by fingerprint.
pub struct FileResolutionCache {
    dir: PathBuf,
}

impl FileResolutionCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path(&self, fingerprint: &str) -> PathBuf {
        self.dir.join(format!("{fingerprint}.bin"))
    }

    pub fn load(&self, key: &ResolutionKey) -> Result<ResolutionResult, CacheError> {
        let fingerprint = key.fingerprint();
        let bytes = std::fs::read(self.path(&fingerprint))?;
        let mut reader = Cursor::new(bytes);

        let header: CacheHeader = bincode::deserialize_from(&mut reader)?;
        if header.version != CACHE_VERSION || header.fingerprint != fingerprint {
            debug!(
                "Cache version mismatch: expected {}, found {}",
                CACHE_VERSION, header.version
            );
            return Err(CacheError::VersionMismatch);
        }

        let result: ResolutionResult = bincode::deserialize_from(&mut reader)?;
        if !result.all_files_exist() {
            return Err(CacheError::Stale);
        }
        debug!(
            "Loaded cached resolution {} from {}",
            &fingerprint[..12],
            header.created_at
        );
        Ok(result)
    }
}

impl IncrementalCache for FileResolutionCache {
    fn lookup(&self, key: &ResolutionKey) -> Option<ResolutionResult> {
        match self.load(key) {
            Ok(result) => Some(result),
            Err(CacheError::ReadError(e)) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                debug!("Ignoring cached resolution: {}", e);
                None
            }
        }
    }

    fn store(&self, key: &ResolutionKey, result: &ResolutionResult) -> Result<(), CacheError> {
        let fingerprint = key.fingerprint();
        let header = CacheHeader {
            version: CACHE_VERSION,
            created_at: Utc::now(),
            fingerprint: fingerprint.clone(),
        };
        let mut bytes = bincode::serialize(&header)?;
        bytes.extend(bincode::serialize(result)?);
        mx_cache::atomic_write(&self.path(&fingerprint), &bytes)?;
        debug!("Stored resolution {}", &fingerprint[..12]);
        Ok(())
    }
}

/// Process-local cache, mainly for tests and long-running hosts.
#[derive(Default)]
pub struct MemoryResolutionCache {
    entries: DashMap<String, ResolutionResult>,
}

impl MemoryResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IncrementalCache for MemoryResolutionCache {
    fn lookup(&self, key: &ResolutionKey) -> Option<ResolutionResult> {
        self.entries
            .get(&key.fingerprint())
            .map(|r| r.clone())
            .filter(ResolutionResult::all_files_exist)
    }

    fn store(&self, key: &ResolutionKey, result: &ResolutionResult) -> Result<(), CacheError> {
        self.entries.insert(key.fingerprint(), result.clone());
        Ok(())
    }
}
