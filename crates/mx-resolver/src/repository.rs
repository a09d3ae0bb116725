//! Repository access and the on-disk metadata cache.
//!
//! [`RepositoryClient`] queries an ordered list of repositories for a
//! coordinate's metadata. The first repository that serves a POM or a
//! Gradle module file wins. Raw metadata bytes are cached on disk per
//! repository, parsed results are memoized in memory, and concurrent
//! requests for the same key are coalesced behind a per-key lock.

use crate::checksum::sha256_hex;
use crate::component::ComponentMetadata;
use crate::coordinates::MavenCoordinates;
use crate::error::ResolveError;
use crate::module_metadata::ModuleMetadata;
use crate::pom::{EffectivePom, MAX_PARENT_DEPTH, Pom};
use crate::retry::RetryPolicy;
use crate::transport::{Credentials, Transport};
use dashmap::{DashMap, DashSet};
use futures::FutureExt;
use futures::future::BoxFuture;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Maven Central.
pub const MAVEN_CENTRAL: &str = "https://repo1.maven.org/maven2";

/// Default number of concurrent network requests.
pub const DEFAULT_JOBS: usize = 8;

const METADATA_DIR: &str = ".metadata";
const RESOLUTIONS_DIR: &str = ".resolutions";

/// A remote or local Maven repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    url: String,
    credentials: Option<Credentials>,
}

impl Repository {
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            url: url.trim().trim_end_matches('/').to_string(),
            credentials: None,
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn maven_central() -> Self {
        Self::new(MAVEN_CENTRAL)
    }

    /// `~/.m2/repository`, if a home directory is known.
    pub fn maven_local() -> Option<Self> {
        let home = dirs_next::home_dir()?;
        let path = home.join(".m2").join("repository");
        Some(Self::new(format!("file://{}", path.display())))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    /// Short stable identity used to partition the metadata cache.
    pub fn id(&self) -> String {
        sha256_hex(self.url.as_bytes())[..16].to_string()
    }

    /// Absolute URL of a repository-relative path.
    pub fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.url, path.trim_start_matches('/'))
    }
}

/// Paths inside the cache root.
///
/// ```text
/// <root>/<group/path>/<artifact>/<version>/<file>      artifacts
/// <root>/.metadata/<repository id>/<repository path>  raw POM / module files
/// <root>/.resolutions/<fingerprint>.bin              cached resolutions
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheLayout {
    root: PathBuf,
}

impl CacheLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Layout rooted at the global mx cache directory.
    pub fn global() -> mx_core::Result<Self> {
        Ok(Self::new(mx_cache::global_cache_dir()?.join("maven")))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Local path of an artifact, given its repository-relative path.
    pub fn artifact_path(&self, repository_path: &str) -> PathBuf {
        join_relative(&self.root, repository_path)
    }

    pub fn metadata_path(&self, repository: &Repository, repository_path: &str) -> PathBuf {
        join_relative(
            &self.root.join(METADATA_DIR).join(repository.id()),
            repository_path,
        )
    }

    pub fn resolutions_dir(&self) -> PathBuf {
        self.root.join(RESOLUTIONS_DIR)
    }
}

fn join_relative(base: &Path, relative: &str) -> PathBuf {
    relative
        .split('/')
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .fold(base.to_path_buf(), |path, segment| path.join(segment))
}

/// Shared, concurrency-safe access to repositories and the cache.
///
/// One client is shared by every resolution running in a process.
pub struct RepositoryClient {
    transport: Arc<dyn Transport>,
    layout: CacheLayout,
    retry: RetryPolicy,
    permits: Arc<Semaphore>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    components: DashMap<String, Arc<ComponentMetadata>>,
    /// Metadata files a repository did not have, for this client only
    misses: DashSet<PathBuf>,
    cancel: CancellationToken,
}

impl RepositoryClient {
    pub fn new(transport: Arc<dyn Transport>, layout: CacheLayout) -> Self {
        Self {
            transport,
            layout,
            retry: RetryPolicy::default(),
            permits: Arc::new(Semaphore::new(DEFAULT_JOBS)),
            locks: DashMap::new(),
            components: DashMap::new(),
            misses: DashSet::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Limit the number of concurrent network requests.
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.permits = Arc::new(Semaphore::new(jobs.max(1)));
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn layout(&self) -> &CacheLayout {
        &self.layout
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub(crate) fn check_cancelled(&self) -> Result<(), ResolveError> {
        if self.cancel.is_cancelled() {
            Err(ResolveError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Hold the lock for `key` until the returned guard drops.
    ///
    /// Callers holding or waiting on the same key share one mutex. The
    /// entry is removed once nobody holds or waits on it.
    pub(crate) async fn lock_key(&self, key: &str) -> KeyGuard<'_> {
        let lock = self.locks.entry(key.to_string()).or_default().clone();
        let guard = lock.lock_owned().await;
        KeyGuard {
            locks: &self.locks,
            key: key.to_string(),
            guard: Some(guard),
        }
    }

    /// GET a repository path with retries. `Ok(None)` when absent.
    pub(crate) async fn get(
        &self,
        repository: &Repository,
        path: &str,
    ) -> Result<Option<Vec<u8>>, ResolveError> {
        self.check_cancelled()?;
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ResolveError::Cancelled)?;
        self.check_cancelled()?;

        let url = repository.url_for(path);
        let credentials = repository.credentials();
        let transport = &self.transport;
        let bytes = self
            .retry
            .run(&url, || transport.get(&url, credentials))
            .await?;
        trace!(url, found = bytes.is_some(), "Fetched");
        Ok(bytes)
    }

    /// Fetch a metadata file through the on-disk cache.
    ///
    /// Files found are cached on disk. Files not found are remembered only
    /// by this client, so a later process asks the repository again.
    async fn metadata_file(
        &self,
        repository: &Repository,
        path: &str,
    ) -> Result<Option<Vec<u8>>, ResolveError> {
        let local = self.layout.metadata_path(repository, path);
        if let Some(cached) = self.read_cached(&local)? {
            return Ok(cached);
        }

        let _guard = self.lock_key(&local.to_string_lossy()).await;
        if let Some(cached) = self.read_cached(&local)? {
            return Ok(cached);
        }

        debug!("Metadata cache miss: {} from {}", path, repository.url());
        match self.get(repository, path).await? {
            Some(bytes) => {
                mx_cache::atomic_write(&local, &bytes)?;
                Ok(Some(bytes))
            }
            None => {
                self.misses.insert(local);
                Ok(None)
            }
        }
    }

    /// `Some(Some(bytes))` for a cached file, `Some(None)` for a known
    /// miss, `None` when nothing is known.
    fn read_cached(&self, path: &Path) -> Result<Option<Option<Vec<u8>>>, ResolveError> {
        if self.misses.contains(path) {
            return Ok(Some(None));
        }
        match std::fs::read(path) {
            Ok(bytes) => {
                trace!("Metadata cache hit: {}", path.display());
                Ok(Some(Some(bytes)))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ResolveError::io(path, e)),
        }
    }

    /// Metadata of `coords`, from the first repository that has it.
    pub async fn fetch_metadata(
        &self,
        repositories: &[Repository],
        coords: &MavenCoordinates,
    ) -> Result<Arc<ComponentMetadata>, ResolveError> {
        let coords = coords.at_version(&coords.version);
        let key = memo_key(repositories, &coords);
        if let Some(hit) = self.components.get(&key) {
            return Ok(Arc::clone(&hit));
        }

        let _guard = self.lock_key(&key).await;
        if let Some(hit) = self.components.get(&key) {
            return Ok(Arc::clone(&hit));
        }

        let mut tried = Vec::with_capacity(repositories.len());
        for repository in repositories {
            tried.push(repository.url().to_string());
            match self.metadata_from(repositories, repository, &coords).await {
                Ok(Some(metadata)) => {
                    debug!(
                        "Resolved metadata for {} from {} ({:?})",
                        coords,
                        repository.url(),
                        metadata.format
                    );
                    let metadata = Arc::new(metadata);
                    self.components.insert(key, Arc::clone(&metadata));
                    return Ok(metadata);
                }
                Ok(None) => {}
                Err(ResolveError::Network(e)) => {
                    warn!("Skipping {} for {}: {}", repository.url(), coords, e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(ResolveError::MetadataNotFound {
            coordinates: coords,
            repositories: tried,
        })
    }

    async fn metadata_from(
        &self,
        repositories: &[Repository],
        repository: &Repository,
        coords: &MavenCoordinates,
    ) -> Result<Option<ComponentMetadata>, ResolveError> {
        let pom_path = coords.repository_path(&coords.file_name(None, "pom"));
        let module_path = coords.repository_path(&coords.file_name(None, "module"));

        let Some(pom_bytes) = self.metadata_file(repository, &pom_path).await? else {
            return match self.metadata_file(repository, &module_path).await? {
                Some(bytes) => parse_module(&bytes, coords, repository).map(Some),
                None => Ok(None),
            };
        };

        let pom = Pom::parse(&pom_bytes).map_err(|e| ResolveError::InvalidMetadata {
            coordinates: coords.to_string(),
            reason: e.to_string(),
        })?;

        if pom.published_with_gradle_metadata {
            if let Some(bytes) = self.metadata_file(repository, &module_path).await? {
                match parse_module(&bytes, coords, repository) {
                    Ok(metadata) => return Ok(Some(metadata)),
                    Err(e) => warn!("Falling back to POM for {}: {}", coords, e),
                }
            } else {
                debug!("{} advertises Gradle metadata but none is published", coords);
            }
        }

        let effective = self.effective_pom(repositories, repository, pom, 0).await?;
        Ok(Some(ComponentMetadata::from_pom(&effective, repository.url())))
    }

    /// A POM from the preferred repository, or else the first that has it.
    async fn find_pom(
        &self,
        repositories: &[Repository],
        preferred: &Repository,
        coords: &MavenCoordinates,
    ) -> Result<Option<Pom>, ResolveError> {
        let path = coords.repository_path(&coords.file_name(None, "pom"));
        let ordered = std::iter::once(preferred)
            .chain(repositories.iter().filter(|r| *r != preferred));
        for repository in ordered {
            match self.metadata_file(repository, &path).await {
                Ok(Some(bytes)) => {
                    let pom = Pom::parse(&bytes).map_err(|e| ResolveError::InvalidMetadata {
                        coordinates: coords.to_string(),
                        reason: e.to_string(),
                    })?;
                    return Ok(Some(pom));
                }
                Ok(None) => {}
                Err(ResolveError::Network(e)) => {
                    warn!("Skipping {} for {}: {}", repository.url(), coords, e);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    /// Inheritance, BOM imports and dependency management for `pom`.
    fn effective_pom<'a>(
        &'a self,
        repositories: &'a [Repository],
        origin: &'a Repository,
        pom: Pom,
        depth: usize,
    ) -> BoxFuture<'a, Result<EffectivePom, ResolveError>> {
        async move {
            let mut warnings = Vec::new();
            let mut chain = vec![pom];
            while let Some(parent) = chain.last().and_then(|p| p.parent.clone()) {
                if chain.len() > MAX_PARENT_DEPTH {
                    warnings.push(format!(
                        "parent chain deeper than {MAX_PARENT_DEPTH}; ignoring {}",
                        parent.coordinates()
                    ));
                    break;
                }
                let coords = parent.coordinates();
                match self.find_pom(repositories, origin, &coords).await? {
                    Some(parent_pom) => chain.push(parent_pom),
                    None => {
                        warnings.push(format!("parent POM {coords} not found"));
                        break;
                    }
                }
            }

            let mut effective = EffectivePom::from_chain(&chain);
            effective.warnings.append(&mut warnings);

            for bom in effective.take_imports() {
                if depth >= MAX_PARENT_DEPTH {
                    effective
                        .warnings
                        .push(format!("BOM imports nested too deeply; ignoring {bom}"));
                    continue;
                }
                match self.find_pom(repositories, origin, &bom).await? {
                    Some(bom_pom) => {
                        let imported = self
                            .effective_pom(repositories, origin, bom_pom, depth + 1)
                            .await?;
                        effective.import_management(&imported);
                    }
                    None => effective.warnings.push(format!("imported BOM {bom} not found")),
                }
            }

            effective.apply_management();
            for warning in &effective.warnings {
                debug!("{}: {}", effective.coordinates, warning);
            }
            Ok(effective)
        }
        .boxed()
    }
}

/// Held lock on one key of [`RepositoryClient`]'s lock table.
pub(crate) struct KeyGuard<'a> {
    locks: &'a DashMap<String, Arc<Mutex<()>>>,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // only the table's own reference left
        self.locks
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

fn memo_key(repositories: &[Repository], coords: &MavenCoordinates) -> String {
    let ids: Vec<String> = repositories.iter().map(Repository::id).collect();
    format!("{}@{}", coords.gav(), ids.join(","))
}

fn parse_module(
    bytes: &[u8],
    coords: &MavenCoordinates,
    repository: &Repository,
) -> Result<ComponentMetadata, ResolveError> {
    let module = ModuleMetadata::parse(bytes).map_err(|e| ResolveError::InvalidMetadata {
        coordinates: coords.to_string(),
        reason: e.to_string(),
    })?;
    Ok(ComponentMetadata::from_gradle(&module, coords, repository.url()))
}
