//! The resolution entry point.
//!
//! A [`Resolver`] owns the shared [`RepositoryClient`] and an optional
//! [`IncrementalCache`]. Each call to [`Resolver::resolve`] expands the
//! request into roots, builds and converges the graph, then assembles and
//! downloads the classpath.

use crate::assemble::{AssembleOptions, ResolutionResult, assemble};
use crate::cache::{FileResolutionCache, IncrementalCache, ResolutionKey};
use crate::component::Scope;
use crate::coordinates::{MavenCoordinates, VersionCatalog};
use crate::error::ResolveError;
use crate::graph::{GraphBuilder, ResolvedGraph};
use crate::repository::{CacheLayout, DEFAULT_JOBS, Repository, RepositoryClient};
use crate::request::ResolutionRequest;
use crate::retry::RetryPolicy;
use crate::transport::{Credentials, HttpTransport, Transport};
use crate::variant::Platform;
use mx_config::Manifest;
use mx_telemetry::TimingGuard;
use std::borrow::Cow;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for the resolver.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Repositories used when a request names none
    pub repositories: Vec<Repository>,
    /// Root of the artifact and metadata cache
    pub cache_dir: PathBuf,
    /// Maximum concurrent network operations
    pub jobs: usize,
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub scope: Scope,
    pub platform: Platform,
    pub download_sources: bool,
    pub catalog: VersionCatalog,
    /// Show a download progress bar
    pub show_progress: bool,
}

impl ResolverConfig {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            repositories: vec![Repository::maven_central()],
            cache_dir: cache_dir.into(),
            jobs: DEFAULT_JOBS,
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
            scope: Scope::Runtime,
            platform: Platform::Jvm,
            download_sources: false,
            catalog: VersionCatalog::new(),
            show_progress: false,
        }
    }

    /// Build the configuration from merged `mx.toml` and global settings.
    pub fn from_settings(settings: &Manifest) -> mx_core::Result<Self> {
        let resolution = &settings.resolution;
        let cache_dir = match &resolution.cache_dir {
            Some(dir) => dir.clone(),
            None => CacheLayout::global()?.root().to_path_buf(),
        };
        let mut config = Self::new(cache_dir);

        let repositories: Vec<Repository> = settings
            .all_repositories()
            .into_iter()
            .map(|entry| {
                let repository = Repository::new(&entry.url);
                match entry.credentials() {
                    Some((username, password)) => {
                        repository.with_credentials(Credentials { username, password })
                    }
                    None => {
                        if entry.username_env.is_some() {
                            warn!("Credentials for {} are not set in the environment", entry.url);
                        }
                        repository
                    }
                }
            })
            .collect();
        if !repositories.is_empty() {
            config.repositories = repositories;
        }

        if let Some(jobs) = resolution.jobs {
            config.jobs = jobs.max(1);
        }
        if let Some(secs) = resolution.timeout_secs {
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(download_sources) = resolution.download_sources {
            config.download_sources = download_sources;
        }
        if let Some(platform) = &resolution.platform {
            config.platform = platform.parse().map_err(mx_core::Error::config)?;
        }
        if let Some(scope) = &resolution.scope {
            config.scope = scope.parse().map_err(mx_core::Error::config)?;
        }

        let retry = &resolution.retry;
        config.retry = RetryPolicy::exponential(
            retry.max_attempts.unwrap_or(RetryPolicy::DEFAULT_MAX_ATTEMPTS),
            retry
                .initial_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(RetryPolicy::DEFAULT_INITIAL_DELAY),
            retry
                .max_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(RetryPolicy::DEFAULT_MAX_DELAY),
        );

        for (key, notation) in &settings.catalog {
            config.catalog.insert(key.clone(), notation.clone());
        }
        Ok(config)
    }

    /// A request carrying this configuration's repositories, scope,
    /// platform and catalog.
    pub fn new_request(&self) -> ResolutionRequest {
        ResolutionRequest::new(self.scope, self.platform.clone())
            .repositories(self.repositories.iter().cloned())
            .with_sources(self.download_sources)
            .with_catalog(self.catalog.clone())
    }
}

/// Resolves requests against shared repositories and caches.
pub struct Resolver {
    client: Arc<RepositoryClient>,
    cache: Option<Arc<dyn IncrementalCache>>,
    repositories: Vec<Repository>,
    jobs: usize,
    show_progress: bool,
    /// Token for the runs currently in flight; replaced on cancel
    run: Mutex<CancellationToken>,
}

impl Resolver {
    /// Create a resolver that talks HTTP(S).
    pub fn new(config: &ResolverConfig) -> Result<Self, ResolveError> {
        let transport = HttpTransport::new(config.timeout)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    pub fn with_transport(config: &ResolverConfig, transport: Arc<dyn Transport>) -> Self {
        let layout = CacheLayout::new(&config.cache_dir);
        let cache = FileResolutionCache::new(layout.resolutions_dir());
        let client = RepositoryClient::new(transport, layout)
            .with_retry(config.retry.clone())
            .with_jobs(config.jobs);
        let run = Mutex::new(client.cancellation_token().child_token());
        Self {
            client: Arc::new(client),
            cache: Some(Arc::new(cache)),
            repositories: config.repositories.clone(),
            jobs: config.jobs,
            show_progress: config.show_progress,
            run,
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn IncrementalCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn without_cache(mut self) -> Self {
        self.cache = None;
        self
    }

    pub fn client(&self) -> &RepositoryClient {
        &self.client
    }

    /// Cancel every resolution currently running on this resolver.
    ///
    /// Resolutions started afterwards run normally. Work already written
    /// to the cache stays valid.
    pub fn cancel(&self) {
        let mut run = self.run.lock().unwrap_or_else(PoisonError::into_inner);
        run.cancel();
        *run = self.client.cancellation_token().child_token();
    }

    /// Run `work` until it finishes or the current run is cancelled.
    async fn cancellable<T>(
        &self,
        work: impl Future<Output = Result<T, ResolveError>>,
    ) -> Result<T, ResolveError> {
        let token = self
            .run
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(ResolveError::Cancelled),
            result = work => result,
        }
    }

    fn effective<'r>(&self, request: &'r ResolutionRequest) -> Cow<'r, ResolutionRequest> {
        if request.repositories.is_empty() {
            let mut owned = request.clone();
            owned.repositories = self.repositories.clone();
            Cow::Owned(owned)
        } else {
            Cow::Borrowed(request)
        }
    }

    /// Build and converge the dependency graph without downloading
    /// artifacts.
    pub async fn resolve_graph(
        &self,
        request: &ResolutionRequest,
    ) -> Result<ResolvedGraph, ResolveError> {
        let request = self.effective(request);
        let roots = request.roots()?;
        self.cancellable(self.build_graph(&request, &roots.coordinates))
            .await
    }

    async fn build_graph(
        &self,
        request: &ResolutionRequest,
        roots: &[MavenCoordinates],
    ) -> Result<ResolvedGraph, ResolveError> {
        let _timer = TimingGuard::new("build dependency graph");
        GraphBuilder::new(
            &self.client,
            &request.repositories,
            &request.platform,
            request.scope,
            &request.force,
            &request.exclusions,
        )
        .build(roots)
        .await
    }

    /// Resolve a request into classpaths.
    pub async fn resolve(
        &self,
        request: &ResolutionRequest,
    ) -> Result<ResolutionResult, ResolveError> {
        self.cancellable(self.resolve_uncancelled(request)).await
    }

    async fn resolve_uncancelled(
        &self,
        request: &ResolutionRequest,
    ) -> Result<ResolutionResult, ResolveError> {
        let request = self.effective(request);
        let roots = request.roots()?;
        let key = ResolutionKey::new(&request, &roots.coordinates);

        if let Some(cache) = &self.cache
            && let Some(cached) = cache.lookup(&key)
        {
            info!("Using cached resolution for {} root(s)", roots.coordinates.len());
            return Ok(cached);
        }

        let graph = self.build_graph(&request, &roots.coordinates).await?;
        let options = AssembleOptions {
            repositories: &request.repositories,
            scope: request.scope,
            download_sources: request.download_sources,
            jobs: self.jobs,
            show_progress: self.show_progress,
        };
        let mut result = {
            let _timer = TimingGuard::new("assemble classpath");
            assemble(&self.client, &graph, &options).await?
        };
        result.report.local_modules = roots.local_modules;

        if let Some(cache) = &self.cache
            && let Err(e) = cache.store(&key, &result)
        {
            warn!("Failed to store resolution: {}", e);
        }
        debug!(
            "Resolved {} module(s) into {} file(s)",
            result.report.chosen_versions.len(),
            result.classpath.len()
        );
        Ok(result)
    }

    /// Resolve independent requests concurrently.
    ///
    /// Results are returned in request order; one request failing does not
    /// affect the others.
    pub async fn resolve_all(
        &self,
        requests: &[ResolutionRequest],
    ) -> Vec<Result<ResolutionResult, ResolveError>> {
        futures::future::join_all(requests.iter().map(|request| self.resolve(request))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryResolutionCache;
    use crate::testing::{LibrarySpec, TEST_REPO};
    use crate::transport::MemoryTransport;
    use mx_config::{RepositorySettings, ResolutionSettings};
    use std::path::Path;
    use tempfile::tempdir;

    fn config(root: &Path) -> ResolverConfig {
        let mut config = ResolverConfig::new(root);
        config.repositories = vec![Repository::new(TEST_REPO)];
        config.retry = RetryPolicy::none();
        config
    }

    fn publish_tinylog(transport: &MemoryTransport) {
        LibrarySpec::new("org.tinylog", "slf4j-tinylog", "2.7.0-M1")
            .depends_on("org.slf4j", "slf4j-api", "2.0.9")
            .depends_on("org.tinylog", "tinylog-api", "2.7.0-M1")
            .publish(transport, TEST_REPO);
        LibrarySpec::new("org.slf4j", "slf4j-api", "2.0.9").publish(transport, TEST_REPO);
        LibrarySpec::new("org.tinylog", "tinylog-api", "2.7.0-M1")
            .depends_on_scoped("org.slf4j", "slf4j-api", "2.0.9", "provided")
            .publish(transport, TEST_REPO);
    }

    #[tokio::test]
    async fn test_resolve_files_and_provenance() {
        let dir = tempdir().unwrap();
        let transport = MemoryTransport::new().into_shared();
        publish_tinylog(&transport);
        let config = config(dir.path());
        let resolver = Resolver::with_transport(&config, transport).without_cache();

        let request = config
            .new_request()
            .parse_dependency("org.tinylog:slf4j-tinylog:2.7.0-M1")
            .unwrap();
        let result = resolver.resolve(&request).await.unwrap();

        let mut names = result.file_names();
        names.sort();
        assert_eq!(
            names,
            vec!["slf4j-api-2.0.9.jar", "slf4j-tinylog-2.7.0-M1.jar", "tinylog-api-2.7.0-M1.jar"]
        );
        assert!(result.classpath.iter().all(|a| a.source_repository == TEST_REPO));
        assert!(result.classpath[0].local_path.starts_with(dir.path()));
        assert_eq!(result.report.chosen_versions.len(), 3);
    }

    #[tokio::test]
    async fn test_warm_cache_is_idempotent_and_offline() {
        let dir = tempdir().unwrap();
        let transport = MemoryTransport::new().into_shared();
        publish_tinylog(&transport);
        let config = config(dir.path());
        let request = config
            .new_request()
            .parse_dependency("org.tinylog:slf4j-tinylog:2.7.0-M1")
            .unwrap();

        let first = Resolver::with_transport(&config, transport.clone())
            .without_cache()
            .resolve(&request)
            .await
            .unwrap();
        let requests = transport.total_requests();

        // a fresh resolver with no result cache still never touches the network
        let second = Resolver::with_transport(&config, transport.clone())
            .without_cache()
            .resolve(&request)
            .await
            .unwrap();
        assert_eq!(first.classpath, second.classpath);
        assert_eq!(transport.total_requests(), requests);
    }

    #[tokio::test]
    async fn test_incremental_cache_skips_resolution() {
        let dir = tempdir().unwrap();
        let transport = MemoryTransport::new().into_shared();
        publish_tinylog(&transport);
        let config = config(dir.path());
        let cache = Arc::new(MemoryResolutionCache::new());
        let resolver =
            Resolver::with_transport(&config, transport.clone()).with_cache(cache.clone());
        let request = config
            .new_request()
            .parse_dependency("org.tinylog:tinylog-api:2.7.0-M1")
            .unwrap();

        let first = resolver.resolve(&request).await.unwrap();
        assert_eq!(first.file_names(), vec!["tinylog-api-2.7.0-M1.jar"]);
        assert_eq!(cache.len(), 1);

        // remove the metadata from the cache dir; a cache hit must not need it
        std::fs::remove_dir_all(dir.path().join(".metadata")).unwrap();
        let before = transport.total_requests();
        let second = resolver.resolve(&request).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(transport.total_requests(), before);
    }

    #[tokio::test]
    async fn test_missing_coordinates_are_batched() {
        let dir = tempdir().unwrap();
        let transport = MemoryTransport::new().into_shared();
        let config = config(dir.path());
        let resolver = Resolver::with_transport(&config, transport).without_cache();
        let request = config
            .new_request()
            .parse_dependency("org.tinylog:slf4j-tinylog:9999")
            .unwrap()
            .parse_dependency("org.tinylog:xxx:9998")
            .unwrap();

        let err = resolver.resolve(&request).await.unwrap_err();
        let ResolveError::Aggregate { primary, suppressed } = &err else {
            panic!("expected aggregate, got {err:?}");
        };
        assert!(primary.to_string().contains("org.tinylog:slf4j-tinylog:9999"));
        assert_eq!(suppressed.len(), 1);
        assert!(suppressed[0].to_string().contains("org.tinylog:xxx:9998"));
        assert!(suppressed[0].to_string().contains(TEST_REPO));
    }

    #[tokio::test]
    async fn test_resolve_all_runs_scopes_independently() {
        let dir = tempdir().unwrap();
        let transport = MemoryTransport::new().into_shared();
        LibrarySpec::new("g", "app", "1")
            .depends_on("g", "api", "1")
            .depends_on_scoped("g", "impl", "1", "runtime")
            .publish(&transport, TEST_REPO);
        LibrarySpec::new("g", "api", "1").publish(&transport, TEST_REPO);
        LibrarySpec::new("g", "impl", "1").publish(&transport, TEST_REPO);
        let config = config(dir.path());
        let resolver = Resolver::with_transport(&config, transport).without_cache();

        let runtime = config.new_request().parse_dependency("g:app:1").unwrap();
        let mut compile = runtime.clone();
        compile.scope = Scope::Compile;
        let missing = config.new_request().parse_dependency("g:nope:1").unwrap();

        let results = resolver.resolve_all(&[runtime, compile, missing]).await;
        assert_eq!(results[0].as_ref().unwrap().classpath.len(), 3);
        assert_eq!(results[1].as_ref().unwrap().classpath.len(), 2);
        assert!(matches!(results[2], Err(ResolveError::MetadataNotFound { .. })));
    }

    #[tokio::test]
    async fn test_cancel_stops_running_resolution_only() {
        let dir = tempdir().unwrap();
        let transport = MemoryTransport::new()
            .with_latency(Duration::from_millis(50))
            .into_shared();
        publish_tinylog(&transport);
        let config = config(dir.path());
        let resolver = Resolver::with_transport(&config, transport.clone()).without_cache();
        let request = config
            .new_request()
            .parse_dependency("org.tinylog:tinylog-api:2.7.0-M1")
            .unwrap();

        let (running, ()) = tokio::join!(resolver.resolve(&request), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            resolver.cancel();
        });
        assert!(matches!(running, Err(ResolveError::Cancelled)));

        let later = resolver.resolve(&request).await.unwrap();
        assert_eq!(later.file_names(), vec!["tinylog-api-2.7.0-M1.jar"]);
    }

    #[tokio::test]
    async fn test_cancelled_client_fails_fast() {
        let dir = tempdir().unwrap();
        let transport = MemoryTransport::new().into_shared();
        publish_tinylog(&transport);
        let config = config(dir.path());
        let resolver = Resolver::with_transport(&config, transport.clone()).without_cache();
        resolver.client().cancellation_token().cancel();

        let request = config
            .new_request()
            .parse_dependency("org.tinylog:tinylog-api:2.7.0-M1")
            .unwrap();
        let err = resolver.resolve(&request).await.unwrap_err();
        assert!(matches!(err, ResolveError::Cancelled));
        assert_eq!(transport.total_requests(), 0);
    }

    #[tokio::test]
    async fn test_request_without_repositories_uses_configured_ones() {
        let dir = tempdir().unwrap();
        let transport = MemoryTransport::new().into_shared();
        LibrarySpec::new("g", "a", "1").publish(&transport, TEST_REPO);
        let config = config(dir.path());
        let resolver = Resolver::with_transport(&config, transport).without_cache();

        let request = ResolutionRequest::new(Scope::Runtime, Platform::Jvm)
            .parse_dependency("g:a:1")
            .unwrap();
        let graph = resolver.resolve_graph(&request).await.unwrap();
        assert_eq!(graph.nodes().count(), 1);
    }

    #[test]
    fn test_config_from_settings() {
        let dir = tempdir().unwrap();
        let mut settings = Manifest {
            resolution: ResolutionSettings {
                repositories: vec!["https://a.test/maven".into()],
                cache_dir: Some(dir.path().to_path_buf()),
                jobs: Some(2),
                platform: Some("android".into()),
                scope: Some("compile".into()),
                ..Default::default()
            },
            repositories: vec![RepositorySettings {
                url: "https://b.test/maven/".into(),
                username_env: None,
                password_env: None,
            }],
            ..Default::default()
        };
        settings.resolution.retry.max_attempts = Some(5);
        settings
            .catalog
            .insert("slf4j".into(), "org.slf4j:slf4j-api:2.0.9".into());

        let config = ResolverConfig::from_settings(&settings).unwrap();
        let urls: Vec<&str> = config.repositories.iter().map(|r| r.url()).collect();
        assert_eq!(urls, vec!["https://a.test/maven", "https://b.test/maven"]);
        assert_eq!(config.cache_dir, dir.path());
        assert_eq!(config.jobs, 2);
        assert_eq!(config.platform, Platform::Android);
        assert_eq!(config.scope, Scope::Compile);
        assert_eq!(config.retry.max_attempts(), 5);
        assert_eq!(config.catalog.len(), 1);
    }

    #[test]
    fn test_config_rejects_bad_scope() {
        let dir = tempdir().unwrap();
        let settings = Manifest {
            resolution: ResolutionSettings {
                cache_dir: Some(dir.path().to_path_buf()),
                scope: Some("test".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        let err = ResolverConfig::from_settings(&settings).unwrap_err();
        assert_eq!(err.code(), mx_core::ErrorCode::ConfigError);
    }
}
