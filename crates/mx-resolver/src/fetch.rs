//! Artifact download and verification.

use crate::checksum::{Checksum, HashAlgorithm, compute_file_sha256, sha256_hex, sidecar_path};
use crate::component::ArtifactFile;
use crate::coordinates::MavenCoordinates;
use crate::error::ResolveError;
use crate::repository::{Repository, RepositoryClient};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A file on the resolved classpath.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedArtifact {
    pub coordinates: MavenCoordinates,
    pub local_path: PathBuf,
    pub sha256: String,
    pub source_repository: String,
}

/// Result of fetching one file.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub artifact: ResolvedArtifact,
    /// Set when the file was accepted without a published checksum.
    pub warning: Option<String>,
    /// Whether the file was already in the cache.
    pub cached: bool,
}

impl RepositoryClient {
    /// Make `file` of `coords` available in the local cache.
    ///
    /// The repository that served the metadata (`origin`) is tried first,
    /// then the others in order. Downloads are verified against the
    /// checksum from the metadata or a published `.sha256`/`.sha1` sidecar;
    /// a mismatch fails immediately and nothing is stored.
    pub async fn fetch_artifact(
        &self,
        repositories: &[Repository],
        origin: &str,
        coords: &MavenCoordinates,
        file: &ArtifactFile,
    ) -> Result<FetchOutcome, ResolveError> {
        let local = self.layout().artifact_path(&file.path);
        if let Some(sha256) = verified_cache_entry(&local, file.checksum.as_ref())? {
            let served_by = recorded_origin(&local).unwrap_or_else(|| origin.to_string());
            return Ok(cached(coords, local, sha256, served_by));
        }

        let _guard = self.lock_key(&local.to_string_lossy()).await;
        if let Some(sha256) = verified_cache_entry(&local, file.checksum.as_ref())? {
            let served_by = recorded_origin(&local).unwrap_or_else(|| origin.to_string());
            return Ok(cached(coords, local, sha256, served_by));
        }

        let ordered: Vec<&Repository> = repositories
            .iter()
            .filter(|r| r.url() == origin)
            .chain(repositories.iter().filter(|r| r.url() != origin))
            .collect();

        let mut tried = Vec::with_capacity(ordered.len());
        for repository in ordered {
            tried.push(repository.url().to_string());
            let url = repository.url_for(&file.path);
            let bytes = match self.get(repository, &file.path).await {
                Ok(Some(bytes)) => bytes,
                Ok(None) => continue,
                Err(ResolveError::Network(e)) => {
                    warn!("Download of {} failed: {}", url, e);
                    continue;
                }
                Err(e) => return Err(e),
            };

            let expected = match &file.checksum {
                Some(checksum) => Some(checksum.clone()),
                None => match self.published_checksum(repository, &file.path).await {
                    Ok(checksum) => checksum,
                    Err(ResolveError::Network(e)) => {
                        warn!("Checksum lookup for {} failed: {}", url, e);
                        continue;
                    }
                    Err(e) => return Err(e),
                },
            };

            let warning = match &expected {
                Some(checksum) => {
                    checksum
                        .verify(&bytes)
                        .map_err(|actual| ResolveError::ChecksumMismatch {
                            url: url.clone(),
                            algorithm: checksum.algorithm,
                            expected: checksum.value.clone(),
                            actual,
                        })?;
                    None
                }
                None => {
                    warn!("No checksum published for {}", url);
                    Some(format!("{url} has no published checksum; accepted unverified"))
                }
            };

            let sha256 = sha256_hex(&bytes);
            mx_cache::atomic_write(&local, &bytes)?;
            mx_cache::atomic_write(&sidecar_path(&local), sha256.as_bytes())?;
            mx_cache::atomic_write(&origin_path(&local), repository.url().as_bytes())?;
            info!("Downloaded {} ({} bytes)", url, bytes.len());

            return Ok(FetchOutcome {
                artifact: ResolvedArtifact {
                    coordinates: coords.clone(),
                    local_path: local,
                    sha256,
                    source_repository: repository.url().to_string(),
                },
                warning,
                cached: false,
            });
        }

        Err(ResolveError::Download {
            coordinates: coords.clone(),
            file: file.name.clone(),
            repositories: tried,
        })
    }

    /// The first sidecar checksum a repository publishes for `path`.
    async fn published_checksum(
        &self,
        repository: &Repository,
        path: &str,
    ) -> Result<Option<Checksum>, ResolveError> {
        for algorithm in HashAlgorithm::SIDECARS {
            let sidecar = format!("{path}.{}", algorithm.extension());
            if let Some(bytes) = self.get(repository, &sidecar).await?
                && let Some(checksum) =
                    Checksum::from_sidecar(algorithm, &String::from_utf8_lossy(&bytes))
            {
                return Ok(Some(checksum));
            }
        }
        Ok(None)
    }
}

fn cached(
    coords: &MavenCoordinates,
    local: PathBuf,
    sha256: String,
    source_repository: String,
) -> FetchOutcome {
    FetchOutcome {
        artifact: ResolvedArtifact {
            coordinates: coords.clone(),
            local_path: local,
            sha256,
            source_repository,
        },
        warning: None,
        cached: true,
    }
}

/// Records which repository served a cached file.
fn origin_path(local: &Path) -> PathBuf {
    let mut name = local.file_name().unwrap_or_default().to_os_string();
    name.push(".origin");
    local.with_file_name(name)
}

fn recorded_origin(local: &Path) -> Option<String> {
    let recorded = std::fs::read_to_string(origin_path(local)).ok()?;
    let recorded = recorded.trim();
    (!recorded.is_empty()).then(|| recorded.to_string())
}

/// SHA-256 of a cached file that is still intact, or `None` if it must be
/// (re-)downloaded.
///
/// A file is intact when it matches its `.sha256` sidecar and, if known,
/// the expected checksum. Files cached without a sidecar get one written.
fn verified_cache_entry(
    local: &Path,
    expected: Option<&Checksum>,
) -> Result<Option<String>, ResolveError> {
    if !local.exists() {
        return Ok(None);
    }
    let actual = compute_file_sha256(local).map_err(|e| ResolveError::io(local, e))?;
    let sidecar = sidecar_path(local);

    match std::fs::read_to_string(&sidecar) {
        Ok(recorded) if recorded.trim() != actual => {
            warn!("Cached file {} is corrupt; downloading again", local.display());
            return Ok(None);
        }
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            mx_cache::atomic_write(&sidecar, actual.as_bytes())?;
        }
        Err(e) => return Err(ResolveError::io(sidecar, e)),
    }

    if let Some(expected) = expected {
        let matches = match expected.algorithm {
            HashAlgorithm::Sha256 => expected.value == actual,
            _ => {
                let bytes = std::fs::read(local).map_err(|e| ResolveError::io(local, e))?;
                expected.verify(&bytes).is_ok()
            }
        };
        if !matches {
            warn!(
                "Cached file {} does not match published {}; downloading again",
                local.display(),
                expected.algorithm
            );
            return Ok(None);
        }
    }

    debug!("Artifact cache hit: {}", local.display());
    Ok(Some(actual))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::CacheLayout;
    use crate::retry::RetryPolicy;
    use crate::testing::{LibrarySpec, TEST_REPO};
    use crate::transport::MemoryTransport;
    use std::sync::Arc;
    use tempfile::tempdir;

    const MIRROR: &str = "https://mirror.test/maven2";

    fn jar_file(spec: &LibrarySpec) -> ArtifactFile {
        let c = spec.coordinates();
        let name = c.file_name(None, "jar");
        ArtifactFile {
            path: c.repository_path(&name),
            name,
            checksum: None,
        }
    }

    fn client(transport: &Arc<MemoryTransport>, root: &Path) -> RepositoryClient {
        RepositoryClient::new(transport.clone(), CacheLayout::new(root))
            .with_retry(RetryPolicy::none())
    }

    #[tokio::test]
    async fn test_download_verifies_and_caches() {
        let dir = tempdir().unwrap();
        let transport = MemoryTransport::new().into_shared();
        let spec = LibrarySpec::new("org.example", "a", "1.0");
        spec.publish(&transport, TEST_REPO);

        let client = client(&transport, dir.path());
        let repos = [Repository::new(TEST_REPO)];
        let file = jar_file(&spec);

        let first = client
            .fetch_artifact(&repos, TEST_REPO, spec.coordinates(), &file)
            .await
            .unwrap();
        assert!(!first.cached);
        assert!(first.warning.is_none());
        assert!(first.artifact.local_path.ends_with("org/example/a/1.0/a-1.0.jar"));
        assert_eq!(
            std::fs::read_to_string(sidecar_path(&first.artifact.local_path)).unwrap(),
            first.artifact.sha256
        );

        let requests = transport.total_requests();
        let second = client
            .fetch_artifact(&repos, TEST_REPO, spec.coordinates(), &file)
            .await
            .unwrap();
        assert!(second.cached);
        assert_eq!(second.artifact.sha256, first.artifact.sha256);
        assert_eq!(transport.total_requests(), requests);
    }

    #[tokio::test]
    async fn test_checksum_mismatch_is_fatal_and_not_stored() {
        let dir = tempdir().unwrap();
        let transport = MemoryTransport::new().into_shared();
        let spec = LibrarySpec::new("org.example", "a", "1.0");
        spec.publish(&transport, TEST_REPO);
        transport.insert(spec.url(TEST_REPO, None, "jar"), b"tampered".to_vec());

        let client = client(&transport, dir.path());
        let repos = [Repository::new(TEST_REPO)];
        let file = jar_file(&spec);
        let err = client
            .fetch_artifact(&repos, TEST_REPO, spec.coordinates(), &file)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ResolveError::ChecksumMismatch {
                algorithm: HashAlgorithm::Sha1,
                ..
            }
        ));
        assert!(!client.layout().artifact_path(&file.path).exists());
    }

    #[tokio::test]
    async fn test_missing_checksum_is_a_warning() {
        let dir = tempdir().unwrap();
        let transport = MemoryTransport::new().into_shared();
        let spec = LibrarySpec::new("org.example", "a", "1.0").without_checksums();
        spec.publish(&transport, TEST_REPO);

        let client = client(&transport, dir.path());
        let repos = [Repository::new(TEST_REPO)];
        let outcome = client
            .fetch_artifact(&repos, TEST_REPO, spec.coordinates(), &jar_file(&spec))
            .await
            .unwrap();
        assert!(outcome.warning.unwrap().contains("no published checksum"));
    }

    #[tokio::test]
    async fn test_corrupt_cache_entry_is_replaced() {
        let dir = tempdir().unwrap();
        let transport = MemoryTransport::new().into_shared();
        let spec = LibrarySpec::new("org.example", "a", "1.0");
        spec.publish(&transport, TEST_REPO);

        let client = client(&transport, dir.path());
        let repos = [Repository::new(TEST_REPO)];
        let file = jar_file(&spec);
        let first = client
            .fetch_artifact(&repos, TEST_REPO, spec.coordinates(), &file)
            .await
            .unwrap();
        std::fs::write(&first.artifact.local_path, b"bit rot").unwrap();

        let second = client
            .fetch_artifact(&repos, TEST_REPO, spec.coordinates(), &file)
            .await
            .unwrap();
        assert!(!second.cached);
        assert_eq!(second.artifact.sha256, first.artifact.sha256);
    }

    #[tokio::test]
    async fn test_falls_back_to_other_repositories() {
        let dir = tempdir().unwrap();
        let transport = MemoryTransport::new().into_shared();
        let spec = LibrarySpec::new("org.example", "a", "1.0");
        spec.publish(&transport, MIRROR);

        let client = client(&transport, dir.path());
        let repos = [Repository::new(TEST_REPO), Repository::new(MIRROR)];
        let outcome = client
            .fetch_artifact(&repos, TEST_REPO, spec.coordinates(), &jar_file(&spec))
            .await
            .unwrap();
        assert_eq!(outcome.artifact.source_repository, MIRROR);

        let warm = client
            .fetch_artifact(&repos, TEST_REPO, spec.coordinates(), &jar_file(&spec))
            .await
            .unwrap();
        assert!(warm.cached);
        assert_eq!(warm.artifact.source_repository, MIRROR);
    }

    #[tokio::test]
    async fn test_not_found_anywhere() {
        let dir = tempdir().unwrap();
        let transport = MemoryTransport::new().into_shared();
        let spec = LibrarySpec::new("org.example", "a", "1.0");

        let client = client(&transport, dir.path());
        let repos = [Repository::new(TEST_REPO)];
        let err = client
            .fetch_artifact(&repos, TEST_REPO, spec.coordinates(), &jar_file(&spec))
            .await
            .unwrap_err();
        match err {
            ResolveError::Download { file, repositories, .. } => {
                assert_eq!(file, "a-1.0.jar");
                assert_eq!(repositories, vec![TEST_REPO.to_string()]);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
