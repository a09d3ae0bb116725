//! Resolution errors.

use crate::checksum::HashAlgorithm;
use crate::coordinates::MavenCoordinates;
use crate::transport::TransportError;
use crate::variant::Platform;
use mx_core::{ErrorCode, Fix};
use std::path::PathBuf;

/// Error type for resolution failures.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("malformed coordinate '{input}': {reason}\n\n  Expected 'group:artifact:version[:classifier][@type]'.")]
    MalformedCoordinate { input: String, reason: String },

    #[error("unknown version catalog entry '{key}'\n\n  Suggestions:\n    - Add '{key}' to the [catalog] section of mx.toml\n    - Check the spelling of the catalog key")]
    UnknownCatalogEntry { key: String },

    #[error("unknown local module '{path}'\n\n  No local module is registered under this path.")]
    UnknownLocalModule { path: String },

    #[error("metadata not found for {coordinates}\n\n  Repositories tried: {}\n\n  Suggestions:\n    - Check the spelling of the coordinate\n    - Check that the version is published\n    - Add the repository that hosts it", .repositories.join(", "))]
    MetadataNotFound {
        coordinates: MavenCoordinates,
        repositories: Vec<String>,
    },

    #[error("no variant of {coordinates} matches platform {platform}\n\n  Available variants: {}", .available.join(", "))]
    VariantNotFound {
        coordinates: MavenCoordinates,
        platform: Platform,
        available: Vec<String>,
    },

    #[error("checksum mismatch for {url}\n\n  Expected {algorithm}: {expected}\n  Actual:   {actual}\n\n  The file was not stored. This indicates a corrupted download or a tampered repository.")]
    ChecksumMismatch {
        url: String,
        algorithm: HashAlgorithm,
        expected: String,
        actual: String,
    },

    #[error("failed to download {file} of {coordinates}\n\n  Repositories tried: {}", .repositories.join(", "))]
    Download {
        coordinates: MavenCoordinates,
        file: String,
        repositories: Vec<String>,
    },

    #[error("version conflict resolution did not converge after {iterations} iterations\n\n  Unstable chain: {}\n\n  Suggestions:\n    - Force a version for one of the modules in the chain", .chain.join(" -> "))]
    NonConvergence {
        iterations: usize,
        chain: Vec<String>,
    },

    #[error("invalid metadata for {coordinates}: {reason}")]
    InvalidMetadata { coordinates: String, reason: String },

    #[error(transparent)]
    Network(#[from] TransportError),

    #[error("cache I/O failed at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Cache(#[from] mx_core::Error),

    #[error("resolution cancelled")]
    Cancelled,

    #[error("{primary}{}", render_suppressed(.suppressed))]
    Aggregate {
        primary: Box<ResolveError>,
        suppressed: Vec<ResolveError>,
    },
}

/// Suppressed errors, each indented under a bullet.
fn render_suppressed(suppressed: &[ResolveError]) -> String {
    let mut out = format!("\n\n  {} more error(s):", suppressed.len());
    for err in suppressed {
        let text = err.to_string();
        let mut lines = text.lines();
        if let Some(first) = lines.next() {
            out.push_str("\n\n  - ");
            out.push_str(first);
        }
        for line in lines {
            out.push('\n');
            if !line.is_empty() {
                out.push_str("    ");
                out.push_str(line);
            }
        }
    }
    out
}

impl ResolveError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ResolveError::Io {
            path: path.into(),
            source,
        }
    }

    /// Combine a batch of failures.
    ///
    /// Returns `None` for an empty batch and the error itself for a single
    /// failure. Nested aggregates are flattened.
    pub fn aggregate(errors: Vec<ResolveError>) -> Option<ResolveError> {
        let mut flat = Vec::with_capacity(errors.len());
        for err in errors {
            match err {
                ResolveError::Aggregate {
                    primary,
                    suppressed,
                } => {
                    flat.push(*primary);
                    flat.extend(suppressed);
                }
                other => flat.push(other),
            }
        }
        let mut iter = flat.into_iter();
        let primary = iter.next()?;
        let suppressed: Vec<_> = iter.collect();
        if suppressed.is_empty() {
            Some(primary)
        } else {
            Some(ResolveError::Aggregate {
                primary: Box::new(primary),
                suppressed,
            })
        }
    }

    /// Every underlying error, primary first.
    pub fn flatten(&self) -> Vec<&ResolveError> {
        match self {
            ResolveError::Aggregate {
                primary,
                suppressed,
            } => std::iter::once(primary.as_ref())
                .chain(suppressed.iter())
                .flat_map(|e| e.flatten())
                .collect(),
            other => vec![other],
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            ResolveError::MalformedCoordinate { .. }
            | ResolveError::UnknownCatalogEntry { .. }
            | ResolveError::UnknownLocalModule { .. } => ErrorCode::InvalidInput,
            ResolveError::MetadataNotFound { .. } => ErrorCode::MetadataMissing,
            ResolveError::VariantNotFound { .. } => ErrorCode::VariantMissing,
            ResolveError::ChecksumMismatch { .. } => ErrorCode::ChecksumFailure,
            ResolveError::Download { .. } | ResolveError::Network(_) => ErrorCode::NetworkFailure,
            ResolveError::NonConvergence { .. } => ErrorCode::SolverFailure,
            ResolveError::InvalidMetadata { .. } => ErrorCode::InvalidMetadata,
            ResolveError::Io { .. } | ResolveError::Cache(_) => ErrorCode::CacheError,
            ResolveError::Cancelled => ErrorCode::Cancelled,
            ResolveError::Aggregate { primary, .. } => primary.code(),
        }
    }

    fn fixes(&self) -> Vec<Fix> {
        match self {
            ResolveError::UnknownCatalogEntry { key } => {
                vec![Fix::new(format!("add '{key}' to the [catalog] section of mx.toml"))]
            }
            ResolveError::MetadataNotFound { .. } | ResolveError::Download { .. } => vec![
                Fix::new("check the coordinate and the [resolution] repositories list"),
            ],
            ResolveError::ChecksumMismatch { .. } => vec![Fix::new(
                "clear the cached file and retry; report the repository if it persists",
            )],
            ResolveError::NonConvergence { chain, .. } => chain
                .first()
                .map(|m| vec![Fix::new(format!("force a version of {m}"))])
                .unwrap_or_default(),
            _ => vec![],
        }
    }
}

impl From<ResolveError> for mx_core::Error {
    fn from(err: ResolveError) -> Self {
        mx_core::Error::Resolution {
            message: err.to_string(),
            code: err.code(),
            fixes: err.fixes(),
            source: Some(Box::new(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn missing(artifact: &str) -> ResolveError {
        ResolveError::MetadataNotFound {
            coordinates: MavenCoordinates::new("org.tinylog", artifact, "9999"),
            repositories: vec!["https://repo1.maven.org/maven2".into()],
        }
    }

    #[test]
    fn test_aggregate_sizes() {
        assert!(ResolveError::aggregate(vec![]).is_none());

        let single = ResolveError::aggregate(vec![missing("a")]).unwrap();
        assert!(matches!(single, ResolveError::MetadataNotFound { .. }));

        let many = ResolveError::aggregate(vec![missing("a"), missing("b")]).unwrap();
        assert_eq!(many.flatten().len(), 2);
        assert!(many.to_string().contains("1 more error"));
    }

    #[test]
    fn test_aggregate_message_names_every_failure() {
        let err = ResolveError::aggregate(vec![
            ResolveError::MetadataNotFound {
                coordinates: MavenCoordinates::new("org.tinylog", "slf4j-tinylog", "9999"),
                repositories: vec!["https://repo1.maven.org/maven2".into()],
            },
            ResolveError::MetadataNotFound {
                coordinates: MavenCoordinates::new("org.tinylog", "xxx", "9998"),
                repositories: vec!["https://mirror.test/maven2".into()],
            },
        ])
        .unwrap();

        let message = err.to_string();
        assert!(message.contains("org.tinylog:slf4j-tinylog:9999"), "{message}");
        assert!(message.contains("  - metadata not found for org.tinylog:xxx:9998"), "{message}");
        assert!(message.contains("    Repositories tried: https://mirror.test/maven2"), "{message}");

        let core: mx_core::Error = err.into();
        assert!(core.to_string().contains("org.tinylog:xxx:9998"));
    }

    #[test]
    fn test_aggregate_flattens_nested() {
        let inner = ResolveError::aggregate(vec![missing("a"), missing("b")]).unwrap();
        let outer = ResolveError::aggregate(vec![inner, missing("c")]).unwrap();
        match &outer {
            ResolveError::Aggregate { suppressed, .. } => assert_eq!(suppressed.len(), 2),
            other => panic!("expected aggregate, got {other:?}"),
        }
    }

    #[test]
    fn test_into_core_error() {
        let err: mx_core::Error = missing("a").into();
        assert_eq!(err.code(), ErrorCode::MetadataMissing);
        assert!(!err.fixes().is_empty());
        assert!(err.to_string().contains("org.tinylog:a:9999"));
    }
}
