//! Configuration merging utilities.
//!
//! Merging follows Cargo's config.toml rules:
//!
//! - Scalars: higher precedence config takes precedence
//! - Arrays: merged with higher precedence items placed earlier
//! - `Option<T>`: first `Some` value wins

use crate::manifest::{normalize_url, Manifest, ResolutionSettings, RetrySettings};

/// Trait for combining configuration values.
///
/// The convention is that `self` has higher precedence than `other`.
pub trait Combine {
    /// Combine two values, preferring values in `self`.
    #[must_use]
    fn combine(self, other: Self) -> Self;
}

impl<T> Combine for Option<T> {
    fn combine(self, other: Self) -> Self {
        self.or(other)
    }
}

impl<T> Combine for Vec<T> {
    fn combine(mut self, other: Self) -> Self {
        self.extend(other);
        self
    }
}

impl Combine for RetrySettings {
    fn combine(self, other: Self) -> Self {
        Self {
            max_attempts: self.max_attempts.combine(other.max_attempts),
            initial_delay_ms: self.initial_delay_ms.combine(other.initial_delay_ms),
            max_delay_ms: self.max_delay_ms.combine(other.max_delay_ms),
        }
    }
}

impl Combine for ResolutionSettings {
    fn combine(self, other: Self) -> Self {
        let mut repositories = self.repositories.combine(other.repositories);
        let mut seen = std::collections::HashSet::new();
        repositories.retain(|url| seen.insert(normalize_url(url).to_string()));

        Self {
            repositories,
            cache_dir: self.cache_dir.combine(other.cache_dir),
            jobs: self.jobs.combine(other.jobs),
            timeout_secs: self.timeout_secs.combine(other.timeout_secs),
            download_sources: self.download_sources.combine(other.download_sources),
            platform: self.platform.combine(other.platform),
            scope: self.scope.combine(other.scope),
            retry: self.retry.combine(other.retry),
        }
    }
}

impl Combine for Manifest {
    fn combine(self, other: Self) -> Self {
        Self {
            resolution: self.resolution.combine(other.resolution),
            repositories: self.repositories.combine(other.repositories),
            catalog: {
                let mut catalog = self.catalog;
                for (k, v) in other.catalog {
                    catalog.entry(k).or_insert(v);
                }
                catalog
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_option_combine() {
        assert_eq!(Some(1).combine(Some(2)), Some(1));
        assert_eq!(None::<i32>.combine(Some(2)), Some(2));
        assert_eq!(None::<i32>.combine(None), None);
    }

    #[test]
    fn test_resolution_combine_dedups_repositories() {
        let project = ResolutionSettings {
            repositories: vec!["https://b.example/".into(), "https://a.example".into()],
            jobs: Some(2),
            ..Default::default()
        };
        let global = ResolutionSettings {
            repositories: vec!["https://a.example/".into(), "https://c.example".into()],
            jobs: Some(16),
            platform: Some("jvm".into()),
            ..Default::default()
        };
        let merged = project.combine(global);
        assert_eq!(
            merged.repositories,
            vec!["https://b.example/", "https://a.example", "https://c.example"]
        );
        assert_eq!(merged.jobs, Some(2));
        assert_eq!(merged.platform.as_deref(), Some("jvm"));
    }

    #[test]
    fn test_catalog_project_wins() {
        let mut project = Manifest::default();
        project.catalog.insert("x".into(), "g:x:2".into());
        let mut global = Manifest::default();
        global.catalog.insert("x".into(), "g:x:1".into());
        global.catalog.insert("y".into(), "g:y:1".into());

        let merged = project.combine(global);
        assert_eq!(merged.catalog["x"], "g:x:2");
        assert_eq!(merged.catalog["y"], "g:y:1");
    }
}
