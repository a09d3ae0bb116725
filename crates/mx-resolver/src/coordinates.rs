//! Dependency notation parsing.
//!
//! Declarations arrive as strings (`group:artifact:version[:classifier][@type]`,
//! `./path/to/module`, `$catalog-key`) and are turned into a closed
//! [`RequestedDependency`] once, before graph building.

use crate::error::ResolveError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// The `group:artifact` identity used to group versions of one library.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleKey {
    pub group: String,
    pub artifact: String,
}

impl ModuleKey {
    pub fn new(group: impl Into<String>, artifact: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            artifact: artifact.into(),
        }
    }
}

impl fmt::Display for ModuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.group, self.artifact)
    }
}

/// A fully specified Maven coordinate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MavenCoordinates {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
    pub classifier: Option<String>,
    pub packaging_type: Option<String>,
}

impl MavenCoordinates {
    pub fn new(
        group_id: impl Into<String>,
        artifact_id: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            artifact_id: artifact_id.into(),
            version: version.into(),
            classifier: None,
            packaging_type: None,
        }
    }

    /// The conflict-resolution key, ignoring version and classifier.
    pub fn key(&self) -> ModuleKey {
        ModuleKey::new(&self.group_id, &self.artifact_id)
    }

    /// The same module at another version, without classifier or type.
    pub fn at_version(&self, version: impl Into<String>) -> Self {
        Self::new(&self.group_id, &self.artifact_id, version)
    }

    /// `group:artifact:version`, without classifier or type.
    pub fn gav(&self) -> String {
        format!("{}:{}:{}", self.group_id, self.artifact_id, self.version)
    }

    /// Directory of this version relative to a repository root:
    /// `org/example/lib/1.0`.
    pub fn repository_dir(&self) -> String {
        format!(
            "{}/{}/{}",
            self.group_id.replace('.', "/"),
            self.artifact_id,
            self.version
        )
    }

    /// `<artifact>-<version>[-<classifier>].<ext>`
    pub fn file_name(&self, classifier: Option<&str>, extension: &str) -> String {
        match classifier {
            Some(c) if !c.is_empty() => {
                format!("{}-{}-{}.{}", self.artifact_id, self.version, c, extension)
            }
            _ => format!("{}-{}.{}", self.artifact_id, self.version, extension),
        }
    }

    /// Path of a file of this version relative to a repository root.
    pub fn repository_path(&self, file_name: &str) -> String {
        format!("{}/{}", self.repository_dir(), file_name)
    }
}

impl fmt::Display for MavenCoordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.gav())?;
        if let Some(classifier) = &self.classifier {
            write!(f, ":{classifier}")?;
        }
        if let Some(ty) = &self.packaging_type {
            write!(f, "@{ty}")?;
        }
        Ok(())
    }
}

impl FromStr for MavenCoordinates {
    type Err = ResolveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = |reason: &str| ResolveError::MalformedCoordinate {
            input: s.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = s.trim();
        let (body, packaging_type) = match trimmed.rsplit_once('@') {
            Some((_, "")) => return Err(malformed("empty type after '@'")),
            Some((body, ty)) => (body, Some(ty.to_string())),
            None => (trimmed, None),
        };

        let parts: Vec<&str> = body.split(':').collect();
        if parts.len() > 4 {
            return Err(malformed("too many ':' separated parts"));
        }
        let part = |i: usize| parts.get(i).map(|p| p.trim()).filter(|p| !p.is_empty());

        let group_id = part(0).ok_or_else(|| malformed("missing group"))?;
        let artifact_id = part(1).ok_or_else(|| malformed("missing artifact"))?;
        let version = part(2).ok_or_else(|| malformed("missing version"))?;
        if parts.len() == 4 && part(3).is_none() {
            return Err(malformed("empty classifier"));
        }

        Ok(Self {
            group_id: group_id.to_string(),
            artifact_id: artifact_id.to_string(),
            version: version.to_string(),
            classifier: part(3).map(str::to_string),
            packaging_type,
        })
    }
}

/// An exclusion: exact `group:artifact`, `group:*`, or `*:*`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExclusionPattern {
    /// `None` matches any group
    pub group: Option<String>,
    /// `None` matches any artifact
    pub artifact: Option<String>,
}

impl ExclusionPattern {
    pub fn new(group: &str, artifact: &str) -> Self {
        let wild = |s: &str| (s != "*" && !s.is_empty()).then(|| s.to_string());
        Self {
            group: wild(group),
            artifact: wild(artifact),
        }
    }

    /// Exclude exactly this module.
    pub fn module(key: &ModuleKey) -> Self {
        Self::new(&key.group, &key.artifact)
    }

    pub fn matches(&self, key: &ModuleKey) -> bool {
        self.group.as_ref().is_none_or(|g| *g == key.group)
            && self.artifact.as_ref().is_none_or(|a| *a == key.artifact)
    }
}

impl FromStr for ExclusionPattern {
    type Err = ResolveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().split(':').collect::<Vec<_>>().as_slice() {
            [group] if !group.is_empty() => Ok(Self::new(group, "*")),
            [group, artifact] if !group.is_empty() => Ok(Self::new(group, artifact)),
            _ => Err(ResolveError::MalformedCoordinate {
                input: s.to_string(),
                reason: "exclusion must be 'group', 'group:artifact' or 'group:*'".into(),
            }),
        }
    }
}

impl fmt::Display for ExclusionPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}",
            self.group.as_deref().unwrap_or("*"),
            self.artifact.as_deref().unwrap_or("*")
        )
    }
}

/// A dependency as declared, before catalog lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dependency {
    Local { module_path: String },
    Maven(MavenCoordinates),
    CatalogRef { key: String },
}

impl Dependency {
    /// Parse a notation string.
    ///
    /// - `$key` or `catalog.key` refers to the version catalog
    /// - `./path`, `../path` or `/path` refers to a local module
    /// - anything else is a Maven coordinate
    pub fn parse(notation: &str) -> Result<Self, ResolveError> {
        let notation = notation.trim();
        if let Some(key) = notation
            .strip_prefix('$')
            .or_else(|| notation.strip_prefix("catalog."))
        {
            if key.is_empty() {
                return Err(ResolveError::MalformedCoordinate {
                    input: notation.to_string(),
                    reason: "empty catalog key".into(),
                });
            }
            return Ok(Dependency::CatalogRef {
                key: key.to_string(),
            });
        }
        if notation.starts_with('.') || notation.starts_with('/') {
            return Ok(Dependency::Local {
                module_path: notation.to_string(),
            });
        }
        Ok(Dependency::Maven(notation.parse()?))
    }

    /// Look up catalog references. Local and Maven dependencies pass through.
    pub fn resolve(&self, catalog: &VersionCatalog) -> Result<RequestedDependency, ResolveError> {
        match self {
            Dependency::Local { module_path } => Ok(RequestedDependency::Local {
                module_path: module_path.clone(),
            }),
            Dependency::Maven(coords) => Ok(RequestedDependency::Maven(coords.clone())),
            Dependency::CatalogRef { key } => catalog.lookup(key),
        }
    }
}

impl FromStr for Dependency {
    type Err = ResolveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<MavenCoordinates> for Dependency {
    fn from(coords: MavenCoordinates) -> Self {
        Dependency::Maven(coords)
    }
}

/// A dependency after catalog lookup; what the graph builder consumes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RequestedDependency {
    Local { module_path: String },
    Maven(MavenCoordinates),
}

impl fmt::Display for RequestedDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestedDependency::Local { module_path } => f.write_str(module_path),
            RequestedDependency::Maven(coords) => coords.fmt(f),
        }
    }
}

/// Key to notation mapping, passed explicitly into each resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionCatalog {
    entries: BTreeMap<String, String>,
}

impl VersionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, notation: impl Into<String>) {
        self.entries.insert(key.into(), notation.into());
    }

    pub fn lookup(&self, key: &str) -> Result<RequestedDependency, ResolveError> {
        let notation = self
            .entries
            .get(key)
            .ok_or_else(|| ResolveError::UnknownCatalogEntry {
                key: key.to_string(),
            })?;
        match Dependency::parse(notation)? {
            Dependency::Local { module_path } => Ok(RequestedDependency::Local { module_path }),
            Dependency::Maven(coords) => Ok(RequestedDependency::Maven(coords)),
            Dependency::CatalogRef { .. } => Err(ResolveError::MalformedCoordinate {
                input: notation.clone(),
                reason: format!("catalog entry '{key}' refers to another catalog entry"),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<BTreeMap<String, String>> for VersionCatalog {
    fn from(entries: BTreeMap<String, String>) -> Self {
        Self { entries }
    }
}

impl FromIterator<(String, String)> for VersionCatalog {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
