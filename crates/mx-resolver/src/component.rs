//! Format-independent component metadata.
//!
//! POMs and Gradle module metadata are both lowered into
//! [`ComponentMetadata`]: a list of variants, each with attributes,
//! dependencies and files. A POM becomes two JVM variants, one for the
//! compile classpath and one for the runtime classpath.

use crate::checksum::{Checksum, HashAlgorithm};
use crate::coordinates::{ExclusionPattern, MavenCoordinates, ModuleKey};
use crate::module_metadata::{GmmDependency, GmmFile, GmmVariant, ModuleMetadata};
use crate::pom::{EffectivePom, packaging_extension};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

pub const ATTR_CATEGORY: &str = "org.gradle.category";
pub const ATTR_USAGE: &str = "org.gradle.usage";
pub const ATTR_PLATFORM_TYPE: &str = "org.jetbrains.kotlin.platform.type";
pub const ATTR_NATIVE_TARGET: &str = "org.jetbrains.kotlin.native.target";

/// Classpath a dependency applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Scope {
    Compile,
    Runtime,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Scope::Compile => "compile",
            Scope::Runtime => "runtime",
        })
    }
}

impl FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "compile" => Ok(Scope::Compile),
            "runtime" => Ok(Scope::Runtime),
            other => Err(format!("unknown scope '{other}', expected 'compile' or 'runtime'")),
        }
    }
}

/// The set of scopes an edge contributes to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeSet {
    pub compile: bool,
    pub runtime: bool,
}

impl ScopeSet {
    pub const BOTH: ScopeSet = ScopeSet {
        compile: true,
        runtime: true,
    };
    pub const RUNTIME: ScopeSet = ScopeSet {
        compile: false,
        runtime: true,
    };

    pub fn contains(&self, scope: Scope) -> bool {
        match scope {
            Scope::Compile => self.compile,
            Scope::Runtime => self.runtime,
        }
    }
}

/// Where a component's metadata came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetadataFormat {
    Pom,
    GradleModule,
}

/// A dependency declared by a variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantDependency {
    pub key: ModuleKey,
    pub version: String,
    pub scopes: ScopeSet,
    pub exclusions: BTreeSet<ExclusionPattern>,
    /// Non-default file requested from the target, as `(classifier, extension)`
    pub artifact: Option<(Option<String>, String)>,
}

/// A file published by a variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactFile {
    /// Local file name
    pub name: String,
    /// Path relative to the repository root
    pub path: String,
    pub checksum: Option<Checksum>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    pub name: String,
    pub attributes: BTreeMap<String, String>,
    pub dependencies: Vec<VariantDependency>,
    pub constraints: Vec<VariantDependency>,
    pub files: Vec<ArtifactFile>,
    pub available_at: Option<MavenCoordinates>,
}

impl Variant {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// Metadata for one module version, as served by one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentMetadata {
    pub coordinates: MavenCoordinates,
    pub format: MetadataFormat,
    /// Base URL of the repository that served the metadata
    pub repository: String,
    pub variants: Vec<Variant>,
    pub warnings: Vec<String>,
}

impl ComponentMetadata {
    /// Lower an effective POM.
    pub fn from_pom(pom: &EffectivePom, repository: &str) -> Self {
        let coords = &pom.coordinates;
        let mut warnings = pom.warnings.clone();

        let files: Vec<ArtifactFile> = packaging_extension(&pom.packaging)
            .map(|ext| {
                let name = coords.file_name(None, ext);
                vec![ArtifactFile {
                    path: coords.repository_path(&name),
                    name,
                    checksum: None,
                }]
            })
            .unwrap_or_default();

        let mut api = Vec::new();
        let mut runtime = Vec::new();
        for dep in &pom.dependencies {
            let Some(version) = dep.version.clone() else {
                continue;
            };
            if dep.is_optional() {
                continue;
            }
            let scopes = match dep.scope() {
                "compile" => ScopeSet::BOTH,
                "runtime" => ScopeSet::RUNTIME,
                "provided" | "test" | "system" | "import" => continue,
                other => {
                    warnings.push(format!(
                        "{coords}: dependency {}:{} has unknown scope '{other}' and is skipped",
                        dep.group_id, dep.artifact_id
                    ));
                    continue;
                }
            };
            let (classifier, extension) = dep.artifact();
            let artifact = (classifier.is_some() || extension != "jar")
                .then_some((classifier, extension));
            let converted = VariantDependency {
                key: ModuleKey::new(&dep.group_id, &dep.artifact_id),
                version,
                scopes,
                exclusions: dep
                    .exclusions
                    .iter()
                    .map(|x| ExclusionPattern::new(&x.group_id, &x.artifact_id))
                    .collect(),
                artifact,
            };
            if scopes.compile {
                api.push(converted.clone());
            }
            runtime.push(converted);
        }

        let variant = |name: &str, usage: &str, dependencies: Vec<VariantDependency>| Variant {
            name: name.to_string(),
            attributes: BTreeMap::from([
                (ATTR_CATEGORY.to_string(), "library".to_string()),
                (ATTR_USAGE.to_string(), usage.to_string()),
            ]),
            dependencies,
            constraints: Vec::new(),
            files: files.clone(),
            available_at: None,
        };

        Self {
            coordinates: coords.clone(),
            format: MetadataFormat::Pom,
            repository: repository.to_string(),
            variants: vec![
                variant("apiElements", "java-api", api),
                variant("runtimeElements", "java-runtime", runtime),
            ],
            warnings,
        }
    }

    /// Lower Gradle module metadata fetched for `coords`.
    pub fn from_gradle(module: &ModuleMetadata, coords: &MavenCoordinates, repository: &str) -> Self {
        let mut warnings = Vec::new();
        let base_dir = coords.repository_dir();

        let mut variants: Vec<Variant> = module
            .variants
            .iter()
            .map(|v| {
                let attributes = v
                    .attributes
                    .iter()
                    .map(|(k, val)| (k.clone(), crate::module_metadata::attribute_string(val)))
                    .collect();
                let scopes = if v
                    .attribute(ATTR_USAGE)
                    .is_some_and(|u| u.ends_with("-runtime"))
                {
                    ScopeSet::RUNTIME
                } else {
                    ScopeSet::BOTH
                };
                Variant {
                    name: v.name.clone(),
                    attributes,
                    dependencies: lower_dependencies(&v.dependencies, scopes, coords, v, &mut warnings),
                    constraints: lower_dependencies(
                        &v.dependency_constraints,
                        scopes,
                        coords,
                        v,
                        &mut warnings,
                    ),
                    files: v.files.iter().map(|f| lower_file(f, &base_dir)).collect(),
                    available_at: v.available_at.as_ref().map(|a| {
                        MavenCoordinates::new(&a.group, &a.module, &a.version)
                    }),
                }
            })
            .collect();

        promote_shared_runtime_dependencies(&mut variants);

        Self {
            coordinates: coords.clone(),
            format: MetadataFormat::GradleModule,
            repository: repository.to_string(),
            variants,
            warnings,
        }
    }
}

fn lower_dependencies(
    deps: &[GmmDependency],
    scopes: ScopeSet,
    coords: &MavenCoordinates,
    variant: &GmmVariant,
    warnings: &mut Vec<String>,
) -> Vec<VariantDependency> {
    deps.iter()
        .filter_map(|d| {
            let Some(version) = d.version.as_ref().and_then(|v| v.resolved()) else {
                warnings.push(format!(
                    "{coords} ({}): dependency {}:{} declares no version and is skipped",
                    variant.name, d.group, d.module
                ));
                return None;
            };
            Some(VariantDependency {
                key: ModuleKey::new(&d.group, &d.module),
                version: version.to_string(),
                scopes,
                exclusions: d
                    .excludes
                    .iter()
                    .map(|x| ExclusionPattern::new(&x.group, &x.module))
                    .collect(),
                artifact: None,
            })
        })
        .collect()
}

fn lower_file(file: &GmmFile, base_dir: &str) -> ArtifactFile {
    let checksum = [
        (HashAlgorithm::Sha512, &file.sha512),
        (HashAlgorithm::Sha256, &file.sha256),
        (HashAlgorithm::Sha1, &file.sha1),
    ]
    .into_iter()
    .find_map(|(algorithm, value)| value.as_ref().map(|v| Checksum::new(algorithm, v)));

    ArtifactFile {
        name: file.name.clone(),
        path: resolve_relative(base_dir, &file.url),
        checksum,
    }
}

/// Join a relative URL onto a directory, folding `.` and `..` segments.
pub(crate) fn resolve_relative(base_dir: &str, url: &str) -> String {
    let mut parts: Vec<&str> = base_dir.split('/').filter(|s| !s.is_empty()).collect();
    for segment in url.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

// A runtime variant's dependencies that also appear in the api variant of
// the same platform are on the compile classpath too.
fn promote_shared_runtime_dependencies(variants: &mut [Variant]) {
    let api_keys: Vec<(BTreeMap<String, String>, BTreeSet<ModuleKey>)> = variants
        .iter()
        .filter(|v| v.attribute(ATTR_USAGE).is_some_and(|u| u.ends_with("-api")))
        .map(|v| {
            (
                without_usage(&v.attributes),
                v.dependencies.iter().map(|d| d.key.clone()).collect(),
            )
        })
        .collect();

    for variant in variants.iter_mut() {
        if !variant
            .attribute(ATTR_USAGE)
            .is_some_and(|u| u.ends_with("-runtime"))
        {
            continue;
        }
        let attrs = without_usage(&variant.attributes);
        let Some((_, keys)) = api_keys.iter().find(|(a, _)| *a == attrs) else {
            continue;
        };
        for dep in &mut variant.dependencies {
            if keys.contains(&dep.key) {
                dep.scopes = ScopeSet::BOTH;
            }
        }
    }
}

fn without_usage(attributes: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    attributes
        .iter()
        .filter(|(k, _)| k.as_str() != ATTR_USAGE)
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}
