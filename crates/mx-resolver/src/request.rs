//! Resolution requests.

use crate::component::Scope;
use crate::coordinates::{
    Dependency, ExclusionPattern, MavenCoordinates, ModuleKey, RequestedDependency,
    VersionCatalog,
};
use crate::error::ResolveError;
use crate::repository::Repository;
use crate::variant::Platform;
use std::collections::{BTreeMap, BTreeSet};

/// Local modules of the project, by path, with their declared dependencies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalModules {
    modules: BTreeMap<String, Vec<Dependency>>,
}

impl LocalModules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, dependencies: Vec<Dependency>) {
        self.modules.insert(normalize_module_path(&path.into()), dependencies);
    }

    pub fn get(&self, path: &str) -> Option<&[Dependency]> {
        self.modules
            .get(&normalize_module_path(path))
            .map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

fn normalize_module_path(path: &str) -> String {
    let trimmed = path.trim().trim_end_matches('/');
    trimmed.strip_prefix("./").unwrap_or(trimmed).to_string()
}

/// Everything needed to resolve one classpath.
///
/// Repositories, catalog and local modules travel with the request; the
/// resolver keeps no global state about them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionRequest {
    pub dependencies: Vec<Dependency>,
    pub repositories: Vec<Repository>,
    pub scope: Scope,
    pub platform: Platform,
    pub download_sources: bool,
    /// Versions pinned regardless of what is requested
    pub force: BTreeMap<ModuleKey, String>,
    /// Modules excluded everywhere below the roots
    pub exclusions: BTreeSet<ExclusionPattern>,
    pub catalog: VersionCatalog,
    pub local_modules: LocalModules,
}

/// Maven roots of a request after catalog and local module expansion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roots {
    pub coordinates: Vec<MavenCoordinates>,
    /// Local module paths that contributed roots, in visit order
    pub local_modules: Vec<String>,
}

impl ResolutionRequest {
    pub fn new(scope: Scope, platform: Platform) -> Self {
        Self {
            dependencies: Vec::new(),
            repositories: Vec::new(),
            scope,
            platform,
            download_sources: false,
            force: BTreeMap::new(),
            exclusions: BTreeSet::new(),
            catalog: VersionCatalog::new(),
            local_modules: LocalModules::new(),
        }
    }

    pub fn dependency(mut self, dependency: impl Into<Dependency>) -> Self {
        self.dependencies.push(dependency.into());
        self
    }

    /// Add a dependency in string notation.
    pub fn parse_dependency(self, notation: &str) -> Result<Self, ResolveError> {
        Ok(self.dependency(Dependency::parse(notation)?))
    }

    pub fn repository(mut self, repository: Repository) -> Self {
        self.repositories.push(repository);
        self
    }

    pub fn repositories(mut self, repositories: impl IntoIterator<Item = Repository>) -> Self {
        self.repositories.extend(repositories);
        self
    }

    /// Pin a module to a version, given as `group:artifact:version`.
    pub fn force(mut self, coordinate: &str) -> Result<Self, ResolveError> {
        let coords: MavenCoordinates = coordinate.parse()?;
        self.force.insert(coords.key(), coords.version);
        Ok(self)
    }

    pub fn exclude(mut self, pattern: &str) -> Result<Self, ResolveError> {
        self.exclusions.insert(pattern.parse()?);
        Ok(self)
    }

    pub fn with_sources(mut self, download_sources: bool) -> Self {
        self.download_sources = download_sources;
        self
    }

    pub fn with_catalog(mut self, catalog: VersionCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_local_modules(mut self, local_modules: LocalModules) -> Self {
        self.local_modules = local_modules;
        self
    }

    /// Resolve catalog references and expand local modules into Maven roots.
    ///
    /// Local modules contribute their own dependencies, recursively; a
    /// module reached twice is expanded once.
    pub fn roots(&self) -> Result<Roots, ResolveError> {
        let mut roots = Roots::default();
        let mut visited = BTreeSet::new();
        self.collect_roots(&self.dependencies, &mut roots, &mut visited)?;
        Ok(roots)
    }

    fn collect_roots(
        &self,
        dependencies: &[Dependency],
        roots: &mut Roots,
        visited: &mut BTreeSet<String>,
    ) -> Result<(), ResolveError> {
        for dependency in dependencies {
            match dependency.resolve(&self.catalog)? {
                RequestedDependency::Maven(coords) => {
                    if !roots.coordinates.contains(&coords) {
                        roots.coordinates.push(coords);
                    }
                }
                RequestedDependency::Local { module_path } => {
                    let path = normalize_module_path(&module_path);
                    if !visited.insert(path.clone()) {
                        continue;
                    }
                    let declared = self.local_modules.get(&path).ok_or_else(|| {
                        ResolveError::UnknownLocalModule {
                            path: module_path.clone(),
                        }
                    })?;
                    roots.local_modules.push(path);
                    self.collect_roots(declared, roots, visited)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ResolutionRequest {
        ResolutionRequest::new(Scope::Runtime, Platform::Jvm)
    }

    fn deps(notations: &[&str]) -> Vec<Dependency> {
        notations.iter().map(|n| Dependency::parse(n).unwrap()).collect()
    }

    #[test]
    fn test_catalog_references_resolve() {
        let mut catalog = VersionCatalog::new();
        catalog.insert("slf4j", "org.slf4j:slf4j-api:2.0.9");
        let roots = request()
            .with_catalog(catalog)
            .parse_dependency("$slf4j")
            .unwrap()
            .roots()
            .unwrap();
        assert_eq!(roots.coordinates[0].gav(), "org.slf4j:slf4j-api:2.0.9");
    }

    #[test]
    fn test_unknown_catalog_entry() {
        let err = request().parse_dependency("$nope").unwrap().roots().unwrap_err();
        assert!(matches!(err, ResolveError::UnknownCatalogEntry { key } if key == "nope"));
    }

    #[test]
    fn test_local_modules_expand_recursively() {
        let mut locals = LocalModules::new();
        locals.insert("./app", deps(&["./lib", "g:a:1"]));
        locals.insert("lib", deps(&["g:b:1", "./app"]));
        let roots = request()
            .with_local_modules(locals)
            .parse_dependency("./app")
            .unwrap()
            .parse_dependency("g:a:1")
            .unwrap()
            .roots()
            .unwrap();

        let gavs: Vec<String> = roots.coordinates.iter().map(|c| c.gav()).collect();
        assert_eq!(gavs, vec!["g:b:1", "g:a:1"]);
        assert_eq!(roots.local_modules, vec!["app", "lib"]);
    }

    #[test]
    fn test_unknown_local_module() {
        let err = request()
            .parse_dependency("./missing")
            .unwrap()
            .roots()
            .unwrap_err();
        assert!(matches!(err, ResolveError::UnknownLocalModule { .. }));
    }

    #[test]
    fn test_force_and_exclude_parse() {
        let req = request()
            .force("org.example:lib:1.0")
            .unwrap()
            .exclude("commons-logging")
            .unwrap();
        assert_eq!(
            req.force.get(&ModuleKey::new("org.example", "lib")).map(String::as_str),
            Some("1.0")
        );
        assert!(
            req.exclusions
                .iter()
                .any(|p| p.matches(&ModuleKey::new("commons-logging", "anything")))
        );
        assert!(request().force("org.example:lib").is_err());
    }
}
