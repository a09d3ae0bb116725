//! Fixtures that publish libraries into a [`MemoryTransport`].
//!
//! Used by unit tests and benchmarks to build small Maven repositories
//! without touching the network.

use crate::checksum::HashAlgorithm;
use crate::coordinates::MavenCoordinates;
use crate::pom::{ParentRef, Pom, PomDependency};
use crate::transport::MemoryTransport;
use serde_json::{Value, json};

/// Base URL used by fixtures.
pub const TEST_REPO: &str = "https://repo.test/maven2";

/// A library to publish: POM, optional Gradle module file, jar and
/// checksum sidecars.
#[derive(Debug, Clone)]
pub struct LibrarySpec {
    coordinates: MavenCoordinates,
    pom: Pom,
    module: Option<String>,
    generate_module: bool,
    jar: Option<Vec<u8>>,
    sources: bool,
    checksums: bool,
}

impl LibrarySpec {
    pub fn new(group: &str, artifact: &str, version: &str) -> Self {
        let coordinates = MavenCoordinates::new(group, artifact, version);
        let pom = Pom {
            model_version: Some("4.0.0".into()),
            group_id: Some(group.into()),
            artifact_id: Some(artifact.into()),
            version: Some(version.into()),
            ..Default::default()
        };
        Self {
            jar: Some(format!("jar of {}", coordinates.gav()).into_bytes()),
            coordinates,
            pom,
            module: None,
            generate_module: false,
            sources: false,
            checksums: true,
        }
    }

    pub fn coordinates(&self) -> &MavenCoordinates {
        &self.coordinates
    }

    /// A `compile` dependency.
    pub fn depends_on(self, group: &str, artifact: &str, version: &str) -> Self {
        self.dependency(PomDependency::new(group, artifact, Some(version)))
    }

    pub fn depends_on_scoped(self, group: &str, artifact: &str, version: &str, scope: &str) -> Self {
        self.dependency(PomDependency {
            scope: Some(scope.into()),
            ..PomDependency::new(group, artifact, Some(version))
        })
    }

    pub fn dependency(mut self, dependency: PomDependency) -> Self {
        self.pom.dependencies.push(dependency);
        self
    }

    pub fn managed(mut self, dependency: PomDependency) -> Self {
        self.pom.dependency_management.push(dependency);
        self
    }

    pub fn packaging(mut self, packaging: &str) -> Self {
        self.pom.packaging = Some(packaging.into());
        if packaging == "pom" {
            self.jar = None;
        }
        self
    }

    pub fn parent(mut self, group: &str, artifact: &str, version: &str) -> Self {
        self.pom.parent = Some(ParentRef {
            group_id: group.into(),
            artifact_id: artifact.into(),
            version: version.into(),
            relative_path: None,
        });
        self
    }

    pub fn property(mut self, key: &str, value: &str) -> Self {
        self.pom.properties.push((key.into(), value.into()));
        self
    }

    /// Publish a Gradle module file derived from the POM's dependencies.
    pub fn with_gradle_metadata(mut self) -> Self {
        self.pom.published_with_gradle_metadata = true;
        self.generate_module = true;
        self
    }

    /// Publish a hand-written Gradle module file.
    pub fn gradle_module(mut self, json: impl Into<String>) -> Self {
        self.pom.published_with_gradle_metadata = true;
        self.module = Some(json.into());
        self
    }

    pub fn jar(mut self, contents: impl Into<Vec<u8>>) -> Self {
        self.jar = Some(contents.into());
        self
    }

    pub fn without_jar(mut self) -> Self {
        self.jar = None;
        self
    }

    pub fn with_sources(mut self) -> Self {
        self.sources = true;
        self
    }

    /// Do not publish `.sha1` sidecars.
    pub fn without_checksums(mut self) -> Self {
        self.checksums = false;
        self
    }

    /// URL of a file of this library in `repo`.
    pub fn url(&self, repo: &str, classifier: Option<&str>, extension: &str) -> String {
        let name = self.coordinates.file_name(classifier, extension);
        format!("{repo}/{}", self.coordinates.repository_path(&name))
    }

    pub fn publish(&self, transport: &MemoryTransport, repo: &str) {
        transport.insert(self.url(repo, None, "pom"), self.pom.to_xml());

        let module = if self.generate_module {
            Some(self.generated_module())
        } else {
            self.module.clone()
        };
        if let Some(module) = module {
            transport.insert(self.url(repo, None, "module"), module);
        }

        if let Some(jar) = &self.jar {
            self.publish_file(transport, &self.url(repo, None, "jar"), jar);
        }
        if self.sources {
            let contents = format!("sources of {}", self.coordinates.gav());
            self.publish_file(
                transport,
                &self.url(repo, Some("sources"), "jar"),
                contents.as_bytes(),
            );
        }
    }

    fn publish_file(&self, transport: &MemoryTransport, url: &str, contents: &[u8]) {
        transport.insert(url, contents.to_vec());
        if self.checksums {
            let sidecar = format!("{url}.{}", HashAlgorithm::Sha1.extension());
            transport.insert(sidecar, HashAlgorithm::Sha1.digest(contents));
        }
    }

    fn generated_module(&self) -> String {
        let c = &self.coordinates;
        let dependencies = |scopes: &[&str]| -> Vec<Value> {
            self.pom
                .dependencies
                .iter()
                .filter(|d| scopes.contains(&d.scope()))
                .map(|d| {
                    json!({
                        "group": d.group_id,
                        "module": d.artifact_id,
                        "version": { "requires": d.version },
                    })
                })
                .collect()
        };
        let files: Vec<Value> = self
            .jar
            .iter()
            .map(|jar| {
                let name = c.file_name(None, "jar");
                json!({
                    "name": name,
                    "url": name,
                    "size": jar.len(),
                    "sha256": HashAlgorithm::Sha256.digest(jar),
                })
            })
            .collect();
        let variant = |name: &str, usage: &str, deps: Vec<Value>| {
            json!({
                "name": name,
                "attributes": {
                    "org.gradle.category": "library",
                    "org.gradle.usage": usage,
                },
                "dependencies": deps,
                "files": files,
            })
        };
        json!({
            "formatVersion": "1.1",
            "component": {
                "group": c.group_id,
                "module": c.artifact_id,
                "version": c.version,
            },
            "variants": [
                variant("apiElements", "java-api", dependencies(&["compile"])),
                variant("runtimeElements", "java-runtime", dependencies(&["compile", "runtime"])),
            ],
        })
        .to_string()
    }
}
