//! Maven POM parsing and effective-model construction.
//!
//! [`Pom`] is the document as written. [`EffectivePom`] is the model after
//! parent inheritance, `${property}` substitution and dependency
//! management, which is what the resolver consumes. Fetching parents and
//! imported BOMs is left to the repository client.

use crate::coordinates::MavenCoordinates;
use roxmltree::{Document, Node, ParsingOptions, TextPos};
use std::collections::BTreeMap;
use thiserror::Error;

/// Comment Gradle writes into POMs that have a `.module` sibling.
pub const GRADLE_METADATA_MARKER: &str = "published-with-gradle-metadata";

/// Parent chains longer than this are cut off with a warning.
pub const MAX_PARENT_DEPTH: usize = 10;

const MAX_INTERPOLATION_PASSES: usize = 10;

/// Error type for POM parsing.
#[derive(Debug, Error)]
pub enum PomError {
    #[error("malformed POM XML at byte {position}: {message}")]
    Xml { position: u64, message: String },

    #[error("document root is <{0}>, expected <project>")]
    NotAProject(String),

    #[error("document is empty")]
    Empty,
}

/// `<parent>` reference.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParentRef {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
    pub relative_path: Option<String>,
}

impl ParentRef {
    pub fn coordinates(&self) -> MavenCoordinates {
        MavenCoordinates::new(&self.group_id, &self.artifact_id, &self.version)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PomExclusion {
    pub group_id: String,
    pub artifact_id: String,
}

/// A `<dependency>` entry, fields verbatim until interpolated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PomDependency {
    pub group_id: String,
    pub artifact_id: String,
    pub version: Option<String>,
    /// `<type>`
    pub kind: Option<String>,
    pub classifier: Option<String>,
    pub scope: Option<String>,
    pub optional: Option<String>,
    pub exclusions: Vec<PomExclusion>,
}

impl PomDependency {
    pub fn new(group_id: &str, artifact_id: &str, version: Option<&str>) -> Self {
        Self {
            group_id: group_id.to_string(),
            artifact_id: artifact_id.to_string(),
            version: version.map(str::to_string),
            ..Default::default()
        }
    }

    fn set(&mut self, field: &str, value: String) {
        match field {
            "groupId" => self.group_id = value,
            "artifactId" => self.artifact_id = value,
            "version" => self.version = Some(value),
            "type" => self.kind = Some(value),
            "classifier" => self.classifier = Some(value),
            "scope" => self.scope = Some(value),
            "optional" => self.optional = Some(value),
            _ => {}
        }
    }

    pub fn is_optional(&self) -> bool {
        self.optional.as_deref().map(str::trim) == Some("true")
    }

    /// Scope, defaulting to `compile`.
    pub fn scope(&self) -> &str {
        self.scope.as_deref().unwrap_or("compile")
    }

    /// The `(classifier, extension)` of the file this dependency refers to.
    pub fn artifact(&self) -> (Option<String>, String) {
        let classifier = self.classifier.clone().filter(|c| !c.is_empty());
        match self.kind.as_deref().unwrap_or("jar") {
            "test-jar" => (classifier.or(Some("tests".into())), "jar".into()),
            "ejb-client" => (classifier.or(Some("client".into())), "jar".into()),
            "jar" | "bundle" | "maven-plugin" | "ejb" | "" => (classifier, "jar".into()),
            other => (classifier, other.to_string()),
        }
    }

    // dependencyManagement matches on group, artifact, type and classifier
    fn management_key(&self) -> (String, String, String, Option<String>) {
        let (classifier, extension) = self.artifact();
        (
            self.group_id.clone(),
            self.artifact_id.clone(),
            extension,
            classifier,
        )
    }

    fn interpolate(&self, props: &BTreeMap<String, String>) -> Self {
        let i = |s: &String| interpolate(s, props);
        Self {
            group_id: i(&self.group_id),
            artifact_id: i(&self.artifact_id),
            version: self.version.as_ref().map(i),
            kind: self.kind.as_ref().map(i),
            classifier: self.classifier.as_ref().map(i),
            scope: self.scope.as_ref().map(i),
            optional: self.optional.as_ref().map(i),
            exclusions: self
                .exclusions
                .iter()
                .map(|x| PomExclusion {
                    group_id: i(&x.group_id),
                    artifact_id: i(&x.artifact_id),
                })
                .collect(),
        }
    }
}

/// A parsed POM document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pom {
    pub model_version: Option<String>,
    pub parent: Option<ParentRef>,
    pub group_id: Option<String>,
    pub artifact_id: Option<String>,
    pub version: Option<String>,
    pub packaging: Option<String>,
    pub name: Option<String>,
    /// In document order
    pub properties: Vec<(String, String)>,
    pub dependency_management: Vec<PomDependency>,
    pub dependencies: Vec<PomDependency>,
    pub published_with_gradle_metadata: bool,
}

impl Pom {
    /// Parse a POM document.
    ///
    /// Elements outside the modelled subset (build, profiles, repositories,
    /// ...) are skipped, as is whitespace. Comments are dropped except for
    /// the Gradle metadata marker.
    pub fn parse(bytes: &[u8]) -> Result<Self, PomError> {
        let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
        let text = std::str::from_utf8(bytes).map_err(|e| PomError::Xml {
            position: e.valid_up_to() as u64,
            message: e.to_string(),
        })?;
        if text.trim().is_empty() {
            return Err(PomError::Empty);
        }

        let mut options = ParsingOptions::default();
        options.allow_dtd = true;
        let document = Document::parse_with_options(text, options).map_err(|e| PomError::Xml {
            position: byte_offset(text, e.pos()),
            message: e.to_string(),
        })?;
        let project = document.root_element();
        if project.tag_name().name() != "project" {
            return Err(PomError::NotAProject(project.tag_name().name().to_string()));
        }

        let mut pom = Pom {
            published_with_gradle_metadata: document.descendants().any(|n| {
                n.is_comment() && n.text().is_some_and(|t| t.contains(GRADLE_METADATA_MARKER))
            }),
            ..Default::default()
        };
        for child in elements(project) {
            let value = || text_of(child);
            match child.tag_name().name() {
                "modelVersion" => pom.model_version = Some(value()),
                "groupId" => pom.group_id = Some(value()),
                "artifactId" => pom.artifact_id = Some(value()),
                "version" => pom.version = Some(value()),
                "packaging" => pom.packaging = Some(value()),
                "name" => pom.name = Some(value()),
                "parent" => pom.parent = Some(parse_parent(child)),
                "properties" => pom.properties.extend(
                    elements(child).map(|p| (p.tag_name().name().to_string(), text_of(p))),
                ),
                "dependencies" => pom.dependencies.extend(parse_dependencies(child)),
                "dependencyManagement" => {
                    for deps in elements(child).filter(|n| n.has_tag_name("dependencies")) {
                        pom.dependency_management.extend(parse_dependencies(deps));
                    }
                }
                _ => {}
            }
        }
        Ok(pom)
    }

    /// Serialize back to XML.
    ///
    /// Only the modelled elements are written; parsing the output yields an
    /// equal [`Pom`].
    pub fn to_xml(&self) -> String {
        let mut out = XmlOut::default();
        out.line(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
        out.open_with(
            "project",
            r#" xmlns="http://maven.apache.org/POM/4.0.0" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance""#,
        );
        if self.published_with_gradle_metadata {
            out.line(&format!("<!-- do_not_remove: {GRADLE_METADATA_MARKER} -->"));
        }
        out.leaf_opt("modelVersion", &self.model_version);
        if let Some(parent) = &self.parent {
            out.open("parent");
            out.leaf("groupId", &parent.group_id);
            out.leaf("artifactId", &parent.artifact_id);
            out.leaf("version", &parent.version);
            out.leaf_opt("relativePath", &parent.relative_path);
            out.close("parent");
        }
        out.leaf_opt("groupId", &self.group_id);
        out.leaf_opt("artifactId", &self.artifact_id);
        out.leaf_opt("version", &self.version);
        out.leaf_opt("packaging", &self.packaging);
        out.leaf_opt("name", &self.name);
        if !self.properties.is_empty() {
            out.open("properties");
            for (k, v) in &self.properties {
                out.leaf(k, v);
            }
            out.close("properties");
        }
        if !self.dependency_management.is_empty() {
            out.open("dependencyManagement");
            write_dependencies(&mut out, &self.dependency_management);
            out.close("dependencyManagement");
        }
        if !self.dependencies.is_empty() {
            write_dependencies(&mut out, &self.dependencies);
        }
        out.close("project");
        out.buf
    }
}

fn elements<'a, 'input>(node: Node<'a, 'input>) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(Node::is_element)
}

/// Trimmed text content; an empty element yields `""`.
fn text_of(node: Node<'_, '_>) -> String {
    node.text().map(str::trim).unwrap_or_default().to_string()
}

fn byte_offset(text: &str, pos: TextPos) -> u64 {
    let line_start: usize = text
        .split_inclusive('\n')
        .take(pos.row.saturating_sub(1) as usize)
        .map(str::len)
        .sum();
    (line_start + pos.col.saturating_sub(1) as usize) as u64
}

fn parse_parent(node: Node<'_, '_>) -> ParentRef {
    let mut parent = ParentRef::default();
    for child in elements(node) {
        let value = text_of(child);
        match child.tag_name().name() {
            "groupId" => parent.group_id = value,
            "artifactId" => parent.artifact_id = value,
            "version" => parent.version = value,
            "relativePath" => parent.relative_path = Some(value),
            _ => {}
        }
    }
    parent
}

fn parse_dependencies(node: Node<'_, '_>) -> impl Iterator<Item = PomDependency> {
    elements(node)
        .filter(|n| n.has_tag_name("dependency"))
        .map(|node| {
            let mut dep = PomDependency::default();
            for child in elements(node) {
                if child.has_tag_name("exclusions") {
                    dep.exclusions.extend(
                        elements(child)
                            .filter(|n| n.has_tag_name("exclusion"))
                            .map(parse_exclusion),
                    );
                } else {
                    dep.set(child.tag_name().name(), text_of(child));
                }
            }
            dep
        })
}

fn parse_exclusion(node: Node<'_, '_>) -> PomExclusion {
    let mut exclusion = PomExclusion::default();
    for child in elements(node) {
        match child.tag_name().name() {
            "groupId" => exclusion.group_id = text_of(child),
            "artifactId" => exclusion.artifact_id = text_of(child),
            _ => {}
        }
    }
    exclusion
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}
#[derive(Default)]
struct XmlOut {
    buf: String,
    depth: usize,
}

impl XmlOut {
    fn line(&mut self, s: &str) {
        for _ in 0..self.depth {
            self.buf.push_str("  ");
        }
        self.buf.push_str(s);
        self.buf.push('\n');
    }

    fn open(&mut self, name: &str) {
        self.open_with(name, "");
    }

    fn open_with(&mut self, name: &str, attrs: &str) {
        self.line(&format!("<{name}{attrs}>"));
        self.depth += 1;
    }

    fn close(&mut self, name: &str) {
        self.depth = self.depth.saturating_sub(1);
        self.line(&format!("</{name}>"));
    }

    fn leaf(&mut self, name: &str, value: &str) {
        let escaped = escape(value);
        self.line(&format!("<{name}>{escaped}</{name}>"));
    }

    fn leaf_opt(&mut self, name: &str, value: &Option<String>) {
        if let Some(v) = value {
            self.leaf(name, v);
        }
    }
}

fn write_dependencies(out: &mut XmlOut, deps: &[PomDependency]) {
    out.open("dependencies");
    for dep in deps {
        out.open("dependency");
        out.leaf("groupId", &dep.group_id);
        out.leaf("artifactId", &dep.artifact_id);
        out.leaf_opt("version", &dep.version);
        out.leaf_opt("type", &dep.kind);
        out.leaf_opt("classifier", &dep.classifier);
        out.leaf_opt("scope", &dep.scope);
        out.leaf_opt("optional", &dep.optional);
        if !dep.exclusions.is_empty() {
            out.open("exclusions");
            for x in &dep.exclusions {
                out.open("exclusion");
                out.leaf("groupId", &x.group_id);
                out.leaf("artifactId", &x.artifact_id);
                out.close("exclusion");
            }
            out.close("exclusions");
        }
        out.close("dependency");
    }
    out.close("dependencies");
}

/// Replace `${key}` references with values from `props`.
///
/// Substitution repeats so properties may refer to other properties.
/// Unknown references are left in place.
pub fn interpolate(value: &str, props: &BTreeMap<String, String>) -> String {
    let mut current = value.to_string();
    for _ in 0..MAX_INTERPOLATION_PASSES {
        if !current.contains("${") {
            break;
        }
        let next = expand_once(&current, props);
        if next == current {
            break;
        }
        current = next;
    }
    current
}

fn expand_once(s: &str, props: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let key = &after[..end];
        match props.get(key) {
            Some(v) => out.push_str(v),
            None => {
                out.push_str("${");
                out.push_str(key);
                out.push('}');
            }
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}

/// File extension of the main artifact for a `<packaging>`, `None` for
/// `pom` packaging which publishes no artifact.
pub fn packaging_extension(packaging: &str) -> Option<&str> {
    match packaging {
        "pom" => None,
        "" | "jar" | "bundle" | "maven-plugin" | "ejb" | "eclipse-plugin" => Some("jar"),
        other => Some(other),
    }
}

/// A POM after inheritance, interpolation and dependency management.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectivePom {
    pub coordinates: MavenCoordinates,
    pub packaging: String,
    pub properties: BTreeMap<String, String>,
    pub dependency_management: Vec<PomDependency>,
    pub dependencies: Vec<PomDependency>,
    pub published_with_gradle_metadata: bool,
    pub warnings: Vec<String>,
}

impl EffectivePom {
    /// Build the inherited model. `chain[0]` is the POM itself, followed by
    /// its parent, grandparent and so on.
    ///
    /// Imports are left in `dependency_management`; call
    /// [`take_imports`](Self::take_imports) and
    /// [`import_management`](Self::import_management) before
    /// [`apply_management`](Self::apply_management).
    pub fn from_chain(chain: &[Pom]) -> Self {
        let own = chain.first().cloned().unwrap_or_default();
        let parent = own.parent.clone().unwrap_or_default();

        let group_id = own.group_id.clone().unwrap_or(parent.group_id.clone());
        let artifact_id = own.artifact_id.clone().unwrap_or_default();
        let version = own.version.clone().unwrap_or(parent.version.clone());
        let packaging = own.packaging.clone().unwrap_or_else(|| "jar".to_string());

        // Ancestors first so that descendants override.
        let mut properties = BTreeMap::new();
        for pom in chain.iter().rev() {
            for (k, v) in &pom.properties {
                properties.insert(k.clone(), v.clone());
            }
        }
        let builtins = [
            ("groupId", &group_id),
            ("artifactId", &artifact_id),
            ("version", &version),
            ("packaging", &packaging),
            ("parent.groupId", &parent.group_id),
            ("parent.artifactId", &parent.artifact_id),
            ("parent.version", &parent.version),
        ];
        for (name, value) in builtins {
            for prefix in ["project.", "pom.", ""] {
                properties
                    .entry(format!("{prefix}{name}"))
                    .or_insert_with(|| value.clone());
            }
        }

        let merge = |select: fn(&Pom) -> &Vec<PomDependency>| {
            let mut merged: Vec<PomDependency> = Vec::new();
            for pom in chain {
                for dep in select(pom) {
                    let dep = dep.interpolate(&properties);
                    let key = dep.management_key();
                    if !merged.iter().any(|d| d.management_key() == key) {
                        merged.push(dep);
                    }
                }
            }
            merged
        };
        let dependency_management = merge(|p| &p.dependency_management);
        let dependencies = merge(|p| &p.dependencies);

        Self {
            coordinates: MavenCoordinates::new(
                interpolate(&group_id, &properties),
                interpolate(&artifact_id, &properties),
                interpolate(&version, &properties),
            ),
            packaging: interpolate(&packaging, &properties),
            properties,
            dependency_management,
            dependencies,
            published_with_gradle_metadata: own.published_with_gradle_metadata,
            warnings: Vec::new(),
        }
    }

    /// Remove and return `import`-scoped BOM entries.
    pub fn take_imports(&mut self) -> Vec<MavenCoordinates> {
        let (imports, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.dependency_management)
            .into_iter()
            .partition(|d| d.scope() == "import");
        self.dependency_management = kept;
        imports
            .into_iter()
            .filter_map(|d| {
                let version = d.version?;
                Some(MavenCoordinates::new(d.group_id, d.artifact_id, version))
            })
            .collect()
    }

    /// Append a BOM's managed entries; entries already managed here win.
    pub fn import_management(&mut self, bom: &EffectivePom) {
        for dep in &bom.dependency_management {
            let key = dep.management_key();
            if !self
                .dependency_management
                .iter()
                .any(|d| d.management_key() == key)
            {
                self.dependency_management.push(dep.clone());
            }
        }
    }

    /// Fill missing versions, scopes and exclusions from dependency
    /// management. Dependencies left without a version produce a warning.
    pub fn apply_management(&mut self) {
        for dep in &mut self.dependencies {
            let key = dep.management_key();
            let managed = self
                .dependency_management
                .iter()
                .find(|m| m.management_key() == key)
                .or_else(|| {
                    self.dependency_management
                        .iter()
                        .find(|m| m.group_id == dep.group_id && m.artifact_id == dep.artifact_id)
                });
            if let Some(managed) = managed {
                if dep.version.is_none() {
                    dep.version = managed.version.clone();
                }
                if dep.scope.is_none() {
                    dep.scope = managed.scope.clone();
                }
                if dep.exclusions.is_empty() {
                    dep.exclusions = managed.exclusions.clone();
                }
            }
            if dep.version.is_none() {
                self.warnings.push(format!(
                    "{}: dependency {}:{} has no version and is skipped",
                    self.coordinates, dep.group_id, dep.artifact_id
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<project xmlns="http://maven.apache.org/POM/4.0.0">
  <!-- This module was also published with a richer model, Gradle metadata,  -->
  <!-- which should be used instead. Do not delete the following line which  -->
  <!-- is to indicate to Gradle or any Gradle module metadata file consumer  -->
  <!-- that they should prefer consuming it instead. -->
  <!-- do_not_remove: published-with-gradle-metadata -->
  <modelVersion>4.0.0</modelVersion>
  <parent>
    <groupId>org.example</groupId>
    <artifactId>parent</artifactId>
    <version>3</version>
  </parent>
  <artifactId>lib</artifactId>
  <version>1.0</version>
  <name>Lib &amp; friends</name>
  <properties>
    <slf4j.version>2.0.9</slf4j.version>
  </properties>
  <dependencyManagement>
    <dependencies>
      <dependency>
        <groupId>org.example</groupId>
        <artifactId>bom</artifactId>
        <version>7</version>
        <type>pom</type>
        <scope>import</scope>
      </dependency>
    </dependencies>
  </dependencyManagement>
  <dependencies>
    <dependency>
      <groupId>org.slf4j</groupId>
      <artifactId>slf4j-api</artifactId>
      <version>${slf4j.version}</version>
      <exclusions>
        <exclusion>
          <groupId>org.bad</groupId>
          <artifactId>*</artifactId>
        </exclusion>
      </exclusions>
    </dependency>
    <dependency>
      <groupId>junit</groupId>
      <artifactId>junit</artifactId>
      <version>4.13.2</version>
      <scope>test</scope>
      <optional/>
    </dependency>
  </dependencies>
  <build>
    <plugins>
      <plugin>
        <artifactId>maven-surefire-plugin</artifactId>
        <dependencies>
          <dependency>
            <groupId>org.plugin</groupId>
            <artifactId>only-for-build</artifactId>
            <version>1</version>
          </dependency>
        </dependencies>
      </plugin>
    </plugins>
  </build>
</project>
"#;

    #[test]
    fn test_parse_sample() {
        let pom = Pom::parse(SAMPLE.as_bytes()).unwrap();
        assert!(pom.published_with_gradle_metadata);
        assert_eq!(pom.model_version.as_deref(), Some("4.0.0"));
        assert_eq!(pom.parent.as_ref().unwrap().artifact_id, "parent");
        assert_eq!(pom.group_id, None);
        assert_eq!(pom.name.as_deref(), Some("Lib & friends"));
        assert_eq!(
            pom.properties,
            vec![("slf4j.version".to_string(), "2.0.9".to_string())]
        );
        assert_eq!(pom.dependency_management.len(), 1);
        assert_eq!(pom.dependencies.len(), 2, "plugin dependencies are ignored");
        assert_eq!(pom.dependencies[0].exclusions.len(), 1);
        assert_eq!(pom.dependencies[1].scope.as_deref(), Some("test"));
        assert_eq!(pom.dependencies[1].optional.as_deref(), Some(""));
    }

    #[test]
    fn test_roundtrip() {
        let pom = Pom::parse(SAMPLE.as_bytes()).unwrap();
        let again = Pom::parse(pom.to_xml().as_bytes()).unwrap();
        assert_eq!(pom, again);
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            Pom::parse(b"<settings></settings>"),
            Err(PomError::NotAProject(name)) if name == "settings"
        ));
        assert!(matches!(Pom::parse(b""), Err(PomError::Empty)));
        assert!(matches!(
            Pom::parse(b"<project><version>1</project>"),
            Err(PomError::Xml { .. })
        ));
    }

    #[test]
    fn test_interpolate() {
        let mut props = BTreeMap::new();
        props.insert("a".to_string(), "${b}-x".to_string());
        props.insert("b".to_string(), "1.0".to_string());
        assert_eq!(interpolate("${a}", &props), "1.0-x");
        assert_eq!(interpolate("v${missing}", &props), "v${missing}");
        assert_eq!(interpolate("${unterminated", &props), "${unterminated");

        props.insert("loop".to_string(), "${loop}".to_string());
        assert_eq!(interpolate("${loop}", &props), "${loop}");
    }

    fn pom(xml: &str) -> Pom {
        Pom::parse(xml.as_bytes()).unwrap()
    }

    #[test]
    fn test_effective_inherits_from_parent() {
        let child = pom(r#"<project>
  <parent><groupId>org.example</groupId><artifactId>parent</artifactId><version>3</version></parent>
  <artifactId>child</artifactId>
  <dependencies>
    <dependency><groupId>org.lib</groupId><artifactId>a</artifactId></dependency>
    <dependency><groupId>${project.groupId}</groupId><artifactId>sibling</artifactId><version>${project.version}</version></dependency>
  </dependencies>
</project>"#);
        let parent = pom(r#"<project>
  <groupId>org.example</groupId><artifactId>parent</artifactId><version>3</version>
  <packaging>pom</packaging>
  <properties><a.version>2.1</a.version></properties>
  <dependencyManagement><dependencies>
    <dependency><groupId>org.lib</groupId><artifactId>a</artifactId><version>${a.version}</version><scope>runtime</scope></dependency>
  </dependencies></dependencyManagement>
</project>"#);

        let mut effective = EffectivePom::from_chain(&[child, parent]);
        assert!(effective.take_imports().is_empty());
        effective.apply_management();

        assert_eq!(effective.coordinates.gav(), "org.example:child:3");
        assert_eq!(effective.packaging, "jar");
        assert_eq!(effective.dependencies[0].version.as_deref(), Some("2.1"));
        assert_eq!(effective.dependencies[0].scope.as_deref(), Some("runtime"));
        assert_eq!(effective.dependencies[1].group_id, "org.example");
        assert_eq!(effective.dependencies[1].version.as_deref(), Some("3"));
        assert!(effective.warnings.is_empty());
    }

    #[test]
    fn test_bom_import() {
        let mut effective = EffectivePom::from_chain(&[pom(r#"<project>
  <groupId>g</groupId><artifactId>app</artifactId><version>1</version>
  <dependencyManagement><dependencies>
    <dependency><groupId>g</groupId><artifactId>bom</artifactId><version>5</version><type>pom</type><scope>import</scope></dependency>
  </dependencies></dependencyManagement>
  <dependencies>
    <dependency><groupId>g</groupId><artifactId>managed</artifactId></dependency>
    <dependency><groupId>g</groupId><artifactId>unmanaged</artifactId></dependency>
  </dependencies>
</project>"#)]);
        let bom = EffectivePom::from_chain(&[pom(r#"<project>
  <groupId>g</groupId><artifactId>bom</artifactId><version>5</version><packaging>pom</packaging>
  <dependencyManagement><dependencies>
    <dependency><groupId>g</groupId><artifactId>managed</artifactId><version>${project.version}.0</version></dependency>
  </dependencies></dependencyManagement>
</project>"#)]);

        let imports = effective.take_imports();
        assert_eq!(imports, vec![MavenCoordinates::new("g", "bom", "5")]);
        effective.import_management(&bom);
        effective.apply_management();

        assert_eq!(effective.dependencies[0].version.as_deref(), Some("5.0"));
        assert_eq!(effective.dependencies[1].version, None);
        assert_eq!(effective.warnings.len(), 1);
    }

    #[test]
    fn test_dependency_artifact_mapping() {
        let mut dep = PomDependency::new("g", "a", Some("1"));
        assert_eq!(dep.artifact(), (None, "jar".to_string()));
        dep.kind = Some("test-jar".into());
        assert_eq!(dep.artifact(), (Some("tests".to_string()), "jar".to_string()));
        dep.kind = Some("aar".into());
        dep.classifier = Some("debug".into());
        assert_eq!(dep.artifact(), (Some("debug".to_string()), "aar".to_string()));

        assert_eq!(packaging_extension("bundle"), Some("jar"));
        assert_eq!(packaging_extension("pom"), None);
        assert_eq!(packaging_extension("war"), Some("war"));
    }
}
