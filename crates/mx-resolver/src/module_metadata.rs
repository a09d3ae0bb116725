//! Gradle Module Metadata (`.module` JSON).
//!
//! Fields the resolver does not interpret are kept in `extra` maps, so a
//! document survives parse and re-serialization without loss. Object keys
//! come out sorted.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

/// Error type for module metadata parsing.
#[derive(Debug, Error)]
pub enum ModuleMetadataError {
    #[error("invalid module metadata JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported module metadata format version {0}")]
    UnsupportedFormat(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleMetadata {
    pub format_version: String,
    pub component: Component,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variants: Vec<GmmVariant>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub group: String,
    pub module: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GmmVariant {
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Value>,
    #[serde(
        default,
        rename = "available-at",
        skip_serializing_if = "Option::is_none"
    )]
    pub available_at: Option<AvailableAt>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<GmmDependency>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependency_constraints: Vec<GmmDependency>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<GmmFile>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GmmVariant {
    /// String form of an attribute; booleans and numbers are stringified.
    pub fn attribute(&self, name: &str) -> Option<String> {
        self.attributes.get(name).map(attribute_string)
    }
}

pub(crate) fn attribute_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailableAt {
    pub url: String,
    pub group: String,
    pub module: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GmmDependency {
    pub group: String,
    pub module: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<VersionRequirement>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excludes: Vec<GmmExclude>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRequirement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strictly: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefers: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rejects: Vec<String>,
}

impl VersionRequirement {
    /// `strictly`, else `requires`, else `prefers`.
    pub fn resolved(&self) -> Option<&str> {
        self.strictly
            .as_deref()
            .or(self.requires.as_deref())
            .or(self.prefers.as_deref())
            .filter(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GmmExclude {
    pub group: String,
    pub module: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GmmFile {
    pub name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha512: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,
}

impl ModuleMetadata {
    pub fn parse(bytes: &[u8]) -> Result<Self, ModuleMetadataError> {
        let metadata: ModuleMetadata = serde_json::from_slice(bytes)?;
        // Format 1.x is the only published major version.
        if !metadata.format_version.starts_with("1.") {
            return Err(ModuleMetadataError::UnsupportedFormat(
                metadata.format_version,
            ));
        }
        Ok(metadata)
    }

    pub fn to_json(&self) -> Result<String, ModuleMetadataError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
