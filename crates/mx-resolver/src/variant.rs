//! Platform-aware variant selection.

use crate::component::{
    ATTR_CATEGORY, ATTR_NATIVE_TARGET, ATTR_PLATFORM_TYPE, ATTR_USAGE, ComponentMetadata, Scope,
    Variant,
};
use crate::error::ResolveError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::trace;

/// Attributes that take part in matching. Any other attribute on a variant
/// counts against it when breaking ties.
const KNOWN_ATTRIBUTES: [&str; 4] = [
    ATTR_CATEGORY,
    ATTR_USAGE,
    ATTR_PLATFORM_TYPE,
    ATTR_NATIVE_TARGET,
];

/// Target platform of a resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Platform {
    Common,
    Jvm,
    Android,
    Js,
    Wasm,
    /// Kotlin/Native target in Gradle's snake case, e.g. `linux_x64`
    Native(String),
}

impl Platform {
    /// The platform a variant was published for, from its attributes.
    /// `None` for variants that do not declare one (plain Java libraries).
    pub fn of_variant(variant: &Variant) -> Option<Platform> {
        let kind = variant.attribute(ATTR_PLATFORM_TYPE)?;
        Some(match kind {
            "common" => Platform::Common,
            "jvm" => Platform::Jvm,
            "androidJvm" => Platform::Android,
            "js" => Platform::Js,
            "wasm" => Platform::Wasm,
            "native" => Platform::Native(
                variant
                    .attribute(ATTR_NATIVE_TARGET)
                    .map(to_snake_case)
                    .unwrap_or_default(),
            ),
            other => Platform::Native(to_snake_case(other)),
        })
    }

    /// The platform to try when nothing matches exactly.
    pub fn fallback(&self) -> Option<Platform> {
        match self {
            Platform::Android => Some(Platform::Jvm),
            _ => None,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Common => f.write_str("common"),
            Platform::Jvm => f.write_str("jvm"),
            Platform::Android => f.write_str("android"),
            Platform::Js => f.write_str("js"),
            Platform::Wasm => f.write_str("wasm"),
            Platform::Native(target) => f.write_str(target),
        }
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || !s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(format!("invalid platform '{s}'"));
        }
        Ok(match s {
            "common" => Platform::Common,
            "jvm" => Platform::Jvm,
            "android" | "androidJvm" => Platform::Android,
            "js" => Platform::Js,
            "wasm" | "wasmJs" => Platform::Wasm,
            target => Platform::Native(to_snake_case(target)),
        })
    }
}

/// `linuxX64` -> `linux_x64`, `iosSimulatorArm64` -> `ios_simulator_arm64`.
fn to_snake_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    for (i, c) in s.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 && !out.ends_with('_') {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// How well a variant's platform serves the requested one.
fn platform_rank(requested: &Platform, variant: &Variant) -> u8 {
    match Platform::of_variant(variant) {
        Some(p) if p == *requested => 3,
        Some(p) if requested.fallback().as_ref() == Some(&p) => 2,
        None | Some(Platform::Common) => 1,
        Some(_) => 0,
    }
}

fn usage_rank(scope: Scope, variant: &Variant) -> u8 {
    let wanted = match scope {
        Scope::Compile => "-api",
        Scope::Runtime => "-runtime",
    };
    match variant.attribute(ATTR_USAGE) {
        Some(usage) if usage.ends_with(wanted) => 2,
        None => 1,
        Some(_) => 0,
    }
}

fn unused_attributes(variant: &Variant) -> usize {
    variant
        .attributes
        .keys()
        .filter(|k| !KNOWN_ATTRIBUTES.contains(&k.as_str()))
        .count()
}

fn is_library(variant: &Variant) -> bool {
    variant
        .attribute(ATTR_CATEGORY)
        .is_none_or(|c| c == "library")
}

/// Pick the variant of `metadata` that best serves `platform` and `scope`.
///
/// Preference order: exact platform, then the platform's fallback (Android
/// accepts JVM), then variants that are common or declare no platform.
/// Within a platform rank, the usage matching the scope wins; then the
/// variant with the fewest unrecognised attributes; then declaration order.
/// Non-library variants such as documentation are never selected.
pub fn select_variant<'a>(
    metadata: &'a ComponentMetadata,
    platform: &Platform,
    scope: Scope,
) -> Result<&'a Variant, ResolveError> {
    let best = metadata
        .variants
        .iter()
        .enumerate()
        .filter(|(_, v)| is_library(v))
        .map(|(i, v)| {
            let rank = (
                platform_rank(platform, v),
                usage_rank(scope, v),
                std::cmp::Reverse(unused_attributes(v)),
                std::cmp::Reverse(i),
            );
            (rank, v)
        })
        .filter(|((platform_rank, ..), _)| *platform_rank > 0)
        .max_by(|(a, _), (b, _)| a.cmp(b));

    match best {
        Some((rank, variant)) => {
            trace!(
                "{}: selected variant {} (platform rank {})",
                metadata.coordinates, variant.name, rank.0
            );
            Ok(variant)
        }
        None => Err(ResolveError::VariantNotFound {
            coordinates: metadata.coordinates.clone(),
            platform: platform.clone(),
            available: metadata.variants.iter().map(|v| v.name.clone()).collect(),
        }),
    }
}
