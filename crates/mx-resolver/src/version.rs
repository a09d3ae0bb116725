//! Maven version ordering.
//!
//! Versions split on `.`. Each segment is a leading number (possibly absent)
//! followed by a qualifier. Segments compare:
//!
//! 1. by number, with an absent number below any number;
//! 2. a segment without qualifier above the same number with one
//!    (`1.0` > `1.0-M1`);
//! 3. qualifiers lexicographically.
//!
//! Missing trailing segments count as `0`. Versions that are still equal are
//! ordered by their full strings, so `1.0` < `1.0.0` and the order is total.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Segment {
    number: Option<u64>,
    qualifier: String,
}

static ZERO: Segment = Segment {
    number: Some(0),
    qualifier: String::new(),
};

impl Segment {
    fn parse(s: &str) -> Self {
        let digits = s.bytes().take_while(u8::is_ascii_digit).count();
        match s[..digits].parse::<u64>() {
            Ok(n) if digits > 0 => Segment {
                number: Some(n),
                qualifier: s[digits..].to_string(),
            },
            _ => Segment {
                number: None,
                qualifier: s.to_string(),
            },
        }
    }
}

impl Ord for Segment {
    fn cmp(&self, other: &Self) -> Ordering {
        self.number
            .cmp(&other.number)
            .then_with(|| self.qualifier.is_empty().cmp(&other.qualifier.is_empty()))
            .then_with(|| self.qualifier.cmp(&other.qualifier))
    }
}

impl PartialOrd for Segment {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A Maven version string with a total order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct MavenVersion {
    raw: String,
    segments: Vec<Segment>,
}

impl MavenVersion {
    /// Create a version from its string form. Any string is accepted.
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let segments = raw.split('.').map(Segment::parse).collect();
        Self { raw, segments }
    }

    /// The version exactly as written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether any segment carries a qualifier (`-M1`, `-SNAPSHOT`, `RC1`).
    pub fn is_qualified(&self) -> bool {
        self.segments.iter().any(|s| !s.qualifier.is_empty())
    }
}

impl From<String> for MavenVersion {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<MavenVersion> for String {
    fn from(v: MavenVersion) -> Self {
        v.raw
    }
}

impl FromStr for MavenVersion {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl fmt::Display for MavenVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Ord for MavenVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.segments.len().max(other.segments.len());
        for i in 0..len {
            let a = self.segments.get(i).unwrap_or(&ZERO);
            let b = other.segments.get(i).unwrap_or(&ZERO);
            match a.cmp(b) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        self.raw.cmp(&other.raw)
    }
}

impl PartialOrd for MavenVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Equality agrees with `cmp`: only identical strings compare equal.
impl PartialEq for MavenVersion {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for MavenVersion {}

impl Hash for MavenVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

/// Pick the highest of a set of version strings.
pub fn max_version<'a>(versions: impl IntoIterator<Item = &'a str>) -> Option<&'a str> {
    versions
        .into_iter()
        .max_by(|a, b| MavenVersion::new(*a).cmp(&MavenVersion::new(*b)))
}
