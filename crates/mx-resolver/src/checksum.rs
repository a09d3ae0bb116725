//! Artifact integrity checks.

use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use std::fmt;
use std::io;
use std::path::Path;

/// Supported checksum algorithms, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HashAlgorithm {
    Sha512,
    Sha256,
    Sha1,
}

impl HashAlgorithm {
    /// Sidecar files looked up when the metadata carries no checksum.
    pub const SIDECARS: [HashAlgorithm; 2] = [HashAlgorithm::Sha256, HashAlgorithm::Sha1];

    /// Sidecar file extension, e.g. `sha256` for `lib-1.0.jar.sha256`.
    pub fn extension(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha512 => "sha512",
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha1 => "sha1",
        }
    }

    /// Lowercase hex digest of `bytes`.
    pub fn digest(&self, bytes: &[u8]) -> String {
        match self {
            HashAlgorithm::Sha512 => format!("{:x}", Sha512::digest(bytes)),
            HashAlgorithm::Sha256 => format!("{:x}", Sha256::digest(bytes)),
            HashAlgorithm::Sha1 => format!("{:x}", Sha1::digest(bytes)),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// An expected checksum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checksum {
    pub algorithm: HashAlgorithm,
    pub value: String,
}

impl Checksum {
    pub fn new(algorithm: HashAlgorithm, value: impl AsRef<str>) -> Self {
        Self {
            algorithm,
            value: value.as_ref().trim().to_ascii_lowercase(),
        }
    }

    /// Parse the contents of a sidecar file.
    ///
    /// Sidecars hold either the bare hash or `hash  filename`; only the first
    /// token is used. Returns `None` for an empty file.
    pub fn from_sidecar(algorithm: HashAlgorithm, contents: &str) -> Option<Self> {
        let hash = contents.split_whitespace().next()?;
        Some(Self::new(algorithm, hash))
    }

    /// Compare against `bytes`, returning the actual digest on mismatch.
    pub fn verify(&self, bytes: &[u8]) -> Result<(), String> {
        let actual = self.algorithm.digest(bytes);
        if actual == self.value {
            Ok(())
        } else {
            Err(actual)
        }
    }
}

/// Lowercase hex SHA-256 of a byte slice.
pub fn sha256_hex(bytes: &[u8]) -> String {
    HashAlgorithm::Sha256.digest(bytes)
}

/// Lowercase hex SHA-256 of a file.
pub fn compute_file_sha256(path: &Path) -> io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Path of the `.sha256` sidecar stored next to a cached file.
pub fn sidecar_path(path: &Path) -> std::path::PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".sha256");
    path.with_file_name(name)
}
