//! Error types for mx.

use std::path::PathBuf;

/// Result type alias using mx Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Error codes for categorizing failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Malformed coordinate, catalog entry or local module reference
    InvalidInput,
    /// No repository had metadata for a module
    MetadataMissing,
    /// No variant matched the requested platform
    VariantMissing,
    /// Downloaded bytes did not match the declared checksum
    ChecksumFailure,
    /// Version conflict resolution failed to converge
    SolverFailure,
    /// Network failure that survived retries
    NetworkFailure,
    /// Metadata could not be parsed
    InvalidMetadata,
    /// The operation was cancelled
    Cancelled,
    /// Invalid configuration
    ConfigError,
    /// Cache read or write failed
    CacheError,
    /// I/O error
    IoError,
}

impl ErrorCode {
    /// Short stable identifier, suitable for machine-readable output.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidInput => "invalid-input",
            ErrorCode::MetadataMissing => "metadata-missing",
            ErrorCode::VariantMissing => "variant-missing",
            ErrorCode::ChecksumFailure => "checksum-failure",
            ErrorCode::SolverFailure => "solver-failure",
            ErrorCode::NetworkFailure => "network-failure",
            ErrorCode::InvalidMetadata => "invalid-metadata",
            ErrorCode::Cancelled => "cancelled",
            ErrorCode::ConfigError => "config-error",
            ErrorCode::CacheError => "cache-error",
            ErrorCode::IoError => "io-error",
        }
    }
}

/// A fix suggestion for an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fix {
    /// Description of what this fix does
    pub description: String,
    /// Command to run, if applicable
    pub command: Option<String>,
}

impl Fix {
    /// Create a fix with just a description.
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            command: None,
        }
    }

    /// Create a fix with a command.
    pub fn with_command(description: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            command: Some(command.into()),
        }
    }
}

/// Structured error type for mx.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("dependency resolution failed: {message}")]
    Resolution {
        message: String,
        code: ErrorCode,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        fixes: Vec<Fix>,
    },

    #[error("configuration error: {message}")]
    Config {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        fixes: Vec<Fix>,
    },

    #[error("cache error: {message}")]
    Cache {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("I/O error: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Get the error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Resolution { code, .. } => *code,
            Error::Config { .. } => ErrorCode::ConfigError,
            Error::Cache { .. } => ErrorCode::CacheError,
            Error::Io { .. } | Error::Other(_) => ErrorCode::IoError,
        }
    }

    /// Get suggested fixes for this error.
    pub fn fixes(&self) -> &[Fix] {
        match self {
            Error::Resolution { fixes, .. } => fixes,
            Error::Config { fixes, .. } => fixes,
            Error::Cache { .. } | Error::Io { .. } | Error::Other(_) => &[],
        }
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            path: None,
            source: None,
            fixes: vec![],
        }
    }

    /// Create a config error with a path.
    pub fn config_at(message: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Error::Config {
            message: message.into(),
            path: Some(path.into()),
            source: None,
            fixes: vec![],
        }
    }

    /// Create an I/O error tied to a path.
    pub fn io(message: impl Into<String>, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            message: message.into(),
            path: Some(path.into()),
            source,
        }
    }
}
