// src/error.rs

//! Crate-wide error type
//!
//! Only [`Error::ConsistencyError`] is allowed to escalate past the component
//! that detects it. Every other kind is contained by its caller and reduced to
//! a skipped artifact or a failed package plus a log record.

use thiserror::Error;

/// Errors produced while resolving and packaging modules
#[derive(Error, Debug)]
pub enum Error {
    /// The metadata reader could not parse a module
    #[error("Failed to read module '{path}': {reason}")]
    ReadError { path: String, reason: String },

    /// No canonical version could be derived for a module
    #[error("Version is not resolvable: {0}")]
    VersionNotResolvable(String),

    /// A reference edge exhausted every resolution rule
    #[error("Unable to resolve dependency {name}-{version} required by {required_by}")]
    DependencyUnresolved {
        name: String,
        version: String,
        required_by: String,
    },

    /// The persisted conflict set and artifact table have diverged
    #[error("Cache consistency failure: {0}")]
    ConsistencyError(String),

    /// API diff or usage analysis failed
    #[error("API analysis failed: {0}")]
    AnalysisError(String),

    /// Filesystem failure
    #[error("I/O error: {0}")]
    IoError(String),

    /// Malformed version, identity or persisted record
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Invalid settings or configuration file
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Package index request failed
    #[error("Download error: {0}")]
    DownloadError(String),
}

impl Error {
    /// Whether this error must abort the whole run
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::ConsistencyError(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IoError(err.to_string())
    }
}

impl From<regex::Error> for Error {
    fn from(err: regex::Error) -> Self {
        Error::ConfigError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
