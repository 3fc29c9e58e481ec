//! Error types for the ingestion pipeline

use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failure category reported for a single file or a side operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Extraction,
    Artifact,
    ConfigExport,
    Sync,
    LedgerPersist,
    Other,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "ValidationError",
            ErrorKind::Extraction => "ExtractionError",
            ErrorKind::Artifact => "ArtifactError",
            ErrorKind::ConfigExport => "ConfigExportError",
            ErrorKind::Sync => "SyncError",
            ErrorKind::LedgerPersist => "LedgerPersistError",
            ErrorKind::Other => "Error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ingestion error type
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Validation failed for {path}: {reason}")]
    Validation { path: PathBuf, reason: String },

    #[error("Metadata extraction failed for {path}: {source}")]
    Extraction {
        path: PathBuf,
        #[source]
        source: SdkError,
    },

    #[error("Failed to write report {path}: {source}")]
    Artifact {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Config export failed for {path}: {reason}")]
    ConfigExport { path: PathBuf, reason: String },

    #[error("Sync step '{step}' failed: {reason}")]
    Sync { step: String, reason: String },

    #[error("Failed to persist ledger {path}: {source}")]
    LedgerPersist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML write error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Config error: {0}")]
    Config(String),
}

impl IngestError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IngestError::Validation { .. } => ErrorKind::Validation,
            IngestError::Extraction { .. } => ErrorKind::Extraction,
            IngestError::Artifact { .. } => ErrorKind::Artifact,
            IngestError::ConfigExport { .. } => ErrorKind::ConfigExport,
            IngestError::Sync { .. } => ErrorKind::Sync,
            IngestError::LedgerPersist { .. } => ErrorKind::LedgerPersist,
            _ => ErrorKind::Other,
        }
    }

    pub(crate) fn validation(path: &std::path::Path, reason: impl Into<String>) -> Self {
        IngestError::Validation {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }
}

/// Errors reported by a metadata provider
#[derive(Error, Debug)]
pub enum SdkError {
    #[error("could not open dataset: {0}")]
    Open(String),

    #[error("acquisition is incomplete (dataset not initialized correctly)")]
    Incomplete,

    #[error("extraction timed out after {0}s")]
    Timeout(u64),

    #[error("malformed metadata: {0}")]
    Malformed(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, IngestError>;
