use std::path::PathBuf;

use thiserror::Error;

/// Depth-column reconstruction failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DepthError {
    #[error("Inconsistent depth columns: {column} has {found} rows, expected {expected}")]
    InconsistentDepth {
        column: &'static str,
        expected: usize,
        found: usize,
    },
}

/// Profile merge failures. Recoverable: the caller keeps its base profile.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MergeError {
    #[error("Core identity mismatch: cannot merge '{incoming}' into '{base}'")]
    CoreIdentityMismatch { base: String, incoming: String },
}

/// Per-workbook import failures. Each one fails a single core, never a batch.
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Workbook not found: {0}")]
    MissingFile(PathBuf),

    #[error("Unreadable workbook: {0}")]
    Workbook(#[from] calamine::Error),

    #[error("Sheet not found: {0}")]
    MissingSheet(String),

    #[error("Missing metadata: {0}")]
    MissingMetadata(String),

    #[error("Invalid schema version: {0}")]
    Version(#[from] semver::Error),

    #[error("Schema version {found} is older than the oldest supported version {minimum}")]
    VersionTooOld {
        found: semver::Version,
        minimum: semver::Version,
    },

    #[error("Migration from {from} failed: {reason}")]
    Migration {
        from: semver::Version,
        reason: String,
    },

    #[error(transparent)]
    Depth(#[from] DepthError),
}

#[derive(Error, Debug)]
pub enum IceError {
    #[error(transparent)]
    Depth(#[from] DepthError),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Import(#[from] ImportError),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("{0}")]
    General(String),
}

#[cfg(feature = "python")]
impl From<IceError> for pyo3::PyErr {
    fn from(err: IceError) -> pyo3::PyErr {
        pyo3::exceptions::PyRuntimeError::new_err(err.to_string())
    }
}

#[cfg(feature = "python")]
impl From<pyo3::PyErr> for IceError {
    fn from(err: pyo3::PyErr) -> Self {
        IceError::General(err.to_string())
    }
}
