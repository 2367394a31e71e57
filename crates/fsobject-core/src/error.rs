//! Error types for storage object operations.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result alias used across fsobject.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur while operating on storage objects.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The path is malformed, of the wrong kind, or rooted where a relative
    /// path was required.
    #[error("Invalid path {path}: {reason}")]
    PathValidation { path: PathBuf, reason: String },

    /// The path, or a named child, does not exist.
    #[error("Path not found: {path}")]
    NotFound { path: PathBuf },

    /// The destination exists and overwrite was not requested.
    #[error("Destination already exists: {path}")]
    AlreadyExists { path: PathBuf },

    /// I/O failure involving a single path.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// I/O failure while transferring between two paths.
    #[error("I/O error transferring {from} -> {to}: {source}")]
    IoPair {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The object was disposed (explicitly or by deletion).
    #[error("Object has been disposed")]
    Disposed,

    /// The operation observed its cancellation signal.
    #[error("Operation cancelled: {path}")]
    Cancelled { path: PathBuf },

    /// A tree-wide operation finished with per-item failures.
    #[error("{} of the items under {path} failed", failures.len())]
    Aggregate {
        path: PathBuf,
        failures: Vec<OperationError>,
    },

    /// The change monitor could not be started.
    #[error("Cannot watch {path}: {message}")]
    Watch { path: PathBuf, message: String },

    /// A polling helper gave up.
    #[error("Timed out after {waited:?} waiting for {path}")]
    Timeout { path: PathBuf, waited: Duration },
}

impl StorageError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            std::io::ErrorKind::AlreadyExists => Self::AlreadyExists { path },
            _ => Self::Io { path, source },
        }
    }

    /// Create an I/O error carrying both ends of a transfer.
    ///
    /// `AlreadyExists` is attributed to the destination; everything else keeps
    /// both paths.
    pub fn io_pair(
        from: impl Into<PathBuf>,
        to: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        let to = to.into();
        match source.kind() {
            std::io::ErrorKind::AlreadyExists => Self::AlreadyExists { path: to },
            _ => Self::IoPair {
                from: from.into(),
                to,
                source,
            },
        }
    }

    /// Create a path validation error.
    pub fn invalid(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::PathValidation {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error came from a cancellation signal.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Per-item failures carried by an aggregate error.
    pub fn failures(&self) -> &[OperationError] {
        match self {
            Self::Aggregate { failures, .. } => failures,
            _ => &[],
        }
    }
}

/// A single failed item inside a tree-wide operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationError {
    /// The path that caused the error.
    pub path: PathBuf,
    /// A human-readable error message.
    pub message: String,
}

impl OperationError {
    /// Create a new operation error.
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Record a storage error against the item it happened to.
    pub fn from_error(path: impl Into<PathBuf>, error: &StorageError) -> Self {
        Self::new(path, error.to_string())
    }
}

impl std::fmt::Display for OperationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_maps_not_found() {
        let err = StorageError::io(
            "/test/path",
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        );
        assert!(matches!(err, StorageError::NotFound { .. }));
    }

    #[test]
    fn test_io_pair_attributes_conflict_to_destination() {
        let err = StorageError::io_pair(
            "/a/file",
            "/b/file",
            std::io::Error::new(std::io::ErrorKind::AlreadyExists, "exists"),
        );
        match err {
            StorageError::AlreadyExists { path } => assert_eq!(path, PathBuf::from("/b/file")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_io_pair_keeps_both_paths() {
        let err = StorageError::io_pair(
            "/a/file",
            "/b/file",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let message = err.to_string();
        assert!(message.contains("/a/file"));
        assert!(message.contains("/b/file"));
    }

    #[test]
    fn test_aggregate_message_counts_failures() {
        let err = StorageError::Aggregate {
            path: PathBuf::from("/tree"),
            failures: vec![
                OperationError::new("/tree/a", "boom"),
                OperationError::new("/tree/b", "boom"),
            ],
        };
        assert_eq!(err.failures().len(), 2);
        assert!(err.to_string().starts_with("2 of the items"));
    }
}
