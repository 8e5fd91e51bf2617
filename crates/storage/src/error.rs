//! Storage Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction. Every variant carries the path, key or clause it refers
//! to so the message alone says what failed where.

use derive_more::{Display, Error};
use ferry_config::error::Error as ConfigError;
use ferry_filter::Error as FilterError;

/// A storage error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Path contains invalid characters or escapes the root.
    #[display("invalid path: {_0}")]
    InvalidPath(#[error(not(source))] String),
    /// The operation needs a path below the root.
    #[display("the path must not be empty")]
    EmptyPath,
    /// The operation needs a directory path (ending in `/`).
    #[display("not a directory: {_0}")]
    NotADirectory(#[error(not(source))] String),
    /// The operation needs a file path (not ending in `/`).
    #[display("not a file: {_0}")]
    NotAFile(#[error(not(source))] String),
    #[display("not found: {_0}")]
    NotFound(#[error(not(source))] String),
    /// Connector specifications are missing or invalid.
    #[display("invalid specifications: {_0}")]
    Specification(#[error(not(source))] String),
    /// The fields, filter, sort or limit could not be used.
    #[display("invalid query: {_0}")]
    FilterExpression(#[error(not(source))] String),
    #[display("already exists: {_0}")]
    AlreadyExists(#[error(not(source))] String),
    /// The connector does not implement this operation.
    #[display("operation not supported: {_0}")]
    NotSupported(#[error(not(source))] String),
    /// A single row of a transfer could not be prepared or transmitted.
    #[display("transfer failed for `{key}`: {reason}")]
    TransferRow { key: String, reason: String },
    /// The backend behind the connector failed (I/O, network, lock poisoning).
    #[display("backend unavailable: {_0}")]
    BackendUnavailable(#[error(not(source))] String),
    /// A transfer package is malformed (e.g. duplicate row keys).
    #[display("invalid transfer package: {_0}")]
    InvalidPackage(#[error(not(source))] String),
    #[display("operation cancelled")]
    Cancelled,
}

impl ErrorKind {
    /// Convert a filter error into a storage error, preserving the filter
    /// crate's `Exn` frame as a child in its own error tree.
    #[track_caller]
    pub fn filter(err: FilterError) -> Error {
        let message = (*err).to_string();
        err.raise(ErrorKind::FilterExpression(message))
    }

    /// Convert a configuration error into a storage error, preserving the
    /// config crate's `Exn` frame as a child.
    #[track_caller]
    pub fn specification(err: ConfigError) -> Error {
        let message = (*err).to_string();
        err.raise(ErrorKind::Specification(message))
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::BackendUnavailable(_))
    }

    /// Path and validation errors, raised before any backend call.
    pub fn is_path_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidPath(_) | Self::EmptyPath | Self::NotADirectory(_) | Self::NotAFile(_) | Self::NotFound(_)
        )
    }
}

/// Map an I/O failure on `path` onto the storage taxonomy.
///
/// `NotFound` stays `NotFound`, everything else is the backend being
/// unavailable. The original I/O error is kept as a child.
#[track_caller]
pub(crate) fn io_error(err: std::io::Error, path: &str) -> Error {
    use std::io::ErrorKind as IoErrorKind;
    let kind = match err.kind() {
        IoErrorKind::NotFound => ErrorKind::NotFound(path.to_string()),
        IoErrorKind::AlreadyExists => ErrorKind::AlreadyExists(path.to_string()),
        _ => ErrorKind::BackendUnavailable(path.to_string()),
    };
    exn::Exn::from(err).raise(kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_carry_context() {
        assert_eq!(ErrorKind::NotFound("bucket/a.txt".into()).to_string(), "not found: bucket/a.txt");
        assert_eq!(ErrorKind::EmptyPath.to_string(), "the path must not be empty");
        assert!(ErrorKind::BackendUnavailable("bucket/".into()).is_retryable());
        assert!(!ErrorKind::NotSupported("update".into()).is_retryable());
    }

    #[test]
    fn test_filter_errors_keep_clause() {
        let err = ferry_filter::FilterEngine::new(&ferry_filter::FilterSpec {
            sort: Some("size:sideways".into()),
            ..Default::default()
        })
        .unwrap_err();
        let err = ErrorKind::filter(err);
        assert_eq!(*err, ErrorKind::FilterExpression("invalid sort clause `size:sideways`".into()));
    }

    #[test]
    fn test_io_error_mapping() {
        let missing = std::io::Error::from(std::io::ErrorKind::NotFound);
        assert_eq!(*io_error(missing, "a/b.txt"), ErrorKind::NotFound("a/b.txt".into()));
        let denied = std::io::Error::from(std::io::ErrorKind::PermissionDenied);
        assert_eq!(*io_error(denied, "a/b.txt"), ErrorKind::BackendUnavailable("a/b.txt".into()));
    }
}
