//! Configuration Error Types

use derive_more::{Display, Error};

/// A configuration error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The configuration file does not exist.
    #[display("configuration file not found: {_0}")]
    NotFound(#[error(not(source))] String),
    /// The file extension doesn't name a supported format.
    #[display("unsupported configuration format: {_0}")]
    UnsupportedFormat(#[error(not(source))] String),
    /// The merged configuration could not be parsed into shape.
    #[display("invalid configuration: {_0}")]
    Invalid(#[error(not(source))] String),
    /// No connector is configured under this name.
    #[display("unknown connector `{_0}`")]
    UnknownConnector(#[error(not(source))] String),
    /// A required specification field is absent.
    #[display("missing specification `{_0}`")]
    MissingSpecification(#[error(not(source))] String),
    /// A required specification field is present but blank.
    #[display("specification `{_0}` must not be empty")]
    EmptySpecification(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
