//! Transfer Error Types
//!
//! Fatal errors only: a row that fails on either side is recorded in the
//! report instead. The storage error that caused the failure is kept as a
//! child in the error tree, and its kind is copied into the variant.

use derive_more::{Display, Error};
use ferry_storage::Connector;
use ferry_storage::error::{Error as StorageError, ErrorKind as StorageErrorKind};

/// A transfer error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for transfer operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The source could not start or continue preparing rows.
    #[display("could not prepare `{path}` on {connector}: {cause}")]
    Prepare {
        connector: String,
        path: String,
        #[error(not(source))]
        cause: StorageErrorKind,
    },
    /// The destination refused the package as a whole.
    #[display("could not transmit to `{path}` on {connector}: {cause}")]
    Transmit {
        connector: String,
        path: String,
        #[error(not(source))]
        cause: StorageErrorKind,
    },
}

impl ErrorKind {
    #[track_caller]
    pub(crate) fn prepare(connector: &dyn Connector, path: &str, err: StorageError) -> Error {
        let cause = (*err).clone();
        err.raise(ErrorKind::Prepare { connector: connector.name().to_string(), path: path.to_string(), cause })
    }

    #[track_caller]
    pub(crate) fn transmit(connector: &dyn Connector, path: &str, err: StorageError) -> Error {
        let cause = (*err).clone();
        err.raise(ErrorKind::Transmit { connector: connector.name().to_string(), path: path.to_string(), cause })
    }

    /// The storage error behind this one.
    pub fn cause(&self) -> &StorageErrorKind {
        match self {
            Self::Prepare { cause, .. } | Self::Transmit { cause, .. } => cause,
        }
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        self.cause().is_retryable()
    }
}
