//! Filter Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction. Every variant names the clause the caller wrote so the
//! message alone is enough to find the mistake.

use derive_more::{Display, Error};

/// A filter error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for filter operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// All of these are caller mistakes: fix the expression, don't retry it.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The filter expression could not be tokenized or parsed.
    #[display("invalid filter clause `{clause}`: {reason}")]
    Filter { clause: String, reason: String },
    /// A sort clause is empty or has an unknown direction.
    #[display("invalid sort clause `{_0}`")]
    Sort(#[error(not(source))] String),
    /// The limit/offset is not a non-negative integer.
    #[display("invalid limit `{_0}`")]
    Limit(#[error(not(source))] String),
    /// The projection field list could not be parsed.
    #[display("invalid field list `{_0}`")]
    Fields(#[error(not(source))] String),
    /// A clause refers to a field the record does not have.
    #[display("unknown field `{_0}`")]
    UnknownField(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }

    /// The clause the error refers to.
    pub fn clause(&self) -> &str {
        match self {
            Self::Filter { clause, .. } => clause,
            Self::Sort(clause) | Self::Limit(clause) | Self::Fields(clause) | Self::UnknownField(clause) => clause,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_display() {
        let err = ErrorKind::Filter { clause: "size >".to_string(), reason: "expected a value".to_string() };
        assert_eq!(err.to_string(), "invalid filter clause `size >`: expected a value");
        assert_eq!(ErrorKind::Sort("name:up".to_string()).to_string(), "invalid sort clause `name:up`");
        assert_eq!(ErrorKind::UnknownField("colour".to_string()).clause(), "colour");
    }
}
