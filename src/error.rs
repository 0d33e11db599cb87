//! Error types for the provider core.

use std::fmt;

use thiserror::Error;

/// Classification of every failure the core can surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    TypeMismatch,
    DuplicateMapping,
    InvalidIdentifier,
    InvalidOperation,
    BuilderClosed,
    ConstraintViolation,
    ConnectionLost,
    Timeout,
    ConnectionUnavailable,
    TransactionAborted,
    ConnectionClosed,
    Config,
    Unknown,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::TypeMismatch => "type-mismatch",
            ErrorKind::DuplicateMapping => "duplicate-mapping",
            ErrorKind::InvalidIdentifier => "invalid-identifier",
            ErrorKind::InvalidOperation => "invalid-operation",
            ErrorKind::BuilderClosed => "builder-closed",
            ErrorKind::ConstraintViolation => "constraint-violation",
            ErrorKind::ConnectionLost => "connection-lost",
            ErrorKind::Timeout => "timeout",
            ErrorKind::ConnectionUnavailable => "connection-unavailable",
            ErrorKind::TransactionAborted => "transaction-aborted",
            ErrorKind::ConnectionClosed => "connection-closed",
            ErrorKind::Config => "config",
            ErrorKind::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

/// Main error type for the provider core.
#[derive(Error, Debug)]
pub enum Error {
    /// Text or value could not be decoded under the claimed column type
    #[error("type mismatch for {column_type}: {message}")]
    TypeMismatch { column_type: String, message: String },

    /// A column type is already mapped to a different native type or store type
    #[error("conflicting mapping for {column_type}: already mapped to {existing}")]
    DuplicateMapping { column_type: String, existing: String },

    #[error("invalid identifier {name:?}: {reason}")]
    InvalidIdentifier { name: String, reason: String },

    /// Operation is missing the columns its kind requires
    #[error("invalid operation on {table}: {reason}")]
    InvalidOperation { table: String, reason: String },

    /// Append or build after the builder produced its batch
    #[error("command batch builder is closed")]
    BuilderClosed,

    /// Server rejected the statement (unique, foreign key, check, not null ...)
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// The session died mid-flight
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// The deadline elapsed before the server answered
    #[error("timeout: {0}")]
    Timeout(String),

    /// The pool could not hand out a session in time
    #[error("connection unavailable: {0}")]
    ConnectionUnavailable(String),

    /// The handle was rolled back; only close, reset or reconnect are allowed
    #[error("transaction aborted; the connection was rolled back")]
    TransactionAborted,

    #[error("connection is closed")]
    ConnectionClosed,

    /// Invalid state transition requested on a connection
    #[error("invalid connection state: {0}")]
    InvalidState(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Unknown(String),
}

impl Error {
    pub fn type_mismatch(column_type: impl fmt::Display, message: impl Into<String>) -> Self {
        Error::TypeMismatch {
            column_type: column_type.to_string(),
            message: message.into(),
        }
    }

    pub fn invalid_identifier(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidIdentifier {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            Error::DuplicateMapping { .. } => ErrorKind::DuplicateMapping,
            Error::InvalidIdentifier { .. } => ErrorKind::InvalidIdentifier,
            Error::InvalidOperation { .. } => ErrorKind::InvalidOperation,
            Error::BuilderClosed => ErrorKind::BuilderClosed,
            Error::ConstraintViolation(_) => ErrorKind::ConstraintViolation,
            Error::ConnectionLost(_) => ErrorKind::ConnectionLost,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::ConnectionUnavailable(_) => ErrorKind::ConnectionUnavailable,
            Error::TransactionAborted => ErrorKind::TransactionAborted,
            Error::ConnectionClosed => ErrorKind::ConnectionClosed,
            Error::InvalidState(_) | Error::Unknown(_) => ErrorKind::Unknown,
            Error::Config(_) => ErrorKind::Config,
        }
    }

    /// Build an error of the given kind from a driver message.
    pub fn from_kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            ErrorKind::TypeMismatch => Error::type_mismatch("value", message),
            ErrorKind::DuplicateMapping => Error::DuplicateMapping {
                column_type: message,
                existing: "unknown".into(),
            },
            ErrorKind::InvalidIdentifier => Error::invalid_identifier(message, "rejected"),
            ErrorKind::InvalidOperation => Error::InvalidOperation {
                table: "unknown".into(),
                reason: message,
            },
            ErrorKind::BuilderClosed => Error::BuilderClosed,
            ErrorKind::ConstraintViolation => Error::ConstraintViolation(message),
            ErrorKind::ConnectionLost => Error::ConnectionLost(message),
            ErrorKind::Timeout => Error::Timeout(message),
            ErrorKind::ConnectionUnavailable => Error::ConnectionUnavailable(message),
            ErrorKind::TransactionAborted => Error::TransactionAborted,
            ErrorKind::ConnectionClosed => Error::ConnectionClosed,
            ErrorKind::Config => Error::Config(message),
            ErrorKind::Unknown => Error::Unknown(message),
        }
    }
}

/// Result type alias for the provider core.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        assert_eq!(Error::BuilderClosed.kind(), ErrorKind::BuilderClosed);
        assert_eq!(
            Error::ConstraintViolation("dup".into()).kind(),
            ErrorKind::ConstraintViolation
        );
        assert_eq!(Error::InvalidState("x".into()).kind(), ErrorKind::Unknown);
    }

    #[test]
    fn from_kind_preserves_kind() {
        for kind in [
            ErrorKind::ConstraintViolation,
            ErrorKind::ConnectionLost,
            ErrorKind::Timeout,
            ErrorKind::Unknown,
        ] {
            assert_eq!(Error::from_kind(kind, "boom").kind(), kind);
        }
    }
}
