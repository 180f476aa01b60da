//! Error types for cursor sessions.

use thiserror::Error;

/// The cursor statement that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorOp {
    Declare,
    Fetch,
    Close,
}

impl std::fmt::Display for CursorOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CursorOp::Declare => write!(f, "declare"),
            CursorOp::Fetch => write!(f, "fetch"),
            CursorOp::Close => write!(f, "close"),
        }
    }
}

/// The transaction primitive that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionOp {
    Begin,
    Commit,
    Rollback,
}

impl std::fmt::Display for TransactionOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionOp::Begin => write!(f, "begin"),
            TransactionOp::Commit => write!(f, "commit"),
            TransactionOp::Rollback => write!(f, "rollback"),
        }
    }
}

/// The main error type for cursor operations.
#[derive(Debug, Error)]
pub enum CursorError {
    /// Requested batch size is below 1. Raised before any SQL is issued.
    #[error("Invalid batch size: {0} (must be > 0)")]
    InvalidBatchSize(i64),

    /// The database rejected a cursor statement.
    #[error("Cursor {op} failed: {message}")]
    Protocol { op: CursorOp, message: String },

    /// The database rejected a transaction primitive.
    #[error("Transaction {op} failed: {message}")]
    Transaction { op: TransactionOp, message: String },

    /// Could not connect to the database.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CursorError {
    /// Create a protocol error for the given cursor statement.
    pub fn protocol(op: CursorOp, message: impl Into<String>) -> Self {
        Self::Protocol {
            op,
            message: message.into(),
        }
    }

    /// Create a transaction error for the given primitive.
    pub fn transaction(op: TransactionOp, message: impl Into<String>) -> Self {
        Self::Transaction {
            op,
            message: message.into(),
        }
    }

    /// True when the database itself rejected a statement.
    pub fn is_database(&self) -> bool {
        matches!(self, Self::Protocol { .. } | Self::Transaction { .. })
    }
}

/// Result type alias for cursor operations.
pub type CursorResult<T> = Result<T, CursorError>;

/// Error from reading records off an open [`Cursor`](crate::session::Cursor).
///
/// Engine failures and mapper failures stay apart: `Mapper` holds exactly
/// the value the mapper returned.
#[derive(Debug)]
pub enum RecordError<E> {
    Cursor(CursorError),
    Mapper(E),
}

impl<E> RecordError<E> {
    /// Convert into a caller error type that accepts both kinds.
    pub fn into_error<T>(self) -> T
    where
        T: From<CursorError> + From<E>,
    {
        match self {
            RecordError::Cursor(err) => <T as From<CursorError>>::from(err),
            RecordError::Mapper(err) => <T as From<E>>::from(err),
        }
    }

    pub fn mapper_error(&self) -> Option<&E> {
        match self {
            RecordError::Mapper(err) => Some(err),
            RecordError::Cursor(_) => None,
        }
    }
}

impl<E> From<CursorError> for RecordError<E> {
    fn from(err: CursorError) -> Self {
        RecordError::Cursor(err)
    }
}

impl<E: std::fmt::Display> std::fmt::Display for RecordError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordError::Cursor(err) => err.fmt(f),
            RecordError::Mapper(err) => err.fmt(f),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for RecordError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RecordError::Cursor(err) => err.source(),
            RecordError::Mapper(err) => err.source(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CursorError::protocol(CursorOp::Declare, "syntax error at or near \"form\"");
        assert_eq!(
            err.to_string(),
            "Cursor declare failed: syntax error at or near \"form\""
        );
        assert!(err.is_database());

        let err = CursorError::InvalidBatchSize(-1);
        assert_eq!(err.to_string(), "Invalid batch size: -1 (must be > 0)");
        assert!(!err.is_database());
    }

    #[derive(Debug, PartialEq)]
    enum AppError {
        Cursor(String),
        BadRow(i64),
    }

    impl From<CursorError> for AppError {
        fn from(err: CursorError) -> Self {
            AppError::Cursor(err.to_string())
        }
    }

    impl From<i64> for AppError {
        fn from(id: i64) -> Self {
            AppError::BadRow(id)
        }
    }

    #[test]
    fn test_record_error_keeps_mapper_value() {
        let err: RecordError<i64> = RecordError::Mapper(7);
        assert_eq!(err.mapper_error(), Some(&7));
        assert_eq!(err.into_error::<AppError>(), AppError::BadRow(7));

        let err: RecordError<i64> = CursorError::InvalidBatchSize(0).into();
        assert_eq!(err.mapper_error(), None);
        assert_eq!(
            err.into_error::<AppError>(),
            AppError::Cursor("Invalid batch size: 0 (must be > 0)".into())
        );
    }

    #[test]
    fn test_record_error_display_is_transparent() {
        let err: RecordError<std::io::Error> = RecordError::Mapper(std::io::Error::other("bad row"));
        assert_eq!(err.to_string(), "bad row");
    }
}
