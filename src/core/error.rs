use thiserror::Error;

use super::state::OperationState;

/// Crate-wide error type for the query-operation protocol.
///
/// `Cancelled` is the only warning-classified variant (SQL state 01000):
/// it aborts a client wait loop like a hard error, but callers may choose
/// to keep using the session afterwards.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Illegal operation state transition from {from} to {to}")]
    InvalidTransition {
        from: OperationState,
        to: OperationState,
    },
    #[error("Query was cancelled")]
    Cancelled,
    #[error("Query timed out after {seconds} seconds")]
    Timeout { seconds: u64 },
    #[error("{message}")]
    Execution {
        message: String,
        sql_state: String,
        error_code: i32,
    },
    #[error("Unknown query")]
    UnknownQuery,
    #[error("The fetch type {0} is not supported for this resultset")]
    UnsupportedOrientation(String),
    #[error("Method not supported: {0}")]
    UnsupportedOperation(String),
    #[error("Method {0}() failed. The statement has been closed or cancelled")]
    ClosedOrCancelled(String),
    #[error("Can't {0} after statement has been closed")]
    StatementClosed(String),
}

impl QueryError {
    /// SQLSTATE code associated with this error, when one is defined.
    #[must_use]
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            Self::Transport(_) => Some("08S01"),
            Self::Cancelled => Some("01000"),
            Self::UnknownQuery => Some("HY000"),
            Self::UnsupportedOrientation(_) => Some("HY106"),
            Self::Execution { sql_state, .. } => Some(sql_state),
            _ => None,
        }
    }

    /// Numeric vendor error code, when the server supplied one.
    #[must_use]
    pub const fn error_code(&self) -> Option<i32> {
        match self {
            Self::Execution { error_code, .. } => Some(*error_code),
            _ => None,
        }
    }

    /// Warning-classified errors abort a wait loop but are not fatal to
    /// the session.
    #[must_use]
    pub const fn is_warning(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_is_warning_class() {
        let err = QueryError::Cancelled;
        assert!(err.is_warning());
        assert_eq!(err.sql_state(), Some("01000"));
    }

    #[test]
    fn test_execution_error_carries_server_fields() {
        let err = QueryError::Execution {
            message: "division by zero".to_string(),
            sql_state: "22012".to_string(),
            error_code: 1,
        };
        assert!(!err.is_warning());
        assert_eq!(err.sql_state(), Some("22012"));
        assert_eq!(err.error_code(), Some(1));
        assert_eq!(err.to_string(), "division by zero");
    }

    #[test]
    fn test_orientation_error_sql_state() {
        let err = QueryError::UnsupportedOrientation("FETCH_FIRST".to_string());
        assert_eq!(err.sql_state(), Some("HY106"));
    }
}
