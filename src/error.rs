use thiserror::Error;

use crate::provider::BackendKind;

/// Error type for dbexec operations
#[derive(Debug, Error)]
pub enum DbExecError {
    #[error("Unsupported backend: {0}")]
    UnsupportedBackend(String),

    #[error("Command construction failed: {0}")]
    CommandConstruction(String),

    #[error("Connection to {backend} failed: {message}")]
    ConnectionFailed { backend: BackendKind, message: String },

    #[error("Execution on {backend} failed: {message}")]
    ExecutionFailed { backend: BackendKind, message: String },

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Expected {expected} row(s), got {actual}")]
    UnexpectedRowCount { expected: usize, actual: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl DbExecError {
    pub(crate) fn connection(backend: BackendKind, message: impl ToString) -> Self {
        DbExecError::ConnectionFailed {
            backend,
            message: message.to_string(),
        }
    }

    pub(crate) fn execution(backend: BackendKind, message: impl ToString) -> Self {
        DbExecError::ExecutionFailed {
            backend,
            message: message.to_string(),
        }
    }
}

/// Result type alias for dbexec operations
pub type Result<T> = std::result::Result<T, DbExecError>;
