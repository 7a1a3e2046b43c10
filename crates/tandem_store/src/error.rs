//! Error types for the store boundary.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by a primary or secondary store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached or refused the operation.
    #[error("store unavailable: {message}")]
    Unavailable {
        /// Error message.
        message: String,
        /// Whether retrying the operation may succeed.
        retryable: bool,
    },

    /// A statement violated a store constraint (e.g. duplicate row id).
    #[error("constraint violation: {0}")]
    Constraint(String),

    /// A row targeted by the operation does not exist.
    #[error("row not found: {0}")]
    RowNotFound(String),

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Creates a retryable unavailability error (lock contention, transient
    /// I/O failure).
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable unavailability error.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if retrying the failed operation may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Unavailable { retryable, .. } => *retryable,
            StoreError::Io(_) => true,
            StoreError::Constraint(_) | StoreError::RowNotFound(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(StoreError::unavailable("locked").is_retryable());
        assert!(!StoreError::fatal("corrupt").is_retryable());
        assert!(!StoreError::Constraint("duplicate id".into()).is_retryable());
        assert!(!StoreError::RowNotFound("n1".into()).is_retryable());
    }

    #[test]
    fn error_display() {
        let err = StoreError::unavailable("database is locked");
        assert_eq!(err.to_string(), "store unavailable: database is locked");
    }
}
