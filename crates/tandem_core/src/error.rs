//! Error types for tandem core.

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in the delta model.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An edge record is missing one of its endpoint ids.
    #[error("edge {id} is missing string field `{field}`")]
    MissingEndpoint {
        /// The edge entity id.
        id: String,
        /// The absent or non-string field.
        field: &'static str,
    },

    /// A tracking call carried a payload that is not usable for its
    /// operation (e.g. an insert without data).
    #[error("malformed mutation for {id}: {reason}")]
    MalformedMutation {
        /// The entity id.
        id: String,
        /// What was wrong with the payload.
        reason: String,
    },
}
