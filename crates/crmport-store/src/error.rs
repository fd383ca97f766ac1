//! Store error types.

use thiserror::Error;

/// Document store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Storage layer error.
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    /// Document could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Document failed validation on the validated-create path.
    #[error("invalid document for {collection}: {reason}")]
    InvalidDocument {
        /// Target collection.
        collection: String,
        /// Why the document was rejected.
        reason: String,
    },

    /// A unique field value already belongs to another document.
    #[error("unique violation on {collection}.{field}: {value}")]
    UniqueViolation {
        /// Target collection.
        collection: String,
        /// Field carrying the unique constraint.
        field: String,
        /// The conflicting value.
        value: String,
    },

    /// Connection string could not be parsed.
    #[error("invalid connection string: {0}")]
    InvalidConnectionString(String),

    /// The store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store has been closed.
    #[error("store is closed")]
    Closed,
}

impl StoreError {
    /// Whether this error is a unique-constraint violation.
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, StoreError::UniqueViolation { .. })
    }
}
