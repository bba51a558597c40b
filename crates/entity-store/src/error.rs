use thiserror::Error;

use crate::Version;

/// Errors that can occur when interacting with the entity store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The expected version did not match the stored version.
    ///
    /// Version 0 means "does not exist": an `actual` of 0 is a missing
    /// record, an `expected` of 0 is a failed create-if-new.
    #[error("version conflict for {kind}/{id}: expected version {expected}, found {actual}")]
    VersionConflict {
        kind: String,
        id: String,
        expected: Version,
        actual: Version,
    },

    /// A database error occurred.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A serialization/deserialization error occurred.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Returns true if this error is a version conflict, the signal for
    /// load-mutate-save loops to reload and retry.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::VersionConflict { .. })
    }
}

/// Result type for entity store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
