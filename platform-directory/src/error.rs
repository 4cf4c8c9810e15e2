//! Error types for directory operations
//!
//! This module defines the errors surfaced by the directory façade and by the
//! storage collaborator it drives.

use platform_org::DecodeError;
use thiserror::Error;
use uuid::Uuid;

/// Storage collaborator errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A write precondition failed (stale version, duplicate key)
    #[error("Write conflict: {0}")]
    Conflict(String),

    /// The backend itself failed
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Directory error types.
///
/// `ParentNotFound`, `Cycle`, `NotFound`, `Validation` and `SubtreeTooLarge`
/// are caller errors and are never retried. `ConcurrentModification` is
/// transient. `Decode` means stored paths are corrupt.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// Referenced parent is missing or tombstoned
    #[error("Invalid parent: organization {0} does not exist")]
    ParentNotFound(Uuid),

    /// The move would make a node its own ancestor
    #[error("Cannot move organization {node} under {parent}: would create a cycle")]
    Cycle {
        /// Node being moved
        node: Uuid,
        /// Requested parent
        parent: Uuid,
    },

    /// Lock contention or stale version on a structural change
    #[error("Concurrent modification: {0}")]
    ConcurrentModification(String),

    /// Stored path data could not be decoded
    #[error("Corrupted path data: {0}")]
    Decode(#[from] DecodeError),

    /// The organization does not exist (or is tombstoned)
    #[error("Organization not found: {0}")]
    NotFound(Uuid),

    /// The subtree exceeds the configured rewrite bound
    #[error("Subtree of {size} organizations exceeds the limit of {limit}")]
    SubtreeTooLarge {
        /// Rows that would be rewritten
        size: usize,
        /// Configured maximum
        limit: usize,
    },

    /// Invalid attributes
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Storage failure
    #[error("Storage error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for DirectoryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(reason) => DirectoryError::ConcurrentModification(reason),
            other => DirectoryError::Store(other),
        }
    }
}

/// Result type for directory operations.
pub type DirectoryResult<T> = Result<T, DirectoryError>;

impl DirectoryError {
    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DirectoryError::ConcurrentModification(_))
    }

    /// Check if this error should be logged at error level.
    pub fn is_server_error(&self) -> bool {
        matches!(self, DirectoryError::Decode(_) | DirectoryError::Store(_))
    }

    /// Get HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            DirectoryError::ParentNotFound(_)
            | DirectoryError::Cycle { .. }
            | DirectoryError::Validation(_) => 422,

            DirectoryError::NotFound(_) => 404,
            DirectoryError::ConcurrentModification(_) => 409,
            DirectoryError::SubtreeTooLarge { .. } => 413,

            DirectoryError::Decode(_) | DirectoryError::Store(_) => 500,
        }
    }

    /// Get error code for API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            DirectoryError::ParentNotFound(_) => "PARENT_NOT_FOUND",
            DirectoryError::Cycle { .. } => "CYCLE_DETECTED",
            DirectoryError::ConcurrentModification(_) => "CONCURRENT_MODIFICATION",
            DirectoryError::Decode(_) => "INTERNAL_ERROR",
            DirectoryError::NotFound(_) => "NOT_FOUND",
            DirectoryError::SubtreeTooLarge { .. } => "SUBTREE_TOO_LARGE",
            DirectoryError::Validation(_) => "VALIDATION_ERROR",
            DirectoryError::Store(_) => "STORAGE_ERROR",
        }
    }
}
