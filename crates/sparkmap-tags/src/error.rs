//! Tag selection error types.

use thiserror::Error;

/// Errors that can occur during tag catalog and selection operations.
#[derive(Debug, Error)]
pub enum TagsError {
    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] sparkmap_storage::StorageError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The catalog is empty; tags must be seeded before selecting
    #[error("No tags available")]
    NoTagsAvailable,

    /// Tag not found
    #[error("Tag not found: {0}")]
    TagNotFound(String),

    /// No daily selection stored for the date
    #[error("Daily selection not found: {0}")]
    SelectionNotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
