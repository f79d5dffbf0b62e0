//! Concept graph error types.

use thiserror::Error;

/// Errors that can occur during graph and cluster operations.
#[derive(Debug, Error)]
pub enum GraphError {
    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] sparkmap_storage::StorageError),

    /// A link referenced a concept name that has no node
    #[error("Concept not found: {0}")]
    ConceptNotFound(String),

    /// Cluster not found
    #[error("Cluster not found: {0}")]
    ClusterNotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The concept extraction collaborator failed
    #[error("Extraction error: {0}")]
    Extraction(String),
}
