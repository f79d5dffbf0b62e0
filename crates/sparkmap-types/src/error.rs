//! Error types shared across Sparkmap crates.

use thiserror::Error;

/// Errors raised while loading settings or decoding shared records.
#[derive(Debug, Error)]
pub enum SparkmapError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid input error
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
