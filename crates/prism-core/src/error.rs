//! Error types for prism-core

use thiserror::Error;

/// Errors that can occur when validating core data types
#[derive(Error, Debug)]
pub enum CoreError {
    /// Chunk failed its structural invariants
    #[error("Invalid chunk '{id}': {reason}")]
    InvalidChunk { id: String, reason: String },

    /// Embedding has the wrong dimension for its store
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Result type for prism-core operations
pub type Result<T> = std::result::Result<T, CoreError>;
