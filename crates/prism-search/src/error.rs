//! Error types for prism-search
//!
//! The variants map onto the error taxonomy surfaced to callers:
//! `InvalidQuery`, `EmbeddingFailed`, `VectorStore`, `ScoringFailed`, and
//! `Cancelled`. Provider-level variants (`ProviderUnavailable`,
//! `ProviderAuth`, `ProviderRateLimit`) exist so the embedding client can
//! distinguish retryable transport failures from terminal ones before
//! collapsing them into `EmbeddingFailed`.

use thiserror::Error;

/// Errors that can occur in prism-search operations
#[derive(Error, Debug)]
pub enum SearchError {
    /// Empty or oversize input, or a query vector of the wrong dimension
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Embedding dimension mismatch
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// All providers failed, or the daily neuron quota is exhausted
    #[error("Embedding failed: {0}")]
    EmbeddingFailed(String),

    /// Embedding provider unavailable (timeout, connection refused)
    #[error("Embedding provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Provider authentication failed
    #[error("Provider authentication failed: {0}")]
    ProviderAuth(String),

    /// Provider rate limited
    #[error("Provider rate limited, retry after {retry_after:?} seconds")]
    ProviderRateLimit { retry_after: Option<u64> },

    /// Vector store backend failure
    #[error("Vector store error: {0}")]
    VectorStore(String),

    /// Non-empty batch submitted with no scorers registered
    #[error("Scoring failed: {0}")]
    ScoringFailed(String),

    /// External cancellation; not logged as an error
    #[error("Operation cancelled")]
    Cancelled,

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SearchError {
    /// Whether the caller may retry the operation without correcting input.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            SearchError::ProviderUnavailable(_) | SearchError::ProviderRateLimit { .. }
        )
    }
}

/// Result type for prism-search operations
pub type Result<T> = std::result::Result<T, SearchError>;
