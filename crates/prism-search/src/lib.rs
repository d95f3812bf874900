//! PRISM Search - Vector retrieval, embeddings, quota, and relevance scoring
//!
//! This crate provides the shared services of the PRISM query pipeline:
//!
//! - **Vector store**: in-memory chunk + embedding store with exact cosine
//!   top-K search and pre-ranking filters
//! - **Embedding client**: primary + fallback provider chain (Cloudflare
//!   Workers AI, deterministic local embedder) with batching and
//!   daily-quota gating
//! - **Budget tracker**: per-day neuron quota resetting at UTC midnight
//! - **Scoring service**: weighted aggregation of pluggable feature scorers
//!   with a TTL/LRU result cache and bounded batch parallelism
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use prism_config::PrismConfig;
//! use prism_search::{BudgetTracker, EmbeddingClient, ScoringService, VectorStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), prism_search::SearchError> {
//!     let config = PrismConfig::default();
//!     let store = Arc::new(VectorStore::new(config.embedding.dimension));
//!     let budget = Arc::new(BudgetTracker::new(&config.budget));
//!     let client = EmbeddingClient::from_config(&config.embedding, budget)?;
//!     let scoring = ScoringService::with_default_scorers(store.clone(), &config.scoring)?;
//!     Ok(())
//! }
//! ```

pub mod budget;
pub mod embeddings;
pub mod error;
pub mod scoring;
pub mod store;

// Re-exports for convenience
pub use budget::{BudgetStats, BudgetTracker};
pub use embeddings::{
    create_fallback, create_provider, validate_dimension, CloudflareConfig, CloudflareProvider,
    EmbeddingClient, EmbeddingProvider, LocalProvider, ProviderKind, ProviderStatus,
};
pub use error::{Result, SearchError};
pub use scoring::{CustomScorerFn, Scorer, ScoringMetrics, ScoringService};
pub use store::{
    cosine_similarity, SearchOptions, SearchResult, StoreStats, VectorStore,
};
