//! PRISM Core - Data model and token estimation
//!
//! This crate provides the shared vocabulary of the PRISM pipeline:
//!
//! - [`CodeChunk`] - the unit of retrieval, produced by an external parser
//! - [`Language`] - fixed language lexicon with an `Unknown` fallback
//! - [`RelevanceScore`] / [`ScoredChunk`] - ranking output of the scoring service
//! - [`ScoringContext`] / [`QueryEmbedding`] - per-query inputs to scoring
//! - [`TokenCounter`] - deterministic token estimation for budget arithmetic
//!
//! Everything here is plain data with no I/O; the heavier services live in
//! `prism-search` and `prism-optimizer`.

pub mod chunk;
pub mod error;
pub mod score;
pub mod tokens;

// Re-exports for convenience
pub use chunk::{CodeChunk, Language};
pub use error::{CoreError, Result};
pub use score::{QueryEmbedding, RelevanceScore, ScoredChunk, ScoringContext};
pub use tokens::TokenCounter;
