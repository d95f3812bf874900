//! PRISM Optimizer - Intent detection, selection, compression, and prompt
//! reconstruction
//!
//! The final stage of the PRISM pipeline: given scored candidate chunks and
//! a token budget, produce a prompt that fits the budget while keeping the
//! fragments a model most needs.
//!
//! - [`IntentDetector`] - rule-based query classification and entity
//!   extraction
//! - [`ChunkSelector`] - greedy score-density selection within a budget
//! - [`AdaptiveCompressor`] - four-level, signature-preserving compression
//! - [`TokenOptimizer`] - the six-phase orchestrator emitting
//!   [`SavingsEvent`] records
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use prism_optimizer::{AdaptiveCompressor, ChunkSelector, TokenOptimizer};
//!
//! let optimizer = TokenOptimizer::new(
//!     scoring_service,
//!     ChunkSelector::default(),
//!     AdaptiveCompressor::default(),
//!     config.optimizer,
//! );
//! let prompt = optimizer
//!     .reconstruct_prompt("fix authentication bug", candidates, 500,
//!                         &context, None, &CancellationToken::new())
//!     .await?;
//! ```

pub mod compressor;
pub mod error;
pub mod intent;
pub mod metrics;
pub mod optimizer;
pub mod selector;

// Re-exports for convenience
pub use compressor::{AdaptiveCompressor, CompressedChunk, CompressionLevel};
pub use error::{OptimizerError, Phase, Result};
pub use intent::{Entities, Intent, IntentDetector, IntentKind, OptimizationOptions, Scope};
pub use metrics::{MetricsSink, RecordingSink, SavingsEvent, TracingSink};
pub use optimizer::{BudgetAllocation, ModelChoice, OptimizedPrompt, TokenOptimizer};
pub use selector::{ChunkSelector, Selection};
