//! Embedding generation for semantic code search
//!
//! This module provides embedding generation with a primary + fallback
//! provider chain:
//!
//! ```text
//! EmbeddingProvider (trait)
//!     ├── CloudflareProvider - Workers AI REST endpoint (remote, metered)
//!     └── LocalProvider      - deterministic hashed embedder (free)
//! ```
//!
//! [`EmbeddingClient`] sits in front of the providers and owns batching,
//! input filtering, daily-quota gating, the fallback chain, and inter-batch
//! pacing. Callers never talk to a provider directly.

pub mod client;
pub mod cloudflare;
pub mod factory;
mod local;
mod provider;

// Re-export provider types
pub use provider::{EmbeddingProvider, ProviderKind, ProviderStatus};

// Re-export factory functions
pub use factory::{create as create_provider, create_fallback, validate_dimension};

// Re-export the client and providers
pub use client::EmbeddingClient;
pub use cloudflare::{CloudflareConfig, CloudflareProvider};
pub use local::LocalProvider;
