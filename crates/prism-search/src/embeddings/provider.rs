//! Embedding provider trait and types
//!
//! Defines the core abstraction for embedding generation with two
//! implementations:
//! - `CloudflareProvider` - Workers AI REST endpoint (remote, metered)
//! - `LocalProvider` - deterministic hashed embedder (free fallback)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Type of embedding provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    /// Cloudflare Workers AI (remote, metered in neurons)
    #[default]
    Cloudflare,
    /// Deterministic local hashed embedder
    Local,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Cloudflare => write!(f, "cloudflare"),
            ProviderKind::Local => write!(f, "local"),
        }
    }
}

impl From<prism_config::ProviderKind> for ProviderKind {
    fn from(kind: prism_config::ProviderKind) -> Self {
        match kind {
            prism_config::ProviderKind::Cloudflare => ProviderKind::Cloudflare,
            prism_config::ProviderKind::Local => ProviderKind::Local,
        }
    }
}

/// Status of an embedding provider, for diagnostics.
#[derive(Debug, Clone)]
pub struct ProviderStatus {
    /// Whether the provider is available and responding
    pub available: bool,
    /// Type of provider
    pub kind: ProviderKind,
    /// Last health check latency in milliseconds
    pub latency_ms: Option<u64>,
    /// Error message if the provider is unavailable
    pub error: Option<String>,
}

impl ProviderStatus {
    /// Create a status for a healthy provider
    pub fn healthy(kind: ProviderKind) -> Self {
        Self {
            available: true,
            kind,
            latency_ms: None,
            error: None,
        }
    }

    /// Create a status for an unavailable provider
    pub fn unavailable(kind: ProviderKind, error: impl Into<String>) -> Self {
        Self {
            available: false,
            kind,
            latency_ms: None,
            error: Some(error.into()),
        }
    }

    /// Set latency from a health check
    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }
}

/// Embedding provider trait
///
/// Implementations must be `Send + Sync` for use with async runtimes and
/// concurrent access. `embed_batch` returns one vector per input text, in
/// input order; the client layer handles batching, quota gating, and the
/// primary → fallback chain, so providers only ever see one request's worth
/// of texts.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embeddings for a batch of texts, preserving order.
    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;

    /// The dimensionality of generated embeddings.
    fn dimension(&self) -> usize;

    /// Provider type identifier.
    fn kind(&self) -> ProviderKind;

    /// Whether usage of this provider consumes the daily neuron quota.
    fn metered(&self) -> bool {
        self.kind() == ProviderKind::Cloudflare
    }

    /// Check provider connectivity and status.
    async fn check_status(&self) -> Result<ProviderStatus>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_display() {
        assert_eq!(ProviderKind::Cloudflare.to_string(), "cloudflare");
        assert_eq!(ProviderKind::Local.to_string(), "local");
    }

    #[test]
    fn test_provider_kind_from_config() {
        assert_eq!(
            ProviderKind::from(prism_config::ProviderKind::Local),
            ProviderKind::Local
        );
        assert_eq!(
            ProviderKind::from(prism_config::ProviderKind::Cloudflare),
            ProviderKind::Cloudflare
        );
    }

    #[test]
    fn test_provider_status_healthy() {
        let status = ProviderStatus::healthy(ProviderKind::Local).with_latency(3);
        assert!(status.available);
        assert_eq!(status.latency_ms, Some(3));
        assert!(status.error.is_none());
    }

    #[test]
    fn test_provider_status_unavailable() {
        let status = ProviderStatus::unavailable(ProviderKind::Cloudflare, "Connection timeout");
        assert!(!status.available);
        assert_eq!(status.error, Some("Connection timeout".to_string()));
    }
}
