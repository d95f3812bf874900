//! Embedding client: batching, quota gating, and the provider chain
//!
//! Wraps a primary provider (typically remote and metered) and an optional
//! local fallback behind a single `embed` / `embed_batch` surface:
//!
//! 1. Empty and oversize inputs are filtered out; an all-filtered batch fails.
//! 2. The remaining texts are processed in batches of the configured size.
//!    Before each batch the daily neuron budget is consulted
//!    (`neurons = batch_len × dimension`) and the call fails fast when the
//!    quota cannot cover it.
//! 3. Each batch tries the primary, then the fallback; usage is recorded
//!    with the budget tracker only when the metered provider served it.
//! 4. A fixed delay between batches smooths remote rate limits.
//!
//! Returned vectors match the post-filter input order; short vectors are
//! zero-padded to the store dimension and logged.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use prism_config::EmbeddingConfig;
use prism_core::QueryEmbedding;

use crate::budget::BudgetTracker;
use crate::error::{Result, SearchError};

use super::factory;
use super::provider::EmbeddingProvider;

/// Client for generating embeddings through a primary + fallback chain.
pub struct EmbeddingClient {
    primary: Arc<dyn EmbeddingProvider>,
    fallback: Option<Arc<dyn EmbeddingProvider>>,
    budget: Arc<BudgetTracker>,
    dimension: usize,
    batch_size: usize,
    max_text_chars: usize,
    max_batch_size: usize,
    inter_batch_delay: Duration,
    timeout: Duration,
}

impl EmbeddingClient {
    /// Create a client from explicit providers.
    pub fn new(
        primary: Arc<dyn EmbeddingProvider>,
        fallback: Option<Arc<dyn EmbeddingProvider>>,
        budget: Arc<BudgetTracker>,
        config: &EmbeddingConfig,
    ) -> Self {
        Self {
            primary,
            fallback,
            budget,
            dimension: config.dimension,
            batch_size: config.batch_size.max(1),
            max_text_chars: config.max_text_chars,
            max_batch_size: config.max_batch_size,
            inter_batch_delay: Duration::from_millis(config.inter_batch_delay_ms),
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }

    /// Create a client from configuration: primary via the factory, local
    /// fallback always present.
    pub fn from_config(config: &EmbeddingConfig, budget: Arc<BudgetTracker>) -> Result<Self> {
        let primary = factory::create(config)?;
        // A metered primary gets the free local tier behind it; a local
        // primary needs no second copy of itself.
        let fallback = if primary.metered() {
            Some(factory::create_fallback(config)?)
        } else {
            None
        };
        Ok(Self::new(primary, fallback, budget, config))
    }

    /// The embedding dimension every returned vector has.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Embed a single text.
    pub async fn embed(&self, text: &str, cancel: &CancellationToken) -> Result<Vec<f32>> {
        if text.is_empty() {
            return Err(SearchError::EmbeddingFailed("input text is empty".into()));
        }
        let mut vectors = self.embed_batch(vec![text.to_string()], cancel).await?;
        vectors
            .pop()
            .ok_or_else(|| SearchError::EmbeddingFailed("provider returned no embedding".into()))
    }

    /// Embed a query and pair the vector with its text.
    pub async fn embed_query(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<QueryEmbedding> {
        let vector = self.embed(query, cancel).await?;
        Ok(QueryEmbedding::new(vector, query))
    }

    /// Embed a batch of texts, preserving post-filter order.
    pub async fn embed_batch(
        &self,
        texts: Vec<String>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Vec<f32>>> {
        if texts.len() > self.max_batch_size {
            return Err(SearchError::EmbeddingFailed(format!(
                "batch of {} exceeds the maximum of {}",
                texts.len(),
                self.max_batch_size
            )));
        }

        let before = texts.len();
        let filtered: Vec<String> = texts
            .into_iter()
            .filter(|t| !t.is_empty() && t.chars().count() <= self.max_text_chars)
            .collect();
        if filtered.len() < before {
            warn!(
                "Filtered {} empty or oversize texts from embedding batch",
                before - filtered.len()
            );
        }
        if filtered.is_empty() {
            return Err(SearchError::EmbeddingFailed(
                "no valid inputs remain after filtering".into(),
            ));
        }

        let mut results = Vec::with_capacity(filtered.len());
        let batches: Vec<&[String]> = filtered.chunks(self.batch_size).collect();
        let batch_count = batches.len();

        for (index, batch) in batches.into_iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(SearchError::Cancelled);
            }

            if self.primary.metered() {
                let neurons = (batch.len() * self.dimension) as f64;
                if !self.budget.can_afford_neurons(neurons) {
                    let stats = self.budget.stats();
                    return Err(SearchError::EmbeddingFailed(format!(
                        "daily neuron budget exhausted: need {:.0}, {:.0} remaining",
                        neurons, stats.remaining
                    )));
                }
            }

            let vectors = self.run_provider_chain(batch).await?;
            results.extend(self.normalize_shape(vectors, batch.len()));

            if index + 1 < batch_count {
                tokio::time::sleep(self.inter_batch_delay).await;
            }
        }

        Ok(results)
    }

    /// Try the primary provider, then the fallback; record metered usage.
    async fn run_provider_chain(&self, batch: &[String]) -> Result<Vec<Vec<f32>>> {
        let texts = batch.to_vec();

        let primary_error = match tokio::time::timeout(
            self.timeout,
            self.primary.embed_batch(texts.clone()),
        )
        .await
        {
            Ok(Ok(vectors)) => {
                self.record_usage(self.primary.as_ref(), vectors.len());
                return Ok(vectors);
            }
            Ok(Err(e)) => e,
            Err(_) => SearchError::ProviderUnavailable(format!(
                "{} provider timed out after {:?}",
                self.primary.kind(),
                self.timeout
            )),
        };

        warn!(
            "{} provider failed, trying fallback: {}",
            self.primary.kind(),
            primary_error
        );

        let Some(ref fallback) = self.fallback else {
            return Err(SearchError::EmbeddingFailed(format!(
                "all providers failed: {}",
                primary_error
            )));
        };

        match tokio::time::timeout(self.timeout, fallback.embed_batch(texts)).await {
            Ok(Ok(vectors)) => {
                self.record_usage(fallback.as_ref(), vectors.len());
                Ok(vectors)
            }
            Ok(Err(fallback_error)) => Err(SearchError::EmbeddingFailed(format!(
                "all providers failed: primary: {}; fallback: {}",
                primary_error, fallback_error
            ))),
            Err(_) => Err(SearchError::EmbeddingFailed(format!(
                "all providers failed: primary: {}; fallback timed out",
                primary_error
            ))),
        }
    }

    fn record_usage(&self, provider: &dyn EmbeddingProvider, vector_count: usize) {
        if provider.metered() {
            let neurons = (vector_count * self.dimension) as f64;
            self.budget.track_neurons(neurons);
            debug!("Tracked {:.0} neurons for {} provider", neurons, provider.kind());
        }
    }

    /// Pad or truncate provider output to exactly `expected` vectors of the
    /// store dimension.
    fn normalize_shape(&self, mut vectors: Vec<Vec<f32>>, expected: usize) -> Vec<Vec<f32>> {
        for vector in &mut vectors {
            if vector.len() < self.dimension {
                warn!(
                    "Provider returned a {}-dim vector, padding to {}",
                    vector.len(),
                    self.dimension
                );
                vector.resize(self.dimension, 0.0);
            } else if vector.len() > self.dimension {
                warn!(
                    "Provider returned a {}-dim vector, truncating to {}",
                    vector.len(),
                    self.dimension
                );
                vector.truncate(self.dimension);
            }
        }
        if vectors.len() < expected {
            warn!(
                "Provider returned {} vectors for {} inputs, padding with zero vectors",
                vectors.len(),
                expected
            );
            vectors.resize(expected, vec![0.0; self.dimension]);
        } else if vectors.len() > expected {
            vectors.truncate(expected);
        }
        vectors
    }
}
