//! Token optimizer pipeline
//!
//! Orchestrates a query end to end: intent detection → scoring → budget
//! allocation → selection → compression → prompt reconstruction. Each phase
//! failure surfaces as an [`OptimizerError`] with a phase tag and no partial
//! result. A completed run emits one [`SavingsEvent`] to the metrics sink.
//!
//! Budget allocation carves the caller's total into sub-budgets: a response
//! reserve, a history reserve (only when the intent needs history), a system
//! preamble reserve, and the remainder for chunks. After compression the
//! chunk set is re-tallied and the lowest-density chunks dropped until the
//! total fits the chunk budget with 10% slack.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use prism_config::OptimizerConfig;
use prism_core::{CodeChunk, QueryEmbedding, ScoredChunk, ScoringContext, TokenCounter};
use prism_search::{EmbeddingClient, ScoringService};

use crate::compressor::{AdaptiveCompressor, CompressedChunk};
use crate::error::{OptimizerError, Phase, Result};
use crate::intent::{Intent, IntentDetector};
use crate::metrics::{MetricsSink, SavingsEvent, TracingSink};
use crate::selector::ChunkSelector;

/// Fixed system preamble heading every optimized prompt.
const SYSTEM_PREAMBLE: &str =
    "You are assisting with a codebase. Relevant code fragments follow, each \
     headed by its file path and line range.";

/// Allowed overshoot over the chunk budget after compression.
const CHUNK_SLACK_RATIO: f64 = 0.10;

/// Default cap on concurrently admitted queries.
const DEFAULT_CONCURRENCY: usize = 4;

/// Model routed for a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelChoice {
    /// Large-context frontier model
    HighCapacity,
    /// Default mid-tier model
    Balanced,
    /// Small local model when one is configured
    LocalIfAvailable,
}

impl std::fmt::Display for ModelChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ModelChoice::HighCapacity => "high-capacity",
            ModelChoice::Balanced => "balanced",
            ModelChoice::LocalIfAvailable => "local-if-available",
        };
        write!(f, "{}", s)
    }
}

/// Sub-budgets carved from the caller's total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetAllocation {
    pub system: usize,
    pub history: usize,
    pub chunks: usize,
    pub response: usize,
}

/// Final output of the pipeline.
#[derive(Debug)]
pub struct OptimizedPrompt {
    /// The reconstructed prompt text
    pub prompt: String,
    /// Token estimate over every candidate chunk before optimization
    pub original_tokens: usize,
    /// Token estimate of the final prompt
    pub optimized_tokens: usize,
    /// `original_tokens / max(1, optimized_tokens)`
    pub compression_ratio: f64,
    /// Compressed chunks in prompt order
    pub chunks: Vec<CompressedChunk>,
    /// Deterministic model routing decision
    pub model: ModelChoice,
    /// Why that model was chosen
    pub reason: String,
    /// The classified intent
    pub intent: Intent,
    /// The allocation the run used
    pub allocation: BudgetAllocation,
}

/// End-to-end prompt optimizer.
pub struct TokenOptimizer {
    detector: IntentDetector,
    scoring: Arc<ScoringService>,
    selector: ChunkSelector,
    compressor: AdaptiveCompressor,
    /// Used to embed the query lazily when the caller supplies none
    embedding_client: Option<Arc<EmbeddingClient>>,
    config: OptimizerConfig,
    counter: TokenCounter,
    sink: Arc<dyn MetricsSink>,
    /// Admission cap for concurrent queries; per-query state is never
    /// shared, so this is the only cross-query coupling
    admission: Arc<Semaphore>,
}

impl TokenOptimizer {
    pub fn new(
        scoring: Arc<ScoringService>,
        selector: ChunkSelector,
        compressor: AdaptiveCompressor,
        config: OptimizerConfig,
    ) -> Self {
        Self {
            detector: IntentDetector::new(),
            scoring,
            selector,
            compressor,
            embedding_client: None,
            config,
            counter: TokenCounter::new(),
            sink: Arc::new(TracingSink),
            admission: Arc::new(Semaphore::new(DEFAULT_CONCURRENCY)),
        }
    }

    /// Set the cap on concurrently admitted queries.
    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.admission = Arc::new(Semaphore::new(limit.max(1)));
        self
    }

    /// Attach an embedding client for lazy query embedding.
    pub fn with_embedding_client(mut self, client: Arc<EmbeddingClient>) -> Self {
        self.embedding_client = Some(client);
        self
    }

    /// Replace the metrics sink.
    pub fn with_metrics_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Run the six-phase pipeline and reconstruct a prompt within `budget`
    /// total tokens.
    ///
    /// `query_embedding` may be supplied by the caller; otherwise it is
    /// obtained from the attached embedding client.
    pub async fn reconstruct_prompt(
        &self,
        query: &str,
        candidates: Vec<CodeChunk>,
        budget: usize,
        context: &ScoringContext,
        query_embedding: Option<QueryEmbedding>,
        cancel: &CancellationToken,
    ) -> Result<OptimizedPrompt> {
        let started = Instant::now();
        if budget == 0 {
            return Err(OptimizerError::in_phase(
                Phase::Allocate,
                "total budget must be positive",
            ));
        }

        // Admission: the permit is held for the whole run and released on
        // every exit path, including cancellation
        self.check_cancel(cancel)?;
        let _permit = self.admission.acquire().await.map_err(|_| {
            OptimizerError::in_phase(Phase::Intent, "optimizer admission queue closed")
        })?;

        // Phase 1: intent
        self.check_cancel(cancel)?;
        let intent = self.detector.detect(query, context);
        debug!("Intent: {:?} (scope {:?})", intent.kind, intent.scope);

        // Phase 2: score
        self.check_cancel(cancel)?;
        let original_tokens: usize = candidates
            .iter()
            .map(|c| self.counter.estimate_code(&c.content))
            .sum();
        let query_embedding = match query_embedding {
            Some(embedding) => embedding,
            None => {
                let client = self.embedding_client.as_ref().ok_or_else(|| {
                    OptimizerError::in_phase(
                        Phase::Score,
                        "no query embedding supplied and no embedding client attached",
                    )
                })?;
                client
                    .embed_query(query, cancel)
                    .await
                    .map_err(|e| OptimizerError::from_search(Phase::Score, e))?
            }
        };
        let scored = self
            .scoring
            .score_batch(candidates, &query_embedding, context)
            .map_err(|e| OptimizerError::from_search(Phase::Score, e))?;

        // Phase 3: allocate
        self.check_cancel(cancel)?;
        let allocation = self.allocate(budget, &intent)?;
        debug!(
            "Allocation: system {} / history {} / chunks {} / response {}",
            allocation.system, allocation.history, allocation.chunks, allocation.response
        );

        // Phase 4: select
        self.check_cancel(cancel)?;
        let selection =
            self.selector
                .select_within_budget(scored, allocation.chunks, intent.scope);

        // Phase 5: compress
        self.check_cancel(cancel)?;
        let compressed = self.compress_selection(&selection.selected, allocation.chunks, &intent);

        // Phase 6: reconstruct
        self.check_cancel(cancel)?;
        let prompt = self.render(query, context, &compressed, &allocation);
        let optimized_tokens = self.counter.estimate(&prompt);
        let compression_ratio = original_tokens as f64 / optimized_tokens.max(1) as f64;

        let (model, reason) = choose_model(intent.complexity, optimized_tokens);

        self.sink.record(&SavingsEvent {
            original_tokens,
            optimized_tokens,
            compression_ratio,
            intent: intent.kind,
            duration: started.elapsed(),
        });

        Ok(OptimizedPrompt {
            prompt,
            original_tokens,
            optimized_tokens,
            compression_ratio,
            chunks: compressed,
            model,
            reason,
            intent,
            allocation,
        })
    }

    fn check_cancel(&self, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(OptimizerError::Cancelled);
        }
        Ok(())
    }

    fn allocate(&self, budget: usize, intent: &Intent) -> Result<BudgetAllocation> {
        let response = (budget as f64 * self.config.response_reserve) as usize;
        let history = if intent.needs_history {
            (budget as f64 * self.config.history_reserve) as usize
        } else {
            0
        };
        let system = (budget as f64 * self.config.system_reserve) as usize;
        let reserved = response + history + system;
        let chunks = budget.saturating_sub(reserved);

        if chunks == 0 {
            return Err(OptimizerError::in_phase(
                Phase::Allocate,
                format!("reserves consume the whole budget of {} tokens", budget),
            ));
        }
        Ok(BudgetAllocation {
            system,
            history,
            chunks,
            response,
        })
    }

    /// Compress the selection to its per-chunk target, then re-tally and
    /// drop the lowest-density chunks until the set fits the chunk budget
    /// with slack.
    fn compress_selection(
        &self,
        selected: &[ScoredChunk],
        chunks_budget: usize,
        intent: &Intent,
    ) -> Vec<CompressedChunk> {
        if selected.is_empty() {
            return Vec::new();
        }

        let per_chunk_target = chunks_budget.div_ceil(selected.len());
        let sources: Vec<CodeChunk> = selected.iter().map(|s| s.chunk.clone()).collect();
        let compressed =
            self.compressor
                .compress_batch(&sources, per_chunk_target, &intent.options);

        // Failed compressions drop out of the selection entirely
        let mut kept: Vec<(f64, CompressedChunk)> = selected
            .iter()
            .zip(compressed)
            .filter(|(_, c)| c.success)
            .map(|(s, c)| {
                let density = s.score.total / c.compressed_tokens.max(1) as f64;
                (density, c)
            })
            .collect();

        let slack_cap =
            chunks_budget + (chunks_budget as f64 * CHUNK_SLACK_RATIO) as usize;
        let mut total: usize = kept.iter().map(|(_, c)| c.compressed_tokens).sum();
        while total > slack_cap && !kept.is_empty() {
            let worst = kept
                .iter()
                .enumerate()
                .min_by(|(_, (a, _)), (_, (b, _))| a.total_cmp(b))
                .map(|(i, _)| i)
                .unwrap_or(0);
            let (_, dropped) = kept.remove(worst);
            debug!(
                "Post-compression re-tally dropped '{}' ({} tokens)",
                dropped.source.id, dropped.compressed_tokens
            );
            total = kept.iter().map(|(_, c)| c.compressed_tokens).sum();
        }

        kept.into_iter().map(|(_, c)| c).collect()
    }

    /// Assemble the final prompt: preamble, history, framed chunks, query.
    fn render(
        &self,
        query: &str,
        context: &ScoringContext,
        chunks: &[CompressedChunk],
        allocation: &BudgetAllocation,
    ) -> String {
        let mut prompt = String::new();

        if allocation.system > 0 {
            prompt.push_str(SYSTEM_PREAMBLE);
            prompt.push_str("\n\n");
        }

        if allocation.history > 0 && !context.history.is_empty() {
            let mut used = 0usize;
            let mut turns: Vec<&str> = Vec::new();
            // History is stored newest first; keep newest turns within budget
            for turn in &context.history {
                let cost = self.counter.estimate(turn);
                if used + cost > allocation.history {
                    break;
                }
                used += cost;
                turns.push(turn);
            }
            if !turns.is_empty() {
                prompt.push_str("Recent conversation:\n");
                for turn in turns {
                    prompt.push_str(turn);
                    prompt.push('\n');
                }
                prompt.push('\n');
            }
        }

        for chunk in chunks {
            prompt.push_str(&format!(
                "// {}:{}\n",
                chunk.source.file_path,
                chunk.source.line_range()
            ));
            prompt.push_str(&chunk.content);
            prompt.push_str("\n\n");
        }

        prompt.push_str(query);
        prompt
    }
}

/// Deterministic model routing.
fn choose_model(complexity: f64, input_tokens: usize) -> (ModelChoice, String) {
    if complexity > 0.8 || input_tokens > 100_000 {
        (
            ModelChoice::HighCapacity,
            format!(
                "complexity {:.2} or input {} tokens needs a high-capacity model",
                complexity, input_tokens
            ),
        )
    } else if complexity < 0.3 && input_tokens < 8_000 {
        (
            ModelChoice::LocalIfAvailable,
            format!(
                "simple query (complexity {:.2}, {} tokens) fits a local model",
                complexity, input_tokens
            ),
        )
    } else {
        (
            ModelChoice::Balanced,
            format!(
                "complexity {:.2} at {} tokens routes to the balanced tier",
                complexity, input_tokens
            ),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_choose_model_boundaries() {
        assert_eq!(choose_model(0.9, 1_000).0, ModelChoice::HighCapacity);
        assert_eq!(choose_model(0.5, 200_000).0, ModelChoice::HighCapacity);
        assert_eq!(choose_model(0.1, 2_000).0, ModelChoice::LocalIfAvailable);
        assert_eq!(choose_model(0.1, 20_000).0, ModelChoice::Balanced);
        assert_eq!(choose_model(0.5, 10_000).0, ModelChoice::Balanced);
        // Exactly 0.8 is not "greater than"
        assert_eq!(choose_model(0.8, 1_000).0, ModelChoice::Balanced);
    }
}
