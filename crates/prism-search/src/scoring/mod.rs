//! Relevance scoring service
//!
//! Aggregates a registry of pluggable feature scorers into a weighted
//! [`RelevanceScore`]: `total = Σ(sᵢ·wᵢ) / Σwᵢ`, every scorer output
//! clamped into [0, 1] first. The registry keeps insertion order so
//! iteration - and therefore `metadata` population and timing attribution -
//! is deterministic.
//!
//! Batches run on a dedicated thread pool bounded by the configured
//! parallelism. A TTL + LRU cache keyed by (chunk, query, context focus) is
//! consulted before any scorer runs; entries appear atomically to
//! concurrent queries.
//!
//! Individual scorer failures are logged and score zero for that call; they
//! never abort a batch. The only service-level error is `ScoringFailed`,
//! raised when a non-empty batch is submitted with no scorers registered.

mod cache;
mod scorers;

pub use scorers::{CustomScorerFn, Scorer};

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use tracing::{debug, warn};

use prism_config::ScoringConfig;
use prism_core::{CodeChunk, QueryEmbedding, RelevanceScore, ScoredChunk, ScoringContext};

use crate::error::{Result, SearchError};
use crate::store::VectorStore;

use cache::{cache_key, ScoreCache};

/// Exponential moving average weight for per-chunk timing.
const TIMING_EMA_ALPHA: f64 = 0.1;

/// A scorer with its aggregation weight.
#[derive(Clone)]
struct RegisteredScorer {
    scorer: Scorer,
    weight: f64,
}

/// Point-in-time view of the service metrics.
#[derive(Debug, Clone, Default)]
pub struct ScoringMetrics {
    /// Chunks scored since process start (cache hits included)
    pub total_chunks_scored: u64,
    /// Moving average scoring time per chunk, microseconds
    pub average_time_per_chunk_us: f64,
    /// Cache hits over total lookups, in [0, 1]; 0 when the cache is off
    pub cache_hit_rate: f64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// Cumulative time spent inside each scorer
    pub per_scorer_time: HashMap<String, Duration>,
}

#[derive(Default)]
struct MetricsState {
    total_chunks: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    avg_time_us: Mutex<f64>,
    per_scorer_time: Mutex<HashMap<String, Duration>>,
}

/// Weighted multi-scorer relevance service.
pub struct ScoringService {
    scorers: RwLock<Vec<RegisteredScorer>>,
    cache: Option<ScoreCache>,
    pool: rayon::ThreadPool,
    metrics: MetricsState,
}

impl ScoringService {
    /// Create a service with an empty scorer registry.
    pub fn new(config: &ScoringConfig) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.parallelism.max(1))
            .thread_name(|i| format!("prism-score-{}", i))
            .build()
            .map_err(|e| SearchError::ScoringFailed(format!("thread pool: {}", e)))?;

        let cache = config.cache.enabled.then(|| {
            ScoreCache::new(
                config.cache.size,
                Duration::from_millis(config.cache.ttl_ms),
            )
        });

        Ok(Self {
            scorers: RwLock::new(Vec::new()),
            cache,
            pool,
            metrics: MetricsState::default(),
        })
    }

    /// Create a service with the five canonical scorers registered at the
    /// configured weights.
    pub fn with_default_scorers(store: Arc<VectorStore>, config: &ScoringConfig) -> Result<Self> {
        let service = Self::new(config)?;
        let w = &config.weights;
        service.register_scorer(Scorer::Semantic { store }, w.semantic);
        service.register_scorer(Scorer::FileProximity, w.file_proximity);
        service.register_scorer(Scorer::SymbolMatch, w.symbol_match);
        service.register_scorer(Scorer::Recency, w.recency);
        service.register_scorer(Scorer::Frequency, w.frequency);
        Ok(service)
    }

    /// Register a scorer. A scorer with the same name is replaced in place,
    /// keeping its registry position.
    pub fn register_scorer(&self, scorer: Scorer, weight: f64) {
        let weight = weight.max(0.0);
        let mut scorers = self.scorers.write();
        if let Some(existing) = scorers.iter_mut().find(|r| r.scorer.name() == scorer.name()) {
            existing.scorer = scorer;
            existing.weight = weight;
        } else {
            scorers.push(RegisteredScorer { scorer, weight });
        }
    }

    /// Remove a scorer by name. Returns whether it was registered.
    pub fn unregister_scorer(&self, name: &str) -> bool {
        let mut scorers = self.scorers.write();
        let before = scorers.len();
        scorers.retain(|r| r.scorer.name() != name);
        scorers.len() < before
    }

    /// Names of the registered scorers, in registry order.
    pub fn scorer_names(&self) -> Vec<String> {
        self.scorers
            .read()
            .iter()
            .map(|r| r.scorer.name().to_string())
            .collect()
    }

    /// Score one chunk. With an empty registry the total is 0.
    pub fn calculate_relevance(
        &self,
        chunk: &CodeChunk,
        query: &QueryEmbedding,
        context: &ScoringContext,
    ) -> RelevanceScore {
        let key = cache_key(
            &chunk.id,
            &query.text,
            context.current_file.as_deref(),
            context.current_directory.as_deref(),
        );

        if let Some(ref cache) = self.cache {
            if let Some(score) = cache.get(&key) {
                self.metrics.cache_hits.fetch_add(1, Ordering::Relaxed);
                self.metrics.total_chunks.fetch_add(1, Ordering::Relaxed);
                return score;
            }
            self.metrics.cache_misses.fetch_add(1, Ordering::Relaxed);
        }

        let started = Instant::now();
        let scorers: Vec<RegisteredScorer> = self.scorers.read().clone();

        let mut score = RelevanceScore::default();
        let mut weighted_sum = 0.0;
        let mut weight_sum = 0.0;

        for registered in &scorers {
            let scorer_started = Instant::now();
            let raw = match registered.scorer.calculate(chunk, query, context) {
                Ok(value) => value,
                Err(e) => {
                    warn!(
                        "Scorer '{}' failed for chunk '{}', treating as zero: {}",
                        registered.scorer.name(),
                        chunk.id,
                        e
                    );
                    0.0
                }
            };
            self.record_scorer_time(registered.scorer.name(), scorer_started.elapsed());

            let value = RelevanceScore::clamp_component(raw);
            weighted_sum += value * registered.weight;
            weight_sum += registered.weight;

            match registered.scorer.name() {
                "semantic" => score.semantic = value,
                "file_proximity" => score.file_proximity = value,
                "symbol_match" => score.symbol_match = value,
                "recency" => score.recency = value,
                "frequency" => score.usage_frequency = value,
                name => {
                    score.metadata.insert(name.to_string(), value);
                }
            }
        }

        score.total = if weight_sum > 0.0 {
            weighted_sum / weight_sum
        } else {
            0.0
        };

        if let Some(ref cache) = self.cache {
            cache.put(key, score.clone());
        }

        self.metrics.total_chunks.fetch_add(1, Ordering::Relaxed);
        self.record_chunk_time(started.elapsed());

        score
    }

    /// Score a batch with bounded parallelism; results are sorted by total
    /// descending with deterministic tie-breaks and ranked 1..N.
    pub fn score_batch(
        &self,
        chunks: Vec<CodeChunk>,
        query: &QueryEmbedding,
        context: &ScoringContext,
    ) -> Result<Vec<ScoredChunk>> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }
        if self.scorers.read().is_empty() {
            return Err(SearchError::ScoringFailed(
                "no scorers registered for a non-empty batch".into(),
            ));
        }

        debug!("Scoring batch of {} chunks", chunks.len());

        let mut scored: Vec<(CodeChunk, RelevanceScore)> = self.pool.install(|| {
            chunks
                .into_par_iter()
                .map(|chunk| {
                    let score = self.calculate_relevance(&chunk, query, context);
                    (chunk, score)
                })
                .collect()
        });

        scored.sort_by(|(a_chunk, a), (b_chunk, b)| {
            b.total
                .total_cmp(&a.total)
                .then_with(|| a_chunk.content.len().cmp(&b_chunk.content.len()))
                .then_with(|| a_chunk.id.cmp(&b_chunk.id))
        });

        Ok(scored
            .into_iter()
            .enumerate()
            .map(|(i, (chunk, score))| ScoredChunk {
                chunk,
                score,
                rank: i + 1,
            })
            .collect())
    }

    /// Drop every cached score.
    pub fn clear_cache(&self) {
        if let Some(ref cache) = self.cache {
            cache.clear();
        }
    }

    /// Snapshot of the service metrics.
    pub fn metrics(&self) -> ScoringMetrics {
        let hits = self.metrics.cache_hits.load(Ordering::Relaxed);
        let misses = self.metrics.cache_misses.load(Ordering::Relaxed);
        let lookups = hits + misses;

        ScoringMetrics {
            total_chunks_scored: self.metrics.total_chunks.load(Ordering::Relaxed),
            average_time_per_chunk_us: *self.metrics.avg_time_us.lock(),
            cache_hit_rate: if lookups > 0 {
                hits as f64 / lookups as f64
            } else {
                0.0
            },
            cache_hits: hits,
            cache_misses: misses,
            per_scorer_time: self.metrics.per_scorer_time.lock().clone(),
        }
    }

    fn record_chunk_time(&self, elapsed: Duration) {
        let sample = elapsed.as_micros() as f64;
        let mut avg = self.metrics.avg_time_us.lock();
        *avg = if *avg == 0.0 {
            sample
        } else {
            *avg * (1.0 - TIMING_EMA_ALPHA) + sample * TIMING_EMA_ALPHA
        };
    }

    fn record_scorer_time(&self, name: &str, elapsed: Duration) {
        let mut times = self.metrics.per_scorer_time.lock();
        *times.entry(name.to_string()).or_default() += elapsed;
    }
}
