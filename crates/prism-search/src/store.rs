//! In-memory vector store
//!
//! Owns chunks and their embeddings, keyed by chunk identifier, and answers
//! top-K queries by exact cosine similarity over a linear scan. A linear
//! scan stays comfortably interactive up to roughly 100k chunks, which
//! covers the single-repository indexes this engine serves.
//!
//! Concurrency: multiple concurrent readers, writes serialized, enforced by
//! an internal `RwLock`. Insertions are upserts keyed by chunk id; batch
//! insertion validates the entire batch before touching the map so the
//! batch lands all-or-nothing.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::{debug, info};

use prism_core::{CodeChunk, Language};

use crate::error::{Result, SearchError};

/// Cosine similarity of two equal-length vectors.
///
/// Zero-magnitude inputs yield 0, never NaN.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut mag_a = 0.0f32;
    let mut mag_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        mag_a += x * x;
        mag_b += y * y;
    }
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    dot / (mag_a.sqrt() * mag_b.sqrt())
}

/// Search options: result limit plus pre-ranking filter predicates.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Maximum number of results
    pub limit: usize,
    /// Only consider chunks with this language tag
    pub language: Option<Language>,
    /// Only consider chunks whose file path starts with this prefix
    pub path_prefix: Option<String>,
    /// Drop results scoring below this similarity
    pub min_score: Option<f32>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: 10,
            language: None,
            path_prefix: None,
            min_score: None,
        }
    }
}

impl SearchOptions {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit,
            ..Default::default()
        }
    }
}

/// A chunk together with its cosine similarity to the query, in [-1, 1].
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub chunk: CodeChunk,
    pub score: f32,
}

/// Store statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of stored chunks (each with exactly one embedding)
    pub chunk_count: usize,
    /// Fixed embedding dimension of this store
    pub dimension: usize,
}

struct Record {
    chunk: CodeChunk,
    embedding: Vec<f32>,
}

/// In-memory chunk + embedding store with exact cosine search.
pub struct VectorStore {
    records: RwLock<HashMap<String, Record>>,
    dimension: usize,
}

impl VectorStore {
    /// Create an empty store with a fixed embedding dimension.
    pub fn new(dimension: usize) -> Self {
        info!("Creating vector store (dim={})", dimension);
        Self {
            records: RwLock::new(HashMap::new()),
            dimension,
        }
    }

    /// The fixed embedding dimension of this store.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn check_record(&self, chunk: &CodeChunk, embedding: &[f32]) -> Result<()> {
        chunk
            .validate()
            .map_err(|e| SearchError::InvalidQuery(e.to_string()))?;
        if embedding.len() != self.dimension {
            return Err(SearchError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }
        Ok(())
    }

    /// Insert or replace a chunk and its embedding (upsert by chunk id).
    pub fn insert(&self, chunk: CodeChunk, embedding: Vec<f32>) -> Result<()> {
        self.check_record(&chunk, &embedding)?;

        let mut records = self.records.write();
        let replaced = records
            .insert(chunk.id.clone(), Record { chunk, embedding })
            .is_some();
        if replaced {
            debug!("Upsert replaced an existing chunk");
        }
        Ok(())
    }

    /// Insert a batch atomically: every record is validated before any is
    /// written, so a bad record leaves the store untouched.
    pub fn insert_batch(&self, chunks: Vec<CodeChunk>, embeddings: Vec<Vec<f32>>) -> Result<()> {
        if chunks.len() != embeddings.len() {
            return Err(SearchError::VectorStore(format!(
                "Batch length mismatch: {} chunks, {} embeddings",
                chunks.len(),
                embeddings.len()
            )));
        }
        for (chunk, embedding) in chunks.iter().zip(embeddings.iter()) {
            self.check_record(chunk, embedding)?;
        }

        let mut records = self.records.write();
        for (chunk, embedding) in chunks.into_iter().zip(embeddings) {
            records.insert(chunk.id.clone(), Record { chunk, embedding });
        }
        Ok(())
    }

    /// Top-K search by cosine similarity.
    ///
    /// Filters are applied before ranking. Results are sorted by score
    /// descending with chunk id as the tie-break for determinism.
    pub fn search(&self, query: &[f32], opts: &SearchOptions) -> Result<Vec<SearchResult>> {
        if query.len() != self.dimension {
            return Err(SearchError::InvalidQuery(format!(
                "query dimension {} does not match store dimension {}",
                query.len(),
                self.dimension
            )));
        }
        if opts.limit == 0 {
            return Ok(Vec::new());
        }

        let records = self.records.read();
        let mut hits: Vec<SearchResult> = records
            .values()
            .filter(|r| {
                if let Some(lang) = opts.language {
                    if r.chunk.language != lang {
                        return false;
                    }
                }
                if let Some(ref prefix) = opts.path_prefix {
                    if !r.chunk.file_path.starts_with(prefix.as_str()) {
                        return false;
                    }
                }
                true
            })
            .map(|r| SearchResult {
                chunk: r.chunk.clone(),
                score: cosine_similarity(query, &r.embedding),
            })
            .filter(|hit| opts.min_score.is_none_or(|min| hit.score >= min))
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.chunk.id.cmp(&b.chunk.id))
        });
        hits.truncate(opts.limit);

        debug!("Search returned {} hits", hits.len());
        Ok(hits)
    }

    /// Fetch a chunk by id.
    pub fn get(&self, id: &str) -> Option<CodeChunk> {
        self.records.read().get(id).map(|r| r.chunk.clone())
    }

    /// Fetch the stored embedding for a chunk id.
    pub fn embedding(&self, id: &str) -> Option<Vec<f32>> {
        self.records.read().get(id).map(|r| r.embedding.clone())
    }

    /// Delete a chunk and its embedding. Returns whether it existed.
    pub fn delete(&self, id: &str) -> bool {
        self.records.write().remove(id).is_some()
    }

    /// Remove every record.
    pub fn clear(&self) {
        self.records.write().clear();
    }

    /// Current statistics.
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            chunk_count: self.records.read().len(),
            dimension: self.dimension,
        }
    }
}
