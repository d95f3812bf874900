//! Relevance scoring types
//!
//! Output and context types for the scoring service. The score breakdown
//! keeps one field per canonical scorer plus a metadata map for
//! user-registered scorers, so callers can always inspect why a chunk
//! ranked where it did.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chunk::CodeChunk;

/// Aggregated relevance of a chunk against a query.
///
/// `total` is the weighted average of the participating scorer outputs,
/// `Σ(sᵢ·wᵢ) / Σwᵢ`, with every input clamped into [0, 1] first. The
/// canonical scorers land in the named fields; anything else is recorded
/// under `metadata` by scorer name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RelevanceScore {
    /// Weighted average over all participating scorers, in [0, 1]
    pub total: f64,
    /// Cosine similarity of chunk embedding vs. query vector
    pub semantic: f64,
    /// Fuzzy match between query tokens and chunk symbols
    pub symbol_match: f64,
    /// Path-hierarchy distance from the context's current file
    pub file_proximity: f64,
    /// Exponential decay of time since last access
    pub recency: f64,
    /// Normalized log of usage count
    pub usage_frequency: f64,
    /// Outputs of non-canonical scorers, keyed by scorer name
    #[serde(default)]
    pub metadata: HashMap<String, f64>,
}

impl RelevanceScore {
    /// Clamp a raw scorer output into the valid [0, 1] range.
    ///
    /// NaN maps to 0 so a misbehaving scorer can never poison the average.
    pub fn clamp_component(value: f64) -> f64 {
        if value.is_nan() {
            0.0
        } else {
            value.clamp(0.0, 1.0)
        }
    }
}

/// A chunk with its relevance score and 1-based rank within a batch.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: CodeChunk,
    pub score: RelevanceScore,
    /// Position in the batch ordering, 1..N
    pub rank: usize,
}

/// Per-query context supplied by the caller.
///
/// `recent_files` is ordered most-recent first. History is optional free
/// text the optimizer may fold into the prompt when the intent needs it.
#[derive(Debug, Clone, Default)]
pub struct ScoringContext {
    /// File the user is currently editing, repo-relative
    pub current_file: Option<String>,
    /// Directory the user is currently working in
    pub current_directory: Option<String>,
    /// Recently touched files, most-recent first
    pub recent_files: Vec<String>,
    /// Prior conversation turns, newest first
    pub history: Vec<String>,
    /// When this context was captured
    pub timestamp: Option<DateTime<Utc>>,
}

impl ScoringContext {
    /// Context with just a current file; directory is derived from it.
    pub fn for_file(current_file: impl Into<String>) -> Self {
        let current_file = current_file.into();
        let current_directory = current_file
            .rfind('/')
            .map(|idx| current_file[..idx].to_string());
        Self {
            current_file: Some(current_file),
            current_directory,
            ..Default::default()
        }
    }

    /// The instant scoring should treat as "now"; falls back to wall clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.timestamp.unwrap_or_else(Utc::now)
    }
}

/// A query embedding paired with the text it came from.
///
/// The creation timestamp participates in cache keys so long-lived hosts
/// can distinguish re-embedded queries.
#[derive(Debug, Clone)]
pub struct QueryEmbedding {
    pub vector: Vec<f32>,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl QueryEmbedding {
    pub fn new(vector: Vec<f32>, text: impl Into<String>) -> Self {
        Self {
            vector,
            text: text.into(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_component() {
        assert_eq!(RelevanceScore::clamp_component(0.5), 0.5);
        assert_eq!(RelevanceScore::clamp_component(-0.2), 0.0);
        assert_eq!(RelevanceScore::clamp_component(1.7), 1.0);
        assert_eq!(RelevanceScore::clamp_component(f64::NAN), 0.0);
    }

    #[test]
    fn test_context_for_file_derives_directory() {
        let ctx = ScoringContext::for_file("src/auth/login.ts");
        assert_eq!(ctx.current_file.as_deref(), Some("src/auth/login.ts"));
        assert_eq!(ctx.current_directory.as_deref(), Some("src/auth"));
    }

    #[test]
    fn test_context_for_root_file_has_no_directory() {
        let ctx = ScoringContext::for_file("main.rs");
        assert_eq!(ctx.current_directory, None);
    }

    #[test]
    fn test_context_now_prefers_explicit_timestamp() {
        let ts = Utc::now() - chrono::Duration::hours(3);
        let ctx = ScoringContext {
            timestamp: Some(ts),
            ..Default::default()
        };
        assert_eq!(ctx.now(), ts);
    }

    #[test]
    fn test_query_embedding_keeps_text() {
        let q = QueryEmbedding::new(vec![0.1, 0.2], "how do users log in?");
        assert_eq!(q.text, "how do users log in?");
        assert_eq!(q.vector.len(), 2);
    }
}
