//! Feature scorers
//!
//! The scorer set is a closed enum of the five canonical signals plus an
//! open-extension `Custom` variant carrying a callable, so the behavior
//! surface stays narrow without an inheritance hierarchy. Every scorer maps
//! a (chunk, query, context) triple to a raw value the service clamps into
//! [0, 1] before weighting.
//!
//! Chunk-side inputs come from parser metadata: `last_access` (epoch
//! seconds) feeds recency, `usage_count` feeds frequency. Both signals are
//! per-session and volatile.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use prism_core::{CodeChunk, QueryEmbedding, ScoringContext};

use crate::store::{cosine_similarity, VectorStore};

/// Metadata key carrying the last access instant as epoch seconds.
const META_LAST_ACCESS: &str = "last_access";

/// Metadata key carrying the per-session usage count.
const META_USAGE_COUNT: &str = "usage_count";

/// Recency half-life in days.
const RECENCY_HALF_LIFE_DAYS: f64 = 30.0;

/// Usage count at which the frequency signal saturates.
const FREQUENCY_SATURATION: f64 = 100.0;

/// Callable for user-registered scorers.
pub type CustomScorerFn =
    Arc<dyn Fn(&CodeChunk, &QueryEmbedding, &ScoringContext) -> anyhow::Result<f64> + Send + Sync>;

/// A relevance feature scorer.
#[derive(Clone)]
pub enum Scorer {
    /// Cosine similarity of the stored chunk embedding vs. the query vector
    Semantic { store: Arc<VectorStore> },
    /// Path-hierarchy distance from the context's current file
    FileProximity,
    /// Fuzzy (Levenshtein-based) match between query tokens and chunk symbols
    SymbolMatch,
    /// Exponential decay of time since last access
    Recency,
    /// Normalized log of the usage count
    Frequency,
    /// User-registered scorer identified by name
    Custom {
        name: String,
        calculate: CustomScorerFn,
    },
}

impl std::fmt::Debug for Scorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Scorer::")?;
        f.write_str(match self {
            Scorer::Semantic { .. } => "Semantic",
            Scorer::FileProximity => "FileProximity",
            Scorer::SymbolMatch => "SymbolMatch",
            Scorer::Recency => "Recency",
            Scorer::Frequency => "Frequency",
            Scorer::Custom { .. } => "Custom",
        })
    }
}

impl Scorer {
    /// Registry name of this scorer.
    pub fn name(&self) -> &str {
        match self {
            Scorer::Semantic { .. } => "semantic",
            Scorer::FileProximity => "file_proximity",
            Scorer::SymbolMatch => "symbol_match",
            Scorer::Recency => "recency",
            Scorer::Frequency => "frequency",
            Scorer::Custom { name, .. } => name,
        }
    }

    /// Raw score for one chunk. The service clamps the result into [0, 1];
    /// errors are logged there and treated as zero.
    pub fn calculate(
        &self,
        chunk: &CodeChunk,
        query: &QueryEmbedding,
        context: &ScoringContext,
    ) -> anyhow::Result<f64> {
        Ok(match self {
            Scorer::Semantic { store } => match store.embedding(&chunk.id) {
                Some(embedding) => cosine_similarity(&query.vector, &embedding) as f64,
                None => 0.0,
            },
            Scorer::FileProximity => file_proximity(&chunk.file_path, context),
            Scorer::SymbolMatch => symbol_match(&query.text, &chunk.symbols),
            Scorer::Recency => recency(chunk, context.now()),
            Scorer::Frequency => frequency(chunk),
            Scorer::Custom { calculate, .. } => calculate(chunk, query, context)?,
        })
    }
}

/// Path-hierarchy proximity: 1.0 for the same file, 0.8 for the same
/// directory, decaying with the number of diverging path components.
fn file_proximity(file_path: &str, context: &ScoringContext) -> f64 {
    let Some(ref current) = context.current_file else {
        return 0.0;
    };
    if file_path == current {
        return 1.0;
    }

    let chunk_dir: Vec<&str> = parent_components(file_path);
    let current_dir: Vec<&str> = parent_components(current);
    if chunk_dir == current_dir {
        return 0.8;
    }

    let common = chunk_dir
        .iter()
        .zip(current_dir.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let divergence = (chunk_dir.len() - common) + (current_dir.len() - common);
    0.8 * 0.7f64.powi(divergence as i32)
}

fn parent_components(path: &str) -> Vec<&str> {
    match path.rfind('/') {
        Some(idx) => path[..idx].split('/').collect(),
        None => Vec::new(),
    }
}

/// Max fuzzy match between query tokens and chunk symbols, via normalized
/// Levenshtein similarity.
fn symbol_match(query: &str, symbols: &[String]) -> f64 {
    if symbols.is_empty() {
        return 0.0;
    }
    let tokens: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| t.len() >= 2)
        .map(|t| t.to_lowercase())
        .collect();
    if tokens.is_empty() {
        return 0.0;
    }

    let mut best = 0.0f64;
    for symbol in symbols {
        let symbol = symbol.to_lowercase();
        for token in &tokens {
            let sim = levenshtein_similarity(token, &symbol);
            if sim > best {
                best = sim;
            }
        }
    }
    best
}

/// 1 - distance/max_len, so identical strings score 1.0 and disjoint
/// strings approach 0.
fn levenshtein_similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / max_len as f64
}

/// Classic two-row Levenshtein distance over chars.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Exponential decay of age since last access, half-life 30 days.
///
/// Chunks with no recorded access score a neutral 0.5.
fn recency(chunk: &CodeChunk, now: DateTime<Utc>) -> f64 {
    let Some(epoch) = chunk
        .metadata
        .get(META_LAST_ACCESS)
        .and_then(|v| v.parse::<i64>().ok())
    else {
        return 0.5;
    };
    let last_access = DateTime::<Utc>::from_timestamp(epoch, 0).unwrap_or(now);
    let age_days = (now - last_access).num_seconds().max(0) as f64 / 86_400.0;
    0.5f64.powf(age_days / RECENCY_HALF_LIFE_DAYS)
}

/// Normalized log of usage count, saturating at 100 uses.
fn frequency(chunk: &CodeChunk) -> f64 {
    let count = chunk
        .metadata
        .get(META_USAGE_COUNT)
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);
    if count == 0 {
        return 0.0;
    }
    ((1.0 + count as f64).ln() / (1.0 + FREQUENCY_SATURATION).ln()).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_core::Language;

    fn chunk(path: &str) -> CodeChunk {
        CodeChunk::new("id", path, "fn f() {}", 1, 1, Language::Rust)
    }

    #[test]
    fn test_levenshtein_distance() {
        assert_eq!(levenshtein("", ""), 0);
        assert_eq!(levenshtein("abc", ""), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("login", "login"), 0);
        assert_eq!(levenshtein("log", "login"), 2);
    }

    #[test]
    fn test_levenshtein_similarity() {
        assert_eq!(levenshtein_similarity("login", "login"), 1.0);
        assert!((levenshtein_similarity("log", "login") - 0.6).abs() < 1e-9);
        assert!(levenshtein_similarity("xyz", "login") < 0.3);
    }

    #[test]
    fn test_symbol_match_exact_and_fuzzy() {
        let symbols = vec!["login".to_string(), "logout".to_string()];
        assert_eq!(symbol_match("call the login function", &symbols), 1.0);

        let fuzzy = symbol_match("how do users log in?", &symbols);
        assert!((fuzzy - 0.6).abs() < 1e-9, "got {}", fuzzy);

        assert_eq!(symbol_match("anything", &[]), 0.0);
        assert_eq!(symbol_match("?!", &symbols), 0.0);
    }

    #[test]
    fn test_file_proximity_same_file_and_dir() {
        let ctx = ScoringContext::for_file("src/auth/login.ts");
        assert_eq!(file_proximity("src/auth/login.ts", &ctx), 1.0);
        assert_eq!(file_proximity("src/auth/session.ts", &ctx), 0.8);
    }

    #[test]
    fn test_file_proximity_decays_with_divergence() {
        let ctx = ScoringContext::for_file("src/auth/login.ts");
        let sibling_tree = file_proximity("src/util/date.ts", &ctx);
        let distant = file_proximity("vendor/third_party/lib/x.ts", &ctx);
        assert!(sibling_tree < 0.8);
        assert!(distant < sibling_tree);
    }

    #[test]
    fn test_file_proximity_without_context() {
        let ctx = ScoringContext::default();
        assert_eq!(file_proximity("src/a.rs", &ctx), 0.0);
    }

    #[test]
    fn test_recency_decay() {
        let now = Utc::now();
        let mut fresh = chunk("a.rs");
        fresh
            .metadata
            .insert(META_LAST_ACCESS.into(), now.timestamp().to_string());
        assert!(recency(&fresh, now) > 0.99);

        let mut month_old = chunk("a.rs");
        month_old.metadata.insert(
            META_LAST_ACCESS.into(),
            (now.timestamp() - 30 * 86_400).to_string(),
        );
        let score = recency(&month_old, now);
        assert!((score - 0.5).abs() < 0.01, "half-life at 30 days, got {}", score);
    }

    #[test]
    fn test_recency_missing_is_neutral() {
        assert_eq!(recency(&chunk("a.rs"), Utc::now()), 0.5);
    }

    #[test]
    fn test_frequency_log_normalized() {
        let mut c = chunk("a.rs");
        assert_eq!(frequency(&c), 0.0);

        c.metadata.insert(META_USAGE_COUNT.into(), "100".into());
        assert!((frequency(&c) - 1.0).abs() < 0.01);

        c.metadata.insert(META_USAGE_COUNT.into(), "10".into());
        let mid = frequency(&c);
        assert!(mid > 0.4 && mid < 0.7, "got {}", mid);

        c.metadata.insert(META_USAGE_COUNT.into(), "10000".into());
        assert_eq!(frequency(&c), 1.0);
    }

    #[test]
    fn test_semantic_scorer_reads_store() {
        let store = Arc::new(VectorStore::new(2));
        let c = chunk("a.rs");
        store.insert(c.clone(), vec![1.0, 0.0]).unwrap();

        let scorer = Scorer::Semantic {
            store: store.clone(),
        };
        let query = QueryEmbedding::new(vec![1.0, 0.0], "q");
        let ctx = ScoringContext::default();

        let score = scorer.calculate(&c, &query, &ctx).unwrap();
        assert!((score - 1.0).abs() < 1e-6);

        // Unknown chunk id scores zero
        let other = CodeChunk::new("other", "b.rs", "x", 1, 1, Language::Rust);
        assert_eq!(scorer.calculate(&other, &query, &ctx).unwrap(), 0.0);
    }

    #[test]
    fn test_custom_scorer_callable() {
        let scorer = Scorer::Custom {
            name: "constant".into(),
            calculate: Arc::new(|_, _, _| Ok(0.42)),
        };
        assert_eq!(scorer.name(), "constant");
        let score = scorer
            .calculate(
                &chunk("a.rs"),
                &QueryEmbedding::new(vec![], "q"),
                &ScoringContext::default(),
            )
            .unwrap();
        assert_eq!(score, 0.42);
    }
}
