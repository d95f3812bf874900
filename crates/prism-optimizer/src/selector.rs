//! Budget-constrained chunk selection
//!
//! Greedy score-density selection: each candidate is valued at
//! `score.total / tokens` and accepted in density order while the running
//! token total stays inside the budget. One high-value chunk (score above
//! the configured threshold) may overflow into the 10% slack window.
//!
//! For project- and global-scope queries a diversity pass runs afterwards:
//! while more than the configured share of selected chunks come from one
//! parent directory, the lowest-density chunk of that directory is swapped
//! for the highest-density dropped chunk from elsewhere, provided the swap
//! keeps the total within slack.
//!
//! All orderings are total (density, then score, then content length, then
//! chunk id) so identical inputs always select identically.

use tracing::debug;

use prism_config::SelectorConfig;
use prism_core::{ScoredChunk, TokenCounter};

use crate::intent::Scope;

/// Result of a selection pass.
#[derive(Debug, Default)]
pub struct Selection {
    /// Accepted chunks, in acceptance (density) order
    pub selected: Vec<ScoredChunk>,
    /// Estimated token total over the accepted chunks
    pub total_tokens: usize,
    /// Rejected chunks
    pub dropped: Vec<ScoredChunk>,
}

/// Greedy score-density selector.
#[derive(Debug, Clone)]
pub struct ChunkSelector {
    config: SelectorConfig,
    counter: TokenCounter,
}

impl Default for ChunkSelector {
    fn default() -> Self {
        Self::new(SelectorConfig::default())
    }
}

impl ChunkSelector {
    pub fn new(config: SelectorConfig) -> Self {
        Self {
            config,
            counter: TokenCounter::new(),
        }
    }

    /// Token estimate the selector uses for a chunk.
    pub fn chunk_tokens(&self, chunk: &ScoredChunk) -> usize {
        self.counter.estimate_code(&chunk.chunk.content)
    }

    /// Score density: relevance per token; zero-token content is valued at
    /// its raw score.
    fn density(&self, chunk: &ScoredChunk) -> f64 {
        let tokens = self.chunk_tokens(chunk);
        if tokens == 0 {
            chunk.score.total
        } else {
            chunk.score.total / tokens as f64
        }
    }

    /// Select chunks within `budget` tokens for the given scope.
    pub fn select_within_budget(
        &self,
        scored: Vec<ScoredChunk>,
        budget: usize,
        scope: Scope,
    ) -> Selection {
        if scored.is_empty() {
            return Selection::default();
        }
        if budget == 0 {
            return Selection {
                dropped: scored,
                ..Default::default()
            };
        }

        let slack_budget = budget + (budget as f64 * self.config.slack_ratio) as usize;

        let mut candidates = scored;
        candidates.sort_by(|a, b| {
            self.density(b)
                .total_cmp(&self.density(a))
                .then_with(|| b.score.total.total_cmp(&a.score.total))
                .then_with(|| a.chunk.content.len().cmp(&b.chunk.content.len()))
                .then_with(|| a.chunk.id.cmp(&b.chunk.id))
        });

        let mut selection = Selection::default();
        let mut slack_spent = false;

        for candidate in candidates {
            let tokens = self.chunk_tokens(&candidate);
            if selection.total_tokens + tokens <= budget {
                selection.total_tokens += tokens;
                selection.selected.push(candidate);
            } else if candidate.score.total > self.config.high_value_threshold
                && !slack_spent
                && selection.total_tokens + tokens <= slack_budget
            {
                // One high-value overflow per slack window
                selection.total_tokens += tokens;
                selection.selected.push(candidate);
                slack_spent = true;
            } else {
                selection.dropped.push(candidate);
            }
        }

        if matches!(scope, Scope::Project | Scope::Global) {
            self.diversify(&mut selection, slack_budget);
        }

        debug!(
            "Selected {} chunks ({} tokens), dropped {}",
            selection.selected.len(),
            selection.total_tokens,
            selection.dropped.len()
        );
        selection
    }

    /// Swap same-directory chunks out while one parent directory holds more
    /// than the diversity threshold of the selection.
    fn diversify(&self, selection: &mut Selection, slack_budget: usize) {
        // Each swap moves one chunk out of the dominant directory, so the
        // iteration count is bounded by the selection size.
        let max_rounds = selection.selected.len();

        for _ in 0..max_rounds {
            let Some(dominant) = self.dominant_directory(&selection.selected) else {
                return;
            };

            // Lowest-density selected chunk in the dominant directory
            let Some(out_idx) = selection
                .selected
                .iter()
                .enumerate()
                .filter(|(_, c)| c.chunk.parent_dir() == dominant)
                .min_by(|(_, a), (_, b)| self.density(a).total_cmp(&self.density(b)))
                .map(|(i, _)| i)
            else {
                return;
            };
            let out_tokens = self.chunk_tokens(&selection.selected[out_idx]);

            // Highest-density dropped chunk from a different directory whose
            // swap keeps the total within slack
            let in_idx = selection
                .dropped
                .iter()
                .enumerate()
                .filter(|(_, c)| c.chunk.parent_dir() != dominant)
                .filter(|(_, c)| {
                    selection.total_tokens - out_tokens + self.chunk_tokens(c) <= slack_budget
                })
                .max_by(|(_, a), (_, b)| self.density(a).total_cmp(&self.density(b)))
                .map(|(i, _)| i);

            let Some(in_idx) = in_idx else {
                // No beneficial swap exists
                return;
            };

            let incoming = selection.dropped.remove(in_idx);
            let outgoing = std::mem::replace(&mut selection.selected[out_idx], incoming);
            selection.total_tokens = selection.total_tokens - out_tokens
                + self.chunk_tokens(&selection.selected[out_idx]);
            selection.dropped.push(outgoing);
        }
    }

    /// The parent directory holding more than the diversity threshold of
    /// the selection, if any.
    fn dominant_directory<'a>(&self, selected: &'a [ScoredChunk]) -> Option<&'a str> {
        if selected.len() < 2 {
            // A single chunk is trivially 100% of its directory, but there
            // is nothing to diversify against
            return None;
        }
        let mut counts: Vec<(&str, usize)> = Vec::new();
        for chunk in selected {
            let dir = chunk.chunk.parent_dir();
            match counts.iter_mut().find(|(d, _)| *d == dir) {
                Some((_, n)) => *n += 1,
                None => counts.push((dir, 1)),
            }
        }
        counts
            .into_iter()
            .max_by_key(|(_, n)| *n)
            .filter(|(_, n)| *n as f64 / selected.len() as f64 > self.config.diversity_threshold)
            .map(|(dir, _)| dir)
    }
}
