//! Deterministic token estimation
//!
//! PRISM never talks to a real tokenizer on the budget path; every budget
//! decision uses the same fixed chars-per-token ratios so selection and
//! compression stay reproducible. Estimates are consulted everywhere a token
//! budget appears and are never used for billing.

use serde_json::Value;

/// Characters per token for prose and JSON
const CHARS_PER_TOKEN_TEXT: usize = 4;

/// Characters per token for source code (denser than prose)
const CHARS_PER_TOKEN_CODE: usize = 3;

/// Token estimator with fixed chars/token ratios.
///
/// All methods are pure and allocation-free beyond the input (JSON
/// estimation serializes its value once). Empty input yields 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenCounter;

impl TokenCounter {
    pub fn new() -> Self {
        Self
    }

    /// Estimate tokens for natural-language text: ceil(chars / 4).
    ///
    /// Counts characters rather than bytes so multi-byte input is not
    /// overestimated.
    pub fn estimate(&self, text: &str) -> usize {
        Self::ceil_div(text.chars().count(), CHARS_PER_TOKEN_TEXT)
    }

    /// Estimate tokens for source code: ceil(chars / 3).
    pub fn estimate_code(&self, text: &str) -> usize {
        Self::ceil_div(text.chars().count(), CHARS_PER_TOKEN_CODE)
    }

    /// Estimate tokens for a JSON value via its compact serialization.
    pub fn estimate_json(&self, value: &Value) -> usize {
        match value {
            Value::Null => 0,
            _ => self.estimate(&value.to_string()),
        }
    }

    fn ceil_div(n: usize, d: usize) -> usize {
        n.div_ceil(d)
    }
}
