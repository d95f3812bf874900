//! Code chunk data model
//!
//! A [`CodeChunk`] is a contiguous, semantically meaningful slice of a source
//! file (typically a function, class, or group of closely-related lines)
//! together with its location, declared symbols, and an optional signature.
//! Chunks are produced by an external parser and never mutated after
//! insertion into a store; re-inserting a chunk with the same identifier
//! supersedes the old record.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Language tag from the fixed lexicon shared with the parser.
///
/// Unrecognized tags map to [`Language::Unknown`] rather than failing;
/// downstream compression falls back to a default comment profile for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Typescript,
    Javascript,
    Python,
    Rust,
    Go,
    Java,
    C,
    Cpp,
    Csharp,
    #[default]
    Unknown,
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Language::Typescript => "typescript",
            Language::Javascript => "javascript",
            Language::Python => "python",
            Language::Rust => "rust",
            Language::Go => "go",
            Language::Java => "java",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Csharp => "csharp",
            Language::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Language {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "typescript" | "ts" => Language::Typescript,
            "javascript" | "js" => Language::Javascript,
            "python" | "py" => Language::Python,
            "rust" | "rs" => Language::Rust,
            "go" => Language::Go,
            "java" => Language::Java,
            "c" => Language::C,
            "cpp" | "c++" => Language::Cpp,
            "csharp" | "c#" | "cs" => Language::Csharp,
            _ => Language::Unknown,
        })
    }
}

/// The unit of retrieval.
///
/// Invariants enforced by [`CodeChunk::validate`]:
/// - `id` is non-empty (and unique within a store)
/// - `content` is non-empty
/// - `start_line >= 1` and `end_line >= start_line`
///
/// Paths are repo-relative with forward slashes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeChunk {
    /// Unique identifier within a store (e.g., "src/auth/login.ts:login")
    pub id: String,
    /// Source file path, repo-relative, forward slashes
    pub file_path: String,
    /// Raw textual content of the chunk
    pub content: String,
    /// First line of the chunk in the source file (1-based, inclusive)
    pub start_line: u32,
    /// Last line of the chunk in the source file (inclusive)
    pub end_line: u32,
    /// Language tag from the parser
    pub language: Language,
    /// Symbols declared by this chunk, in declaration order
    #[serde(default)]
    pub symbols: Vec<String>,
    /// Symbols this chunk depends on, in reference order
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// The public shape of the chunk (first signature lines), if the parser
    /// extracted one
    #[serde(default)]
    pub signature: Option<String>,
    /// Free-form metadata from the parser (last access epoch, usage counts, ...)
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl CodeChunk {
    /// Create a chunk with the required fields; optional fields start empty.
    pub fn new(
        id: impl Into<String>,
        file_path: impl Into<String>,
        content: impl Into<String>,
        start_line: u32,
        end_line: u32,
        language: Language,
    ) -> Self {
        Self {
            id: id.into(),
            file_path: file_path.into(),
            content: content.into(),
            start_line,
            end_line,
            language,
            symbols: Vec::new(),
            dependencies: Vec::new(),
            signature: None,
            metadata: HashMap::new(),
        }
    }

    /// Set declared symbols
    pub fn with_symbols(mut self, symbols: Vec<String>) -> Self {
        self.symbols = symbols;
        self
    }

    /// Set dependency symbols
    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Set the signature line(s)
    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    /// Attach a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Check the structural invariants of this chunk.
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(CoreError::InvalidChunk {
                id: "<empty>".into(),
                reason: "identifier is empty".into(),
            });
        }
        if self.content.is_empty() {
            return Err(CoreError::InvalidChunk {
                id: self.id.clone(),
                reason: "content is empty".into(),
            });
        }
        if self.start_line < 1 {
            return Err(CoreError::InvalidChunk {
                id: self.id.clone(),
                reason: "start_line must be >= 1".into(),
            });
        }
        if self.end_line < self.start_line {
            return Err(CoreError::InvalidChunk {
                id: self.id.clone(),
                reason: format!(
                    "end_line {} precedes start_line {}",
                    self.end_line, self.start_line
                ),
            });
        }
        Ok(())
    }

    /// Parent directory of the chunk's file, without trailing slash.
    ///
    /// Returns an empty string for files at the repo root.
    pub fn parent_dir(&self) -> &str {
        match self.file_path.rfind('/') {
            Some(idx) => &self.file_path[..idx],
            None => "",
        }
    }

    /// Line span formatted as "start-end" for prompt headers.
    pub fn line_range(&self) -> String {
        format!("{}-{}", self.start_line, self.end_line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn chunk(id: &str) -> CodeChunk {
        CodeChunk::new(id, "src/lib.rs", "fn main() {}", 1, 1, Language::Rust)
    }

    #[test]
    fn test_language_roundtrip() {
        for lang in [
            Language::Typescript,
            Language::Javascript,
            Language::Python,
            Language::Rust,
            Language::Go,
            Language::Java,
            Language::C,
            Language::Cpp,
            Language::Csharp,
            Language::Unknown,
        ] {
            let parsed: Language = lang.to_string().parse().unwrap();
            assert_eq!(parsed, lang);
        }
    }

    #[test]
    fn test_language_unknown_fallback() {
        let parsed: Language = "brainfuck".parse().unwrap();
        assert_eq!(parsed, Language::Unknown);
    }

    #[test]
    fn test_language_aliases() {
        assert_eq!("ts".parse::<Language>().unwrap(), Language::Typescript);
        assert_eq!("c++".parse::<Language>().unwrap(), Language::Cpp);
        assert_eq!("py".parse::<Language>().unwrap(), Language::Python);
    }

    #[test]
    fn test_validate_ok() {
        assert!(chunk("a").validate().is_ok());
    }

    #[test]
    fn test_validate_empty_id() {
        let c = chunk("");
        assert!(matches!(
            c.validate(),
            Err(CoreError::InvalidChunk { .. })
        ));
    }

    #[test]
    fn test_validate_empty_content() {
        let mut c = chunk("a");
        c.content = String::new();
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_validate_line_order() {
        let mut c = chunk("a");
        c.start_line = 10;
        c.end_line = 5;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_validate_zero_start_line() {
        let mut c = chunk("a");
        c.start_line = 0;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_parent_dir() {
        let mut c = chunk("a");
        c.file_path = "src/auth/login.ts".into();
        assert_eq!(c.parent_dir(), "src/auth");

        c.file_path = "main.rs".into();
        assert_eq!(c.parent_dir(), "");
    }

    #[test]
    fn test_builder_helpers() {
        let c = chunk("a")
            .with_symbols(vec!["login".into()])
            .with_signature("fn main()")
            .with_metadata("usage_count", "3");
        assert_eq!(c.symbols, vec!["login".to_string()]);
        assert_eq!(c.signature.as_deref(), Some("fn main()"));
        assert_eq!(c.metadata.get("usage_count").map(String::as_str), Some("3"));
    }
}
