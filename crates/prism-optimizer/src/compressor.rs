//! Adaptive chunk compression
//!
//! Reduces a chunk's token footprint through progressively stronger levels,
//! preserving syntactic anchors at every step:
//!
//! | Level | Operation |
//! |---|---|
//! | Light | strip comments, collapse blank-line runs, trim trailing whitespace |
//! | Medium | Light + collapse in-line whitespace (outside strings), drop blank lines |
//! | Aggressive | keep signature and structural lines only |
//! | SignatureOnly | emit just the signature |
//!
//! Compression is text-based with per-language profiles; nothing here
//! parses, so it stays safe on partial or malformed snippets. An unknown
//! language falls back to a default profile recognizing `//`, `/* */`,
//! and `#` comments.

use rayon::prelude::*;
use tracing::debug;

use prism_config::{CompressionLevelName, CompressorConfig};
use prism_core::{CodeChunk, Language, TokenCounter};

use crate::intent::OptimizationOptions;

/// Compression levels, lightest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CompressionLevel {
    Light,
    Medium,
    Aggressive,
    SignatureOnly,
}

impl From<CompressionLevelName> for CompressionLevel {
    fn from(name: CompressionLevelName) -> Self {
        match name {
            CompressionLevelName::Light => Self::Light,
            CompressionLevelName::Medium => Self::Medium,
            CompressionLevelName::Aggressive => Self::Aggressive,
            CompressionLevelName::SignatureOnly => Self::SignatureOnly,
        }
    }
}

impl std::fmt::Display for CompressionLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Light => "light",
            Self::Medium => "medium",
            Self::Aggressive => "aggressive",
            Self::SignatureOnly => "signature-only",
        };
        write!(f, "{}", s)
    }
}

/// A chunk after compression.
#[derive(Debug, Clone)]
pub struct CompressedChunk {
    /// The chunk this content came from
    pub source: CodeChunk,
    /// Level that produced the content
    pub level: CompressionLevel,
    /// Compressed text
    pub content: String,
    /// Code-token estimate of the source content
    pub original_tokens: usize,
    /// Code-token estimate of the compressed content
    pub compressed_tokens: usize,
    /// `original_tokens / max(1, compressed_tokens)`
    pub compression_ratio: f64,
    /// False only when compression produced nothing and no signature was
    /// recoverable
    pub success: bool,
}

/// Per-language text profile driving compression.
struct LanguageProfile {
    line_comments: &'static [&'static str],
    block_comment: Option<(&'static str, &'static str)>,
    import_prefixes: &'static [&'static str],
    type_prefixes: &'static [&'static str],
    control_prefixes: &'static [&'static str],
    declaration_prefixes: &'static [&'static str],
}

static C_LIKE: LanguageProfile = LanguageProfile {
    line_comments: &["//"],
    block_comment: Some(("/*", "*/")),
    import_prefixes: &["import ", "import{", "export ", "#include", "using ", "require("],
    type_prefixes: &["type ", "interface ", "enum ", "struct ", "class ", "abstract class "],
    control_prefixes: &[
        "if ", "if(", "else", "for ", "for(", "while ", "while(", "switch ", "switch(", "case ",
        "do ", "try", "catch", "finally", "return", "throw ", "break", "continue", "}",
    ],
    declaration_prefixes: &[
        "function ", "async function ", "const ", "let ", "var ", "public ", "private ",
        "protected ", "static ", "export ", "void ", "int ", "new ",
    ],
};

static RUST: LanguageProfile = LanguageProfile {
    line_comments: &["//"],
    block_comment: Some(("/*", "*/")),
    import_prefixes: &["use ", "extern crate ", "mod ", "pub use ", "pub mod "],
    type_prefixes: &["struct ", "enum ", "trait ", "type ", "union ", "pub struct ", "pub enum ", "pub trait ", "pub type "],
    control_prefixes: &[
        "if ", "else", "for ", "while ", "loop", "match ", "return", "break", "continue", "}",
    ],
    declaration_prefixes: &[
        "fn ", "pub fn ", "pub(crate) fn ", "async fn ", "pub async fn ", "impl ", "impl<",
        "const ", "static ", "let ", "macro_rules!",
    ],
};

static PYTHON: LanguageProfile = LanguageProfile {
    line_comments: &["#"],
    block_comment: None,
    import_prefixes: &["import ", "from "],
    type_prefixes: &["class "],
    control_prefixes: &[
        "if ", "elif ", "else", "for ", "while ", "try", "except", "finally", "with ", "return",
        "raise ", "break", "continue", "yield",
    ],
    declaration_prefixes: &["def ", "async def ", "class ", "@"],
};

static GO: LanguageProfile = LanguageProfile {
    line_comments: &["//"],
    block_comment: Some(("/*", "*/")),
    import_prefixes: &["import ", "import(", "package "],
    type_prefixes: &["type "],
    control_prefixes: &[
        "if ", "else", "for ", "switch ", "case ", "select", "return", "defer ", "go ", "break",
        "continue", "}",
    ],
    declaration_prefixes: &["func ", "var ", "const "],
};

/// Unknown languages: every common comment marker, generic structure.
static DEFAULT: LanguageProfile = LanguageProfile {
    line_comments: &["//", "#"],
    block_comment: Some(("/*", "*/")),
    import_prefixes: &["import ", "use ", "from ", "#include", "require("],
    type_prefixes: &["type ", "interface ", "struct ", "enum ", "class "],
    control_prefixes: &[
        "if ", "else", "for ", "while ", "switch ", "match ", "case ", "try", "catch", "return",
        "}",
    ],
    declaration_prefixes: &["fn ", "def ", "function ", "class ", "const ", "let ", "var "],
};

fn profile_for(language: Language) -> &'static LanguageProfile {
    match language {
        Language::Typescript
        | Language::Javascript
        | Language::Java
        | Language::C
        | Language::Cpp
        | Language::Csharp => &C_LIKE,
        Language::Rust => &RUST,
        Language::Python => &PYTHON,
        Language::Go => &GO,
        Language::Unknown => &DEFAULT,
    }
}

/// Multi-level token-budget compressor.
#[derive(Debug, Clone)]
pub struct AdaptiveCompressor {
    levels: Vec<CompressionLevel>,
    counter: TokenCounter,
}

impl Default for AdaptiveCompressor {
    fn default() -> Self {
        Self::new(&CompressorConfig::default())
    }
}

impl AdaptiveCompressor {
    pub fn new(config: &CompressorConfig) -> Self {
        let mut levels: Vec<CompressionLevel> =
            config.levels.iter().map(|l| CompressionLevel::from(*l)).collect();
        levels.sort();
        levels.dedup();
        Self {
            levels,
            counter: TokenCounter::new(),
        }
    }

    /// Compress one chunk toward `target_tokens`.
    ///
    /// Already-fitting content returns unchanged at Light with ratio 1.0.
    /// Otherwise levels are attempted lightest-first and the first output
    /// within `target + 10%` wins. When nothing fits, the signature alone is
    /// returned as a success; `success = false` only when no signature is
    /// recoverable either.
    pub fn compress(
        &self,
        chunk: &CodeChunk,
        target_tokens: usize,
        opts: &OptimizationOptions,
    ) -> CompressedChunk {
        let original_tokens = self.counter.estimate_code(&chunk.content);

        if original_tokens <= target_tokens {
            return self.result(chunk, CompressionLevel::Light, chunk.content.clone(), original_tokens);
        }

        let slack_target = target_tokens + target_tokens / 10;

        for level in &self.levels {
            let output = self.apply(*level, chunk, opts);
            let tokens = self.counter.estimate_code(&output);
            if !output.trim().is_empty() && tokens <= slack_target {
                debug!(
                    "Compressed '{}' at {} ({} -> {} tokens)",
                    chunk.id, level, original_tokens, tokens
                );
                return self.result(chunk, *level, output, original_tokens);
            }
        }

        // Even the strongest enabled level is over target: fall back to the
        // signature, which is a success whenever one exists
        let signature = self.apply(CompressionLevel::SignatureOnly, chunk, opts);
        if signature.trim().is_empty() {
            return CompressedChunk {
                source: chunk.clone(),
                level: CompressionLevel::SignatureOnly,
                content: String::new(),
                original_tokens,
                compressed_tokens: 0,
                compression_ratio: original_tokens as f64,
                success: false,
            };
        }
        self.result(chunk, CompressionLevel::SignatureOnly, signature, original_tokens)
    }

    /// Compress a batch toward a shared per-chunk target.
    pub fn compress_batch(
        &self,
        chunks: &[CodeChunk],
        target_tokens: usize,
        opts: &OptimizationOptions,
    ) -> Vec<CompressedChunk> {
        chunks
            .par_iter()
            .map(|chunk| self.compress(chunk, target_tokens, opts))
            .collect()
    }

    fn result(
        &self,
        chunk: &CodeChunk,
        level: CompressionLevel,
        content: String,
        original_tokens: usize,
    ) -> CompressedChunk {
        let compressed_tokens = self.counter.estimate_code(&content);
        CompressedChunk {
            source: chunk.clone(),
            level,
            content,
            original_tokens,
            compressed_tokens,
            compression_ratio: original_tokens as f64 / compressed_tokens.max(1) as f64,
            success: true,
        }
    }

    fn apply(&self, level: CompressionLevel, chunk: &CodeChunk, opts: &OptimizationOptions) -> String {
        let profile = profile_for(chunk.language);
        match level {
            CompressionLevel::Light => light(&chunk.content, profile),
            CompressionLevel::Medium => medium(&chunk.content, profile),
            CompressionLevel::Aggressive => aggressive(chunk, profile, opts),
            CompressionLevel::SignatureOnly => signature_only(chunk, profile),
        }
    }
}

/// Light: remove comments, collapse blank-line runs to one, trim trailing
/// whitespace.
fn light(content: &str, profile: &LanguageProfile) -> String {
    let without_blocks = strip_block_comments(content, profile);

    let mut out: Vec<String> = Vec::new();
    let mut previous_blank = false;
    for line in without_blocks.lines() {
        let stripped = strip_line_comment(line, profile);
        let stripped = stripped.trim_end();

        // A line that was pure comment disappears entirely
        if stripped.is_empty() && !line.trim().is_empty() && is_comment_line(line, profile) {
            continue;
        }

        if stripped.is_empty() {
            if previous_blank {
                continue;
            }
            previous_blank = true;
            out.push(String::new());
        } else {
            previous_blank = false;
            out.push(stripped.to_string());
        }
    }

    // No leading or trailing blank lines
    while out.first().is_some_and(|l| l.is_empty()) {
        out.remove(0);
    }
    while out.last().is_some_and(|l| l.is_empty()) {
        out.pop();
    }
    out.join("\n")
}

/// Medium: Light + collapse in-line whitespace runs (outside strings) and
/// drop every blank line.
fn medium(content: &str, profile: &LanguageProfile) -> String {
    light(content, profile)
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(collapse_whitespace)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Aggressive: signature plus structural lines only.
fn aggressive(chunk: &CodeChunk, profile: &LanguageProfile, opts: &OptimizationOptions) -> String {
    let cleaned = medium(&chunk.content, profile);
    let signature_line = signature_only(chunk, profile);

    let mut kept: Vec<&str> = Vec::new();
    for line in cleaned.lines() {
        let trimmed = line.trim_start();

        let is_signature = !signature_line.is_empty() && signature_line.lines().any(|s| s.trim() == line.trim());
        let is_declaration = starts_with_any(trimmed, profile.declaration_prefixes);
        let is_control = starts_with_any(trimmed, profile.control_prefixes);
        let is_import = starts_with_any(trimmed, profile.import_prefixes);
        let is_type = starts_with_any(trimmed, profile.type_prefixes);

        let keep = is_signature
            || is_declaration
            || is_control
            || (opts.preserve_imports && is_import)
            || (opts.preserve_types && is_type);
        if keep {
            kept.push(line);
        }
    }

    if kept.is_empty() {
        signature_line
    } else {
        kept.join("\n")
    }
}

/// SignatureOnly: the parser-supplied signature, or the first non-blank
/// non-comment line that ends in `{`, `:`, or `=>`.
fn signature_only(chunk: &CodeChunk, profile: &LanguageProfile) -> String {
    if let Some(ref signature) = chunk.signature {
        return signature.clone();
    }

    for line in chunk.content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || is_comment_line(line, profile) {
            continue;
        }
        if trimmed.ends_with('{') || trimmed.ends_with(':') || trimmed.ends_with("=>") {
            return trimmed.to_string();
        }
    }
    String::new()
}

fn starts_with_any(line: &str, prefixes: &[&str]) -> bool {
    prefixes.iter().any(|p| line.starts_with(p))
}

fn is_comment_line(line: &str, profile: &LanguageProfile) -> bool {
    let trimmed = line.trim_start();
    profile.line_comments.iter().any(|m| trimmed.starts_with(m))
        || profile
            .block_comment
            .is_some_and(|(open, _)| trimmed.starts_with(open))
        || trimmed.starts_with('*')
}

/// Remove block comments with a quote-aware scan.
fn strip_block_comments(content: &str, profile: &LanguageProfile) -> String {
    let Some((open, close)) = profile.block_comment else {
        return content.to_string();
    };

    let mut out = String::with_capacity(content.len());
    let mut in_string: Option<char> = None;
    let mut escaped = false;
    let mut i = 0;

    while i < content.len() {
        let rest = &content[i..];
        let Some(c) = rest.chars().next() else { break };

        if let Some(quote) = in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == quote {
                in_string = None;
            }
            i += c.len_utf8();
            continue;
        }

        if c == '"' || c == '\'' || c == '`' {
            in_string = Some(c);
            out.push(c);
            i += c.len_utf8();
            continue;
        }

        if rest.starts_with(open) {
            // Skip to the terminator, keeping line structure
            match rest[open.len()..].find(close) {
                Some(end) => {
                    let skipped = &rest[..open.len() + end + close.len()];
                    for _ in skipped.matches('\n') {
                        out.push('\n');
                    }
                    i += open.len() + end + close.len();
                }
                None => break, // Unterminated comment: drop the remainder
            }
            continue;
        }

        out.push(c);
        i += c.len_utf8();
    }

    out
}

/// Strip a trailing line comment with a quote-aware scan; returns the code
/// part of the line.
fn strip_line_comment<'a>(line: &'a str, profile: &LanguageProfile) -> &'a str {
    let mut in_string: Option<char> = None;
    let mut escaped = false;
    let mut i = 0;

    while i < line.len() {
        let rest = &line[i..];
        let Some(c) = rest.chars().next() else { break };

        if let Some(quote) = in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == quote {
                in_string = None;
            }
            i += c.len_utf8();
            continue;
        }

        if c == '"' || c == '\'' || c == '`' {
            in_string = Some(c);
            i += c.len_utf8();
            continue;
        }

        if profile.line_comments.iter().any(|m| rest.starts_with(m)) {
            return &line[..i];
        }
        i += c.len_utf8();
    }
    line
}

/// Collapse runs of spaces and tabs to one space, outside string literals.
/// Leading indentation is preserved as a single unit of the original.
fn collapse_whitespace(line: &str) -> String {
    let indent_len = line.len() - line.trim_start().len();
    let (indent, rest) = line.split_at(indent_len);

    let mut out = String::with_capacity(line.len());
    out.push_str(indent);

    let mut in_string: Option<char> = None;
    let mut last_was_space = false;
    let mut chars = rest.chars();
    while let Some(c) = chars.next() {
        if let Some(quote) = in_string {
            out.push(c);
            if c == '\\' {
                if let Some(next) = chars.next() {
                    out.push(next);
                }
                continue;
            }
            if c == quote {
                in_string = None;
            }
            continue;
        }

        match c {
            '"' | '\'' | '`' => {
                in_string = Some(c);
                last_was_space = false;
                out.push(c);
            }
            ' ' | '\t' => {
                if !last_was_space {
                    out.push(' ');
                    last_was_space = true;
                }
            }
            _ => {
                last_was_space = false;
                out.push(c);
            }
        }
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn compressor() -> AdaptiveCompressor {
        AdaptiveCompressor::default()
    }

    fn opts() -> OptimizationOptions {
        OptimizationOptions::default()
    }

    fn ts_chunk(content: &str) -> CodeChunk {
        CodeChunk::new("c", "src/a.ts", content, 1, 40, Language::Typescript)
    }

    #[test]
    fn test_already_fitting_returns_unchanged() {
        let chunk = ts_chunk("function login(u, p) { return auth(u, p); }");
        let result = compressor().compress(&chunk, 1_000, &opts());

        assert_eq!(result.level, CompressionLevel::Light);
        assert_eq!(result.content, chunk.content);
        assert_eq!(result.compression_ratio, 1.0);
        assert!(result.success);
        assert_eq!(result.compressed_tokens, result.original_tokens);
    }

    #[test]
    fn test_light_strips_comments_and_blank_runs() {
        let content = "\
// entry point
function login(u, p) {

  /* block
     comment */


  return auth(u, p); // inline note
}";
        let result = light(content, profile_for(Language::Typescript));
        assert_eq!(
            result,
            "function login(u, p) {\n\n  return auth(u, p);\n}"
        );
    }

    #[test]
    fn test_light_keeps_comment_markers_inside_strings() {
        let content = "const url = \"https://example.com\"; // real comment";
        let result = light(content, profile_for(Language::Typescript));
        assert_eq!(result, "const url = \"https://example.com\";");
    }

    #[test]
    fn test_medium_collapses_whitespace_outside_strings() {
        let content = "const   msg   =   \"two  spaces\";\n\nlet  x  =  1;";
        let result = medium(content, profile_for(Language::Typescript));
        assert_eq!(result, "const msg = \"two  spaces\";\nlet x = 1;");
    }

    #[test]
    fn test_python_profile_hash_comments() {
        let content = "# top comment\ndef login(user):\n    # body comment\n    return auth(user)";
        let result = light(content, profile_for(Language::Python));
        assert_eq!(result, "def login(user):\n    return auth(user)");
    }

    #[test]
    fn test_aggressive_keeps_structure_drops_bodies() {
        let mut lines = vec!["function login(u, p) {".to_string()];
        for i in 0..30 {
            lines.push(format!("  const tmp{i} = transform(input{i}, {i});"));
        }
        lines.push("  if (!valid) {".to_string());
        lines.push("    audit(u);".to_string());
        lines.push("  }".to_string());
        lines.push("  return session;".to_string());
        lines.push("}".to_string());
        let chunk = ts_chunk(&lines.join("\n"));

        let profile = profile_for(Language::Typescript);
        let result = aggressive(&chunk, profile, &opts());

        assert!(result.contains("function login(u, p) {"));
        assert!(result.contains("if (!valid) {"));
        assert!(result.contains("return session;"));
        assert!(!result.contains("audit(u);"));
        // `const` declarations are structural in the C-like profile; the
        // bodies they bind stay, so check a plain call was dropped instead
    }

    #[test]
    fn test_compression_descent_reaches_target() {
        // ~400 code tokens of plain calls that only Aggressive can shed
        let mut lines = vec!["function login(u, p) {".to_string()];
        for i in 0..55 {
            lines.push(format!("  validate(normalize(input{i}), schema{i});"));
        }
        lines.push("  return createSession(u);".to_string());
        lines.push("}".to_string());
        let chunk = ts_chunk(&lines.join("\n")).with_signature("function login(u, p) { ... }");

        let result = compressor().compress(&chunk, 100, &opts());

        assert!(result.success);
        assert!(
            result.level == CompressionLevel::Medium || result.level == CompressionLevel::Aggressive,
            "got {}",
            result.level
        );
        assert!(result.compressed_tokens <= 110, "got {}", result.compressed_tokens);
        assert!(result.content.contains("function login"));
        assert!(result.compression_ratio >= 1.0);
    }

    #[test]
    fn test_signature_only_fallback() {
        // ~2000 code tokens of structural lines Aggressive cannot shed
        let mut lines = vec!["function handler(req, res) {".to_string()];
        for i in 0..150 {
            lines.push(format!("  if (routes[{i}].matches(req)) return dispatch_{i}(req, res);"));
        }
        lines.push("}".to_string());
        let chunk = ts_chunk(&lines.join("\n")).with_signature("function handler(req, res) {");

        let result = compressor().compress(&chunk, 20, &opts());

        assert_eq!(result.level, CompressionLevel::SignatureOnly);
        assert_eq!(result.content, "function handler(req, res) {");
        assert!(result.success);
    }

    #[test]
    fn test_signature_extracted_when_absent() {
        let chunk = ts_chunk("// header\nfunction extract(me) {\n  body();\n}");
        let profile = profile_for(Language::Typescript);
        assert_eq!(signature_only(&chunk, profile), "function extract(me) {");

        let python = CodeChunk::new("p", "a.py", "def run(x):\n    pass", 1, 2, Language::Python);
        assert_eq!(
            signature_only(&python, profile_for(Language::Python)),
            "def run(x):"
        );
    }

    #[test]
    fn test_unrecoverable_signature_fails() {
        // No line ends with a signature anchor and no signature is set
        let chunk = CodeChunk::new(
            "c",
            "notes.txt",
            &"data data data\n".repeat(50),
            1,
            50,
            Language::Unknown,
        );
        let result = compressor().compress(&chunk, 1, &opts());
        assert!(!result.success);
        assert!(result.content.is_empty());
        assert_eq!(result.compressed_tokens, 0);
    }

    #[test]
    fn test_preserve_imports_through_aggressive() {
        let content = "import { api } from \"./api\";\nfunction go() {\n  api.call();\n}";
        let chunk = ts_chunk(content);
        let profile = profile_for(Language::Typescript);

        let with_imports = aggressive(
            &chunk,
            profile,
            &OptimizationOptions {
                preserve_signatures: true,
                preserve_imports: true,
                preserve_types: false,
            },
        );
        assert!(with_imports.contains("import { api }"));
    }

    #[test]
    fn test_preserve_types_through_aggressive() {
        let content = "interface Session { id: string }\nfunction go() {\n  work();\n}";
        let chunk = ts_chunk(content);
        let profile = profile_for(Language::Typescript);

        let with_types = aggressive(
            &chunk,
            profile,
            &OptimizationOptions {
                preserve_signatures: true,
                preserve_imports: false,
                preserve_types: true,
            },
        );
        assert!(with_types.contains("interface Session"));

        let without_types = aggressive(&chunk, profile, &opts());
        assert!(!without_types.contains("interface Session"));
    }

    #[test]
    fn test_unknown_language_uses_default_profile() {
        let chunk = CodeChunk::new(
            "c",
            "a.xyz",
            "# hash comment\n// slash comment\ncode line {\n}",
            1,
            4,
            Language::Unknown,
        );
        let result = light(&chunk.content, profile_for(chunk.language));
        assert_eq!(result, "code line {\n}");
    }

    #[test]
    fn test_compress_batch_matches_individual() {
        let chunks = vec![
            ts_chunk("function a() { return 1; }"),
            ts_chunk("function b() { return 2; }"),
        ];
        let batch = compressor().compress_batch(&chunks, 1_000, &opts());
        assert_eq!(batch.len(), 2);
        assert!(batch.iter().all(|c| c.success && c.compression_ratio == 1.0));
    }

    #[test]
    fn test_ratio_at_least_one_on_success() {
        let mut lines = vec!["function dense() {".to_string()];
        for i in 0..40 {
            lines.push(format!("  // note {i}\n  act{i}();"));
        }
        lines.push("}".to_string());
        let chunk = ts_chunk(&lines.join("\n"));

        let result = compressor().compress(&chunk, 50, &opts());
        assert!(result.success);
        assert!(result.compression_ratio >= 1.0);
    }
}
