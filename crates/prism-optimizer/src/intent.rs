//! Query intent detection
//!
//! Rule-based classification over lowercased query tokens against fixed
//! per-intent lexicons, with ties broken by the declaration order of
//! [`IntentKind`]. Entity extraction runs in a fixed order: backtick
//! identifiers, file-extension tokens, capitalized type names not at
//! sentence start, then technical keywords. Scope, complexity, history
//! need, a token budget hint, and per-intent compression options round out
//! the [`Intent`].
//!
//! Nothing here touches the network or the index; detection is pure string
//! work and runs first in every pipeline.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use prism_core::ScoringContext;

/// Query intent categories, in tie-break priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    BugFix,
    FeatureAdd,
    Explain,
    Refactor,
    Test,
    Search,
    General,
}

impl std::fmt::Display for IntentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            IntentKind::BugFix => "bug_fix",
            IntentKind::FeatureAdd => "feature_add",
            IntentKind::Explain => "explain",
            IntentKind::Refactor => "refactor",
            IntentKind::Test => "test",
            IntentKind::Search => "search",
            IntentKind::General => "general",
        };
        write!(f, "{}", s)
    }
}

/// Retrieval scope inferred for the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    CurrentFile,
    CurrentDir,
    Project,
    Global,
}

/// Entities extracted from the query text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Entities {
    /// Identifiers delimited by backticks
    pub symbols: Vec<String>,
    /// Tokens that look like file names
    pub files: Vec<String>,
    /// Capitalized type-like tokens
    pub types: Vec<String>,
    /// Tokens from the technical lexicon
    pub keywords: Vec<String>,
}

impl Entities {
    pub fn total(&self) -> usize {
        self.symbols.len() + self.files.len() + self.types.len() + self.keywords.len()
    }
}

/// Compression options the optimizer forwards per intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OptimizationOptions {
    pub preserve_signatures: bool,
    pub preserve_imports: bool,
    pub preserve_types: bool,
}

impl Default for OptimizationOptions {
    fn default() -> Self {
        Self {
            preserve_signatures: true,
            preserve_imports: false,
            preserve_types: false,
        }
    }
}

/// Classified intent for one query.
#[derive(Debug, Clone)]
pub struct Intent {
    pub kind: IntentKind,
    pub entities: Entities,
    pub scope: Scope,
    /// Query complexity in [0, 1], from length, term diversity, and
    /// entity count
    pub complexity: f64,
    /// Whether the query leans on prior conversation turns
    pub needs_history: bool,
    /// Suggested token budget from the (kind, scope) lookup table
    pub estimated_budget: usize,
    pub options: OptimizationOptions,
}

const BUG_FIX_TERMS: &[&str] = &[
    "fix", "bug", "error", "crash", "broken", "fails", "failing", "failure", "issue", "defect",
    "regression", "panic", "exception", "wrong",
];

const FEATURE_ADD_TERMS: &[&str] = &[
    "add", "implement", "create", "new", "support", "feature", "introduce", "build", "extend",
];

const EXPLAIN_TERMS: &[&str] = &[
    "explain", "what", "how", "why", "describe", "understand", "meaning", "document",
    "documentation", "overview",
];

const REFACTOR_TERMS: &[&str] = &[
    "refactor", "clean", "cleanup", "simplify", "rename", "restructure", "extract", "reorganize",
    "improve", "dedupe",
];

const TEST_TERMS: &[&str] = &[
    "test", "tests", "testing", "unittest", "coverage", "assert", "mock", "spec", "fixture",
];

const SEARCH_TERMS: &[&str] = &[
    "find", "search", "where", "locate", "lookup", "list", "show", "usages", "references",
];

/// Technical lexicon for keyword entities.
const TECHNICAL_TERMS: &[&str] = &[
    "async", "await", "api", "auth", "authentication", "authorization", "cache", "concurrency",
    "config", "database", "embedding", "endpoint", "http", "index", "middleware", "mutex",
    "parser", "queue", "schema", "serialization", "session", "thread", "token", "vector",
];

/// Cross-cutting phrases that widen scope to global.
const GLOBAL_MARKERS: &[&str] = &[
    "entire", "whole", "everywhere", "across", "codebase", "project-wide", "global", "all files",
];

/// Anaphora and follow-up markers that require history.
const HISTORY_TOKENS: &[&str] = &["it", "that", "them", "they", "those"];
const HISTORY_PHRASES: &[&str] = &[
    "again",
    "as before",
    "as discussed",
    "earlier",
    "previous",
    "follow up",
    "also",
];

static BACKTICK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"`([^`]+)`").expect("static regex"));

static FILE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?x) \b [\w./-]+ \. (?:ts|tsx|js|jsx|py|rs|go|java|c|h|cpp|hpp|cs) \b")
        .expect("static regex")
});

/// Rule-based intent detector. Stateless and cheap to share.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntentDetector;

impl IntentDetector {
    pub fn new() -> Self {
        Self
    }

    /// Classify a query in context.
    pub fn detect(&self, query: &str, context: &ScoringContext) -> Intent {
        let lowered = query.to_lowercase();
        let tokens: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric() && c != '_' && c != '-')
            .filter(|t| !t.is_empty())
            .collect();

        let kind = classify(&tokens);
        let entities = extract_entities(query, &lowered);
        let scope = infer_scope(&lowered, &entities, context);
        let complexity = complexity(&tokens, &entities);
        let needs_history = needs_history(&lowered, &tokens);
        let estimated_budget = budget_for(kind, scope);
        let options = options_for(kind);

        Intent {
            kind,
            entities,
            scope,
            complexity,
            needs_history,
            estimated_budget,
            options,
        }
    }
}

/// Count lexicon hits per intent; the highest count wins, ties broken by
/// declaration order.
fn classify(tokens: &[&str]) -> IntentKind {
    let lexicons: [(IntentKind, &[&str]); 6] = [
        (IntentKind::BugFix, BUG_FIX_TERMS),
        (IntentKind::FeatureAdd, FEATURE_ADD_TERMS),
        (IntentKind::Explain, EXPLAIN_TERMS),
        (IntentKind::Refactor, REFACTOR_TERMS),
        (IntentKind::Test, TEST_TERMS),
        (IntentKind::Search, SEARCH_TERMS),
    ];

    let mut best = IntentKind::General;
    let mut best_count = 0usize;
    for (kind, lexicon) in lexicons {
        let count = tokens.iter().filter(|t| lexicon.contains(*t)).count();
        if count > best_count {
            best = kind;
            best_count = count;
        }
    }
    best
}

fn extract_entities(query: &str, lowered: &str) -> Entities {
    let mut entities = Entities::default();
    let mut seen: HashSet<String> = HashSet::new();

    // 1. Backtick-delimited identifiers
    for capture in BACKTICK_RE.captures_iter(query) {
        let symbol = capture[1].trim().to_string();
        if !symbol.is_empty() && seen.insert(symbol.clone()) {
            entities.symbols.push(symbol);
        }
    }

    // 2. File-looking tokens
    for m in FILE_RE.find_iter(query) {
        let file = m.as_str().to_string();
        if seen.insert(file.clone()) {
            entities.files.push(file);
        }
    }

    // 3. Capitalized multi-char tokens not at sentence start
    let mut sentence_start = true;
    for raw in query.split_whitespace() {
        let word = raw.trim_matches(|c: char| !c.is_alphanumeric() && c != '_');
        let at_start = sentence_start;
        sentence_start = raw.ends_with(['.', '!', '?']);

        if at_start || word.len() < 2 {
            continue;
        }
        let mut chars = word.chars();
        let first_upper = chars.next().is_some_and(|c| c.is_uppercase());
        let has_lower = word.chars().any(|c| c.is_lowercase());
        if first_upper && has_lower && seen.insert(word.to_string()) {
            entities.types.push(word.to_string());
        }
    }

    // 4. Technical lexicon keywords
    for token in lowered.split(|c: char| !c.is_alphanumeric() && c != '_') {
        if TECHNICAL_TERMS.contains(&token) && seen.insert(token.to_string()) {
            entities.keywords.push(token.to_string());
        }
    }

    entities
}

fn infer_scope(lowered: &str, entities: &Entities, context: &ScoringContext) -> Scope {
    // Explicit reference to the focused file
    if lowered.contains("this file") {
        return Scope::CurrentFile;
    }
    if let Some(ref current) = context.current_file {
        let basename = current.rsplit('/').next().unwrap_or(current);
        if entities.files.len() == 1
            && (entities.files[0] == *current || entities.files[0] == basename)
        {
            return Scope::CurrentFile;
        }

        // Multiple referenced files inside the current directory
        if entities.files.len() > 1 {
            if let Some(ref dir) = context.current_directory {
                let prefix = format!("{}/", dir);
                if entities.files.iter().all(|f| f.starts_with(&prefix)) {
                    return Scope::CurrentDir;
                }
            }
        }
    }

    if GLOBAL_MARKERS.iter().any(|m| lowered.contains(m)) {
        return Scope::Global;
    }

    Scope::Project
}

/// Complexity from query length, term diversity, and entity count.
fn complexity(tokens: &[&str], entities: &Entities) -> f64 {
    if tokens.is_empty() {
        return 0.0;
    }
    let length_factor = (tokens.len() as f64 / 30.0).min(1.0);
    let unique: HashSet<&&str> = tokens.iter().collect();
    let diversity = unique.len() as f64 / tokens.len() as f64;
    let entity_factor = (entities.total() as f64 / 5.0).min(1.0);

    (0.5 * length_factor + 0.2 * diversity + 0.3 * entity_factor).clamp(0.0, 1.0)
}

fn needs_history(lowered: &str, tokens: &[&str]) -> bool {
    if tokens.iter().any(|t| HISTORY_TOKENS.contains(t)) {
        return true;
    }
    HISTORY_PHRASES.iter().any(|p| lowered.contains(p))
}

/// Token budget lookup indexed by (kind, scope).
fn budget_for(kind: IntentKind, scope: Scope) -> usize {
    let base = match kind {
        IntentKind::BugFix => 4_000,
        IntentKind::FeatureAdd => 6_000,
        IntentKind::Explain => 3_000,
        IntentKind::Refactor => 5_000,
        IntentKind::Test => 3_500,
        IntentKind::Search => 2_000,
        IntentKind::General => 3_000,
    };
    match scope {
        Scope::CurrentFile => base / 2,
        Scope::CurrentDir => base * 3 / 4,
        Scope::Project => base,
        Scope::Global => base * 3 / 2,
    }
}

fn options_for(kind: IntentKind) -> OptimizationOptions {
    match kind {
        IntentKind::BugFix => OptimizationOptions {
            preserve_signatures: true,
            preserve_imports: true,
            preserve_types: false,
        },
        IntentKind::FeatureAdd | IntentKind::Refactor => OptimizationOptions {
            preserve_signatures: true,
            preserve_imports: true,
            preserve_types: true,
        },
        IntentKind::Explain => OptimizationOptions {
            preserve_signatures: true,
            preserve_imports: false,
            preserve_types: true,
        },
        IntentKind::Test => OptimizationOptions {
            preserve_signatures: true,
            preserve_imports: true,
            preserve_types: false,
        },
        IntentKind::Search | IntentKind::General => OptimizationOptions::default(),
    }
}
