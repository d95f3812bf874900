//! PRISM Configuration Management
//!
//! Provides configuration loading with support for:
//! - Global config: `~/.prism/config.toml`
//! - Local config: `.prism/config.toml` (in workspace)
//! - Programmatic overrides via `ConfigOverrides`
//!
//! Configuration is merged in order: global → local → overrides.

mod error;
mod loader;

pub use error::ConfigError;
pub use loader::ConfigLoader;

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Tolerance when checking that scorer weights sum to 1.0.
pub const WEIGHT_SUM_TOLERANCE: f64 = 0.01;

/// Root configuration for PRISM.
///
/// Represents the fully merged configuration from all sources.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PrismConfig {
    /// Relevance scoring configuration
    pub scoring: ScoringConfig,

    /// Budget-constrained chunk selection configuration
    pub selector: SelectorConfig,

    /// Adaptive compression configuration
    pub compressor: CompressorConfig,

    /// Token optimizer budget reserves
    pub optimizer: OptimizerConfig,

    /// Embedding client and provider configuration
    pub embedding: EmbeddingConfig,

    /// Daily remote quota configuration
    pub budget: BudgetConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl PrismConfig {
    /// Validate every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scoring.validate()?;
        self.selector.validate()?;
        self.optimizer.validate()?;
        self.embedding.validate()?;
        self.budget.validate()?;
        Ok(())
    }

    /// Apply programmatic overrides on top of the merged config.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(parallelism) = overrides.scoring_parallelism {
            self.scoring.parallelism = parallelism;
        }
        if let Some(enabled) = overrides.cache_enabled {
            self.scoring.cache.enabled = enabled;
        }
        if let Some(provider) = overrides.provider {
            self.embedding.provider = provider;
        }
        if let Some(neurons) = overrides.daily_neurons {
            self.budget.daily_neurons = neurons;
        }
        if let Some(ref level) = overrides.log_level {
            self.logging.level = level.clone();
        }
    }
}

/// Programmatic configuration overrides, applied last in the merge chain.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub scoring_parallelism: Option<usize>,
    pub cache_enabled: Option<bool>,
    pub provider: Option<ProviderKind>,
    pub daily_neurons: Option<f64>,
    pub log_level: Option<String>,
}

// =============================================================================
// Scoring
// =============================================================================

/// Relevance scoring configuration.
///
/// # Example TOML
///
/// ```toml
/// [scoring]
/// parallelism = 4
///
/// [scoring.weights]
/// semantic = 0.40
/// file_proximity = 0.20
/// symbol_match = 0.25
/// recency = 0.10
/// frequency = 0.05
///
/// [scoring.cache]
/// enabled = true
/// size = 10000
/// ttl_ms = 60000
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Weights for the canonical scorers; must sum to 1.0 (± 0.01)
    pub weights: ScoringWeights,

    /// Result cache settings
    pub cache: CacheConfig,

    /// Bounded parallelism for batch scoring
    pub parallelism: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: ScoringWeights::default(),
            cache: CacheConfig::default(),
            parallelism: 4,
        }
    }
}

impl ScoringConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sum = self.weights.sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ConfigError::ValidationError(format!(
                "scoring.weights must sum to 1.0 (±{}), got {:.4}",
                WEIGHT_SUM_TOLERANCE, sum
            )));
        }
        if self.weights.any_negative() {
            return Err(ConfigError::ValidationError(
                "scoring.weights must all be >= 0".to_string(),
            ));
        }
        if self.parallelism == 0 {
            return Err(ConfigError::ValidationError(
                "scoring.parallelism must be >= 1".to_string(),
            ));
        }
        if self.cache.enabled && self.cache.size == 0 {
            return Err(ConfigError::ValidationError(
                "scoring.cache.size must be >= 1 when the cache is enabled".to_string(),
            ));
        }
        Ok(())
    }
}

/// Weights for the five canonical scorers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScoringWeights {
    pub semantic: f64,
    pub file_proximity: f64,
    pub symbol_match: f64,
    pub recency: f64,
    pub frequency: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            semantic: 0.40,
            file_proximity: 0.20,
            symbol_match: 0.25,
            recency: 0.10,
            frequency: 0.05,
        }
    }
}

impl ScoringWeights {
    pub fn sum(&self) -> f64 {
        self.semantic + self.file_proximity + self.symbol_match + self.recency + self.frequency
    }

    fn any_negative(&self) -> bool {
        self.semantic < 0.0
            || self.file_proximity < 0.0
            || self.symbol_match < 0.0
            || self.recency < 0.0
            || self.frequency < 0.0
    }
}

/// Scoring result cache settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Maximum number of cached entries
    pub size: usize,
    /// Time-to-live per entry in milliseconds
    pub ttl_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            size: 10_000,
            ttl_ms: 60_000,
        }
    }
}

// =============================================================================
// Selector
// =============================================================================

/// Greedy chunk selection thresholds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SelectorConfig {
    /// Score above which a chunk may use the slack window
    pub high_value_threshold: f64,
    /// Fraction of the budget the selection may overshoot for high-value chunks
    pub slack_ratio: f64,
    /// Fraction of selected chunks sharing a directory that triggers
    /// diversity adjustment
    pub diversity_threshold: f64,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            high_value_threshold: 0.8,
            slack_ratio: 0.10,
            diversity_threshold: 0.60,
        }
    }
}

impl SelectorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.high_value_threshold) {
            return Err(ConfigError::ValidationError(
                "selector.high_value_threshold must be in [0, 1]".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.slack_ratio) {
            return Err(ConfigError::ValidationError(
                "selector.slack_ratio must be in [0, 1]".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.diversity_threshold) {
            return Err(ConfigError::ValidationError(
                "selector.diversity_threshold must be in [0, 1]".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Compressor
// =============================================================================

/// Compression level names, in descending order of preserved content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompressionLevelName {
    Light,
    Medium,
    Aggressive,
    SignatureOnly,
}

impl std::fmt::Display for CompressionLevelName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Light => write!(f, "light"),
            Self::Medium => write!(f, "medium"),
            Self::Aggressive => write!(f, "aggressive"),
            Self::SignatureOnly => write!(f, "signature-only"),
        }
    }
}

/// Adaptive compressor configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CompressorConfig {
    /// Enabled levels, attempted lightest-first; default all four
    pub levels: Vec<CompressionLevelName>,
    /// Keep signature lines through every level but signature-only extraction
    pub preserve_signatures: bool,
}

impl Default for CompressorConfig {
    fn default() -> Self {
        Self {
            levels: vec![
                CompressionLevelName::Light,
                CompressionLevelName::Medium,
                CompressionLevelName::Aggressive,
                CompressionLevelName::SignatureOnly,
            ],
            preserve_signatures: true,
        }
    }
}

// =============================================================================
// Optimizer
// =============================================================================

/// Token optimizer budget reserves, as fractions of the total budget.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Budget fraction reserved for the model's response
    pub response_reserve: f64,
    /// Budget fraction reserved for history when the intent needs it
    pub history_reserve: f64,
    /// Budget fraction reserved for the system preamble
    pub system_reserve: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            response_reserve: 0.20,
            history_reserve: 0.10,
            system_reserve: 0.05,
        }
    }
}

impl OptimizerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("response_reserve", self.response_reserve),
            ("history_reserve", self.history_reserve),
            ("system_reserve", self.system_reserve),
        ] {
            if !(0.0..1.0).contains(&value) {
                return Err(ConfigError::ValidationError(format!(
                    "optimizer.{} must be in [0, 1), got {}",
                    name, value
                )));
            }
        }
        let reserved = self.response_reserve + self.history_reserve + self.system_reserve;
        if reserved >= 1.0 {
            return Err(ConfigError::ValidationError(format!(
                "optimizer reserves leave no budget for chunks (sum {:.2})",
                reserved
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Embedding
// =============================================================================

/// Embedding provider type selection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    /// Cloudflare Workers AI (remote, paid in neurons)
    #[default]
    Cloudflare,
    /// Deterministic local hashed embedder (free fallback)
    Local,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cloudflare => write!(f, "cloudflare"),
            Self::Local => write!(f, "local"),
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cloudflare" | "cf" => Ok(Self::Cloudflare),
            "local" => Ok(Self::Local),
            _ => Err(ConfigError::ValidationError(format!(
                "Unknown embedding provider: '{}'. Valid values: cloudflare, local",
                s
            ))),
        }
    }
}

/// Cloudflare Workers AI provider settings.
///
/// The API token is read from the environment variable named by
/// `api_token_env`, never stored in the config file itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CloudflareSettings {
    /// Cloudflare account identifier
    pub account_id: String,
    /// Workers AI embedding model
    pub model: String,
    /// Environment variable holding the API token
    pub api_token_env: String,
    /// API base URL
    pub base_url: String,
    /// Maximum retry attempts for transient failures
    pub max_retries: u32,
}

impl Default for CloudflareSettings {
    fn default() -> Self {
        Self {
            account_id: String::new(),
            model: "@cf/baai/bge-small-en-v1.5".to_string(),
            api_token_env: "CLOUDFLARE_API_TOKEN".to_string(),
            base_url: "https://api.cloudflare.com/client/v4".to_string(),
            max_retries: 3,
        }
    }
}

/// Embedding client and provider configuration.
///
/// # Example TOML
///
/// ```toml
/// [embedding]
/// provider = "cloudflare"
/// dimension = 384
/// batch_size = 100
///
/// [embedding.cloudflare]
/// account_id = "abc123"
/// model = "@cf/baai/bge-small-en-v1.5"
/// api_token_env = "CLOUDFLARE_API_TOKEN"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Primary provider; the local embedder is always the fallback
    pub provider: ProviderKind,
    /// Cloudflare provider settings (required when provider = "cloudflare")
    pub cloudflare: Option<CloudflareSettings>,
    /// Embedding dimension shared by every vector in a store
    pub dimension: usize,
    /// Texts per provider request
    pub batch_size: usize,
    /// Maximum characters per single text
    pub max_text_chars: usize,
    /// Maximum items per embed_batch call
    pub max_batch_size: usize,
    /// Delay between provider requests in milliseconds
    pub inter_batch_delay_ms: u64,
    /// Per-batch request timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Cloudflare,
            cloudflare: None,
            dimension: 384,
            batch_size: 100,
            max_text_chars: 10_000,
            max_batch_size: 1_000,
            inter_batch_delay_ms: 100,
            timeout_ms: 30_000,
        }
    }
}

impl EmbeddingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dimension == 0 {
            return Err(ConfigError::ValidationError(
                "embedding.dimension must be >= 1".to_string(),
            ));
        }
        if self.batch_size == 0 || self.batch_size > self.max_batch_size {
            return Err(ConfigError::ValidationError(format!(
                "embedding.batch_size must be in [1, {}]",
                self.max_batch_size
            )));
        }
        if self.provider == ProviderKind::Cloudflare {
            // Settings may still come from the environment at provider
            // construction; only reject a present-but-empty section here.
            if let Some(ref cf) = self.cloudflare {
                if cf.account_id.is_empty() {
                    return Err(ConfigError::ValidationError(
                        "embedding.cloudflare.account_id is required".to_string(),
                    ));
                }
                if cf.model.is_empty() {
                    return Err(ConfigError::ValidationError(
                        "embedding.cloudflare.model is required".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

// =============================================================================
// Budget
// =============================================================================

/// Daily remote quota configuration, expressed in neurons.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BudgetConfig {
    /// Daily neuron allowance
    pub daily_neurons: f64,
    /// Fraction of the daily allowance at which a warning is emitted
    pub warning_threshold: f64,
    /// Neuron cost per million tokens, by model
    pub cost_per_million: HashMap<String, f64>,
    /// Cost assumed for models not listed in `cost_per_million`
    pub default_cost_per_million: f64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        let mut cost_per_million = HashMap::new();
        cost_per_million.insert("@cf/baai/bge-small-en-v1.5".to_string(), 1841.0);
        cost_per_million.insert("@cf/baai/bge-base-en-v1.5".to_string(), 6058.0);
        cost_per_million.insert("@cf/baai/bge-large-en-v1.5".to_string(), 12882.0);
        Self {
            daily_neurons: 10_000.0,
            warning_threshold: 0.80,
            cost_per_million,
            default_cost_per_million: 6058.0,
        }
    }
}

impl BudgetConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.daily_neurons <= 0.0 {
            return Err(ConfigError::ValidationError(
                "budget.daily_neurons must be > 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.warning_threshold) {
            return Err(ConfigError::ValidationError(
                "budget.warning_threshold must be in [0, 1]".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Logging
// =============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Optional log file path; stderr when unset
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config_is_valid() {
        let config = PrismConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_weights_sum_to_one() {
        let weights = ScoringWeights::default();
        assert!((weights.sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_weight_sum_tolerance() {
        let mut config = ScoringConfig::default();
        config.weights.semantic = 0.405; // sum = 1.005, inside tolerance
        assert!(config.validate().is_ok());

        config.weights.semantic = 0.50; // sum = 1.10, outside tolerance
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_negative_weight_rejected() {
        let mut config = ScoringConfig::default();
        config.weights.frequency = -0.05;
        config.weights.semantic = 0.50; // keep the sum at 1.0
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_parallelism_rejected() {
        let mut config = ScoringConfig::default();
        config.parallelism = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_optimizer_reserves_must_leave_chunk_budget() {
        let mut config = OptimizerConfig::default();
        config.response_reserve = 0.6;
        config.history_reserve = 0.3;
        config.system_reserve = 0.2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_provider_kind_parse() {
        assert_eq!(
            "cloudflare".parse::<ProviderKind>().unwrap(),
            ProviderKind::Cloudflare
        );
        assert_eq!("local".parse::<ProviderKind>().unwrap(), ProviderKind::Local);
        assert!("qdrant".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_cloudflare_section_requires_account() {
        let mut config = EmbeddingConfig::default();
        config.cloudflare = Some(CloudflareSettings::default());
        assert!(config.validate().is_err());

        config.cloudflare.as_mut().unwrap().account_id = "acct".into();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_batch_size_bounds() {
        let mut config = EmbeddingConfig::default();
        config.batch_size = 0;
        assert!(config.validate().is_err());

        config.batch_size = 2_000; // above max_batch_size
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_budget_validation() {
        let mut config = BudgetConfig::default();
        config.daily_neurons = 0.0;
        assert!(config.validate().is_err());

        config.daily_neurons = 100.0;
        config.warning_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_compression_level_display() {
        assert_eq!(CompressionLevelName::Light.to_string(), "light");
        assert_eq!(
            CompressionLevelName::SignatureOnly.to_string(),
            "signature-only"
        );
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = PrismConfig::default();
        let serialized = toml::to_string_pretty(&config).unwrap();
        let parsed: PrismConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.scoring.weights, config.scoring.weights);
        assert_eq!(parsed.embedding, config.embedding);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let parsed: PrismConfig = toml::from_str(
            r#"
            [scoring]
            parallelism = 8
            "#,
        )
        .unwrap();
        assert_eq!(parsed.scoring.parallelism, 8);
        assert_eq!(parsed.scoring.cache, CacheConfig::default());
        assert_eq!(parsed.selector, SelectorConfig::default());
    }

    #[test]
    fn test_apply_overrides() {
        let mut config = PrismConfig::default();
        let overrides = ConfigOverrides {
            scoring_parallelism: Some(16),
            cache_enabled: Some(false),
            provider: Some(ProviderKind::Local),
            daily_neurons: Some(500.0),
            log_level: Some("trace".to_string()),
        };
        config.apply_overrides(&overrides);

        assert_eq!(config.scoring.parallelism, 16);
        assert!(!config.scoring.cache.enabled);
        assert_eq!(config.embedding.provider, ProviderKind::Local);
        assert_eq!(config.budget.daily_neurons, 500.0);
        assert_eq!(config.logging.level, "trace");
    }
}
