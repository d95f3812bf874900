//! Configuration loader with inheritance support.
//!
//! Loads configuration from multiple sources and merges them:
//! 1. Global config: `~/.prism/config.toml`
//! 2. Local config: `.prism/config.toml` (in workspace)
//! 3. Programmatic overrides
//!
//! Later sources override earlier ones.

use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::{
    BudgetConfig, CompressorConfig, ConfigOverrides, EmbeddingConfig, LoggingConfig,
    OptimizerConfig, PrismConfig, ProviderKind, ScoringConfig, SelectorConfig,
};

/// Configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Configuration directory name, shared by the global and local layers.
const CONFIG_DIR: &str = ".prism";

/// Configuration loader with caching and inheritance support.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Global config directory (e.g., `~/.prism`)
    global_config_dir: Option<PathBuf>,

    /// Cached global config
    global_config: Option<PrismConfig>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader.
    ///
    /// Automatically detects the global config directory (`~/.prism`).
    pub fn new() -> Self {
        let global_config_dir = dirs::home_dir().map(|h| h.join(CONFIG_DIR));

        Self {
            global_config_dir,
            global_config: None,
        }
    }

    /// Create a loader with a custom global config directory.
    ///
    /// Useful for testing.
    pub fn with_global_dir(global_dir: impl Into<PathBuf>) -> Self {
        Self {
            global_config_dir: Some(global_dir.into()),
            global_config: None,
        }
    }

    /// Get the global config file path.
    pub fn global_config_path(&self) -> Option<PathBuf> {
        self.global_config_dir
            .as_ref()
            .map(|d| d.join(CONFIG_FILE_NAME))
    }

    /// Get the local config file path for a workspace.
    pub fn local_config_path(&self, workspace_root: &Path) -> PathBuf {
        workspace_root.join(CONFIG_DIR).join(CONFIG_FILE_NAME)
    }

    /// Load configuration for a workspace with optional overrides.
    ///
    /// Merges config in order: global → local → overrides, then validates
    /// the merged result.
    pub fn load(
        &mut self,
        workspace_root: &Path,
        overrides: Option<&ConfigOverrides>,
    ) -> Result<PrismConfig, ConfigError> {
        let mut config = PrismConfig::default();

        if let Some(global_config) = self.load_global()? {
            config = merge_configs(config, global_config);
        }

        if let Some(local_config) = self.load_local(workspace_root)? {
            config = merge_configs(config, local_config);
        }

        if let Some(ovr) = overrides {
            config.apply_overrides(ovr);
        }

        config.validate()?;
        Ok(config)
    }

    /// Load only the global configuration.
    pub fn load_global(&mut self) -> Result<Option<PrismConfig>, ConfigError> {
        if let Some(ref config) = self.global_config {
            return Ok(Some(config.clone()));
        }

        let Some(global_path) = self.global_config_path() else {
            debug!("No home directory found, skipping global config");
            return Ok(None);
        };

        if !global_path.exists() {
            trace!("Global config not found at {:?}", global_path);
            return Ok(None);
        }

        debug!("Loading global config from {:?}", global_path);
        let config = load_config_file(&global_path)?;
        self.global_config = Some(config.clone());

        Ok(Some(config))
    }

    /// Load only the local configuration for a workspace.
    pub fn load_local(&self, workspace_root: &Path) -> Result<Option<PrismConfig>, ConfigError> {
        let local_path = self.local_config_path(workspace_root);

        if !local_path.exists() {
            trace!("Local config not found at {:?}", local_path);
            return Ok(None);
        }

        debug!("Loading local config from {:?}", local_path);
        load_config_file(&local_path).map(Some)
    }

    /// Save configuration to the global config file.
    pub fn save_global(&self, config: &PrismConfig) -> Result<(), ConfigError> {
        let Some(ref global_dir) = self.global_config_dir else {
            return Err(ConfigError::NoHomeDir);
        };

        let global_path = global_dir.join(CONFIG_FILE_NAME);
        save_config_file(&global_path, config)
    }

    /// Save configuration to the local config file for a workspace.
    pub fn save_local(
        &self,
        workspace_root: &Path,
        config: &PrismConfig,
    ) -> Result<(), ConfigError> {
        let local_path = self.local_config_path(workspace_root);
        save_config_file(&local_path, config)
    }

    /// Clear cached global configuration.
    ///
    /// Forces reload on next `load_global()` call.
    pub fn clear_cache(&mut self) {
        self.global_config = None;
    }
}

/// Load a configuration file from disk.
fn load_config_file(path: &Path) -> Result<PrismConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;

    toml::from_str(&content).map_err(|e| ConfigError::parse_toml(path, e))
}

/// Save a configuration file to disk.
fn save_config_file(path: &Path, config: &PrismConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
        }
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))
}

/// Merge two configurations, with `overlay` taking precedence.
///
/// This performs a field-by-field merge, allowing partial configs. A field
/// in the overlay wins when it differs from the compiled-in default.
fn merge_configs(base: PrismConfig, overlay: PrismConfig) -> PrismConfig {
    PrismConfig {
        scoring: merge_scoring(base.scoring, overlay.scoring),
        selector: merge_section(base.selector, overlay.selector, SelectorConfig::default()),
        compressor: merge_compressor(base.compressor, overlay.compressor),
        optimizer: merge_section(base.optimizer, overlay.optimizer, OptimizerConfig::default()),
        embedding: merge_embedding(base.embedding, overlay.embedding),
        budget: merge_budget(base.budget, overlay.budget),
        logging: merge_logging(base.logging, overlay.logging),
    }
}

/// Whole-section merge for sections small enough that partial overlays are
/// not worth distinguishing: the overlay wins when it differs from default.
fn merge_section<T: PartialEq>(base: T, overlay: T, default: T) -> T {
    if overlay != default {
        overlay
    } else {
        base
    }
}

fn merge_scoring(base: ScoringConfig, overlay: ScoringConfig) -> ScoringConfig {
    let default = ScoringConfig::default();
    ScoringConfig {
        weights: merge_section(base.weights, overlay.weights, default.weights),
        cache: merge_section(base.cache, overlay.cache, default.cache),
        parallelism: if overlay.parallelism != default.parallelism {
            overlay.parallelism
        } else {
            base.parallelism
        },
    }
}

fn merge_compressor(base: CompressorConfig, overlay: CompressorConfig) -> CompressorConfig {
    let default = CompressorConfig::default();
    CompressorConfig {
        levels: if overlay.levels != default.levels {
            overlay.levels
        } else {
            base.levels
        },
        preserve_signatures: if overlay.preserve_signatures != default.preserve_signatures {
            overlay.preserve_signatures
        } else {
            base.preserve_signatures
        },
    }
}

fn merge_embedding(base: EmbeddingConfig, overlay: EmbeddingConfig) -> EmbeddingConfig {
    let default = EmbeddingConfig::default();
    EmbeddingConfig {
        provider: if overlay.provider != ProviderKind::default() {
            overlay.provider
        } else {
            base.provider
        },
        cloudflare: overlay.cloudflare.or(base.cloudflare),
        dimension: if overlay.dimension != default.dimension {
            overlay.dimension
        } else {
            base.dimension
        },
        batch_size: if overlay.batch_size != default.batch_size {
            overlay.batch_size
        } else {
            base.batch_size
        },
        max_text_chars: if overlay.max_text_chars != default.max_text_chars {
            overlay.max_text_chars
        } else {
            base.max_text_chars
        },
        max_batch_size: if overlay.max_batch_size != default.max_batch_size {
            overlay.max_batch_size
        } else {
            base.max_batch_size
        },
        inter_batch_delay_ms: if overlay.inter_batch_delay_ms != default.inter_batch_delay_ms {
            overlay.inter_batch_delay_ms
        } else {
            base.inter_batch_delay_ms
        },
        timeout_ms: if overlay.timeout_ms != default.timeout_ms {
            overlay.timeout_ms
        } else {
            base.timeout_ms
        },
    }
}

fn merge_budget(base: BudgetConfig, overlay: BudgetConfig) -> BudgetConfig {
    let default = BudgetConfig::default();
    BudgetConfig {
        daily_neurons: if overlay.daily_neurons != default.daily_neurons {
            overlay.daily_neurons
        } else {
            base.daily_neurons
        },
        warning_threshold: if overlay.warning_threshold != default.warning_threshold {
            overlay.warning_threshold
        } else {
            base.warning_threshold
        },
        // Model costs extend rather than replace: overlay entries win per key
        cost_per_million: {
            let mut costs = base.cost_per_million;
            costs.extend(overlay.cost_per_million);
            costs
        },
        default_cost_per_million: if overlay.default_cost_per_million
            != default.default_cost_per_million
        {
            overlay.default_cost_per_million
        } else {
            base.default_cost_per_million
        },
    }
}

fn merge_logging(base: LoggingConfig, overlay: LoggingConfig) -> LoggingConfig {
    LoggingConfig {
        level: if overlay.level != "info" {
            overlay.level
        } else {
            base.level
        },
        file: overlay.file.or(base.file),
    }
}
