//! Error types for prism-config

use std::path::Path;

use thiserror::Error;

/// Errors that can occur while loading or saving configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read a config file
    #[error("Failed to read config file {path}: {source}")]
    ReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write a config file
    #[error("Failed to write config file {path}: {source}")]
    WriteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create a config directory
    #[error("Failed to create config directory {path}: {source}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// TOML parse error
    #[error("Failed to parse {path}: {message}")]
    ParseToml { path: String, message: String },

    /// TOML serialization error
    #[error("Failed to serialize config: {0}")]
    SerializeToml(#[from] toml::ser::Error),

    /// No home directory available for global config
    #[error("No home directory found for global configuration")]
    NoHomeDir,

    /// Semantic validation failure
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl ConfigError {
    pub fn read_file(path: &Path, source: std::io::Error) -> Self {
        Self::ReadFile {
            path: path.display().to_string(),
            source,
        }
    }

    pub fn write_file(path: &Path, source: std::io::Error) -> Self {
        Self::WriteFile {
            path: path.display().to_string(),
            source,
        }
    }

    pub fn create_dir(path: &Path, source: std::io::Error) -> Self {
        Self::CreateDir {
            path: path.display().to_string(),
            source,
        }
    }

    pub fn parse_toml(path: &Path, err: toml::de::Error) -> Self {
        Self::ParseToml {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }
}
