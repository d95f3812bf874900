//! Provider factory for creating embedding providers from configuration
//!
//! Creates the appropriate provider implementation based on the loaded
//! `[embedding]` config section, falling back to environment variables for
//! the Cloudflare account and token when the section carries no settings.

use std::sync::Arc;

use prism_config::EmbeddingConfig;

use crate::error::{Result, SearchError};

use super::cloudflare::{CloudflareConfig, CloudflareProvider};
use super::local::LocalProvider;
use super::provider::EmbeddingProvider;

/// Create the primary embedding provider from configuration.
pub fn create(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let provider: Arc<dyn EmbeddingProvider> = match config.provider {
        prism_config::ProviderKind::Local => {
            Arc::new(LocalProvider::new(config.dimension)?)
        }
        prism_config::ProviderKind::Cloudflare => {
            let cf_config = match config.cloudflare {
                Some(ref settings) => {
                    CloudflareConfig::from_settings(settings, config.dimension, config.timeout_ms)?
                }
                None => CloudflareConfig::from_env()?
                    .with_timeout_ms(config.timeout_ms),
            };
            Arc::new(CloudflareProvider::new(cf_config)?)
        }
    };

    validate_dimension(provider.as_ref(), config.dimension)?;
    Ok(provider)
}

/// Create the local fallback provider at the store's dimension.
pub fn create_fallback(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    Ok(Arc::new(LocalProvider::new(config.dimension)?))
}

/// Validate that a provider's embedding dimension matches the expected
/// dimension.
///
/// The store is created with a fixed vector dimension; inserting vectors of
/// a different length would fail later and far from the misconfiguration.
pub fn validate_dimension(provider: &dyn EmbeddingProvider, expected: usize) -> Result<()> {
    let actual = provider.dimension();
    if actual != expected {
        return Err(SearchError::DimensionMismatch { expected, actual });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::provider::ProviderKind;

    #[test]
    fn test_factory_local() {
        let config = EmbeddingConfig {
            provider: prism_config::ProviderKind::Local,
            dimension: 128,
            ..Default::default()
        };
        let provider = create(&config).unwrap();
        assert_eq!(provider.kind(), ProviderKind::Local);
        assert_eq!(provider.dimension(), 128);
        assert!(!provider.metered());
    }

    #[test]
    fn test_factory_cloudflare_from_settings_requires_token_env() {
        // SAFETY: single-threaded test, environment manipulation is safe
        unsafe {
            std::env::remove_var("PRISM_TEST_MISSING_TOKEN");
        }

        let config = EmbeddingConfig {
            provider: prism_config::ProviderKind::Cloudflare,
            cloudflare: Some(prism_config::CloudflareSettings {
                account_id: "acct".into(),
                api_token_env: "PRISM_TEST_MISSING_TOKEN".into(),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(matches!(
            create(&config),
            Err(SearchError::ProviderAuth(_))
        ));
    }

    #[test]
    fn test_factory_cloudflare_with_settings() {
        // SAFETY: single-threaded test, environment manipulation is safe
        unsafe {
            std::env::set_var("PRISM_TEST_CF_TOKEN", "token");
        }

        let config = EmbeddingConfig {
            provider: prism_config::ProviderKind::Cloudflare,
            cloudflare: Some(prism_config::CloudflareSettings {
                account_id: "acct".into(),
                api_token_env: "PRISM_TEST_CF_TOKEN".into(),
                ..Default::default()
            }),
            ..Default::default()
        };
        let provider = create(&config).unwrap();

        // SAFETY: single-threaded test, environment manipulation is safe
        unsafe {
            std::env::remove_var("PRISM_TEST_CF_TOKEN");
        }

        assert_eq!(provider.kind(), ProviderKind::Cloudflare);
        assert!(provider.metered());
        assert_eq!(provider.dimension(), 384);
    }

    #[test]
    fn test_fallback_is_always_local() {
        let config = EmbeddingConfig::default();
        let fallback = create_fallback(&config).unwrap();
        assert_eq!(fallback.kind(), ProviderKind::Local);
        assert_eq!(fallback.dimension(), config.dimension);
    }

    #[test]
    fn test_validate_dimension() {
        let provider = LocalProvider::new(384).unwrap();
        assert!(validate_dimension(&provider, 384).is_ok());
        assert!(matches!(
            validate_dimension(&provider, 768),
            Err(SearchError::DimensionMismatch {
                expected: 768,
                actual: 384
            })
        ));
    }
}
