//! Cloudflare Workers AI embedding provider
//!
//! Remote, metered tier. Talks to the Workers AI REST endpoint:
//!
//! - POST `{base_url}/accounts/{account_id}/ai/run/{model}`
//! - Request: `{"text": ["text1", "text2", ...]}`
//! - Response: `{"result": {"shape": [n, dim], "data": [[...], ...]}, "success": true, ...}`
//!
//! Usage of this provider is charged in neurons; the embedding client
//! records consumption with the budget tracker after each successful batch.
//!
//! # Example
//!
//! ```ignore
//! use prism_search::embeddings::cloudflare::{CloudflareProvider, CloudflareConfig};
//!
//! let config = CloudflareConfig {
//!     account_id: "abc123".into(),
//!     api_token: Some(std::env::var("CLOUDFLARE_API_TOKEN")?),
//!     model: "@cf/baai/bge-small-en-v1.5".into(),
//!     ..CloudflareConfig::default()
//! };
//!
//! let provider = CloudflareProvider::new(config)?;
//! let embeddings = provider.embed_batch(vec!["hello world".into()]).await?;
//! ```

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, SearchError};

use super::provider::{EmbeddingProvider, ProviderKind, ProviderStatus};

/// Default timeout in milliseconds
const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Default max retries
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (milliseconds)
const RETRY_BASE_DELAY_MS: u64 = 500;

/// Default embedding dimension (bge-small)
const DEFAULT_DIMENSION: usize = 384;

/// Configuration for the Cloudflare Workers AI provider
#[derive(Debug, Clone)]
pub struct CloudflareConfig {
    /// Cloudflare account identifier
    pub account_id: String,
    /// API token; read from the environment when constructed via config
    pub api_token: Option<String>,
    /// Workers AI model (e.g., "@cf/baai/bge-small-en-v1.5")
    pub model: String,
    /// API base URL
    pub base_url: String,
    /// Embedding dimension the model produces
    pub dimension: usize,
    /// Per-request timeout in milliseconds
    pub timeout_ms: u64,
    /// Maximum retry attempts for transient failures
    pub max_retries: u32,
}

impl Default for CloudflareConfig {
    fn default() -> Self {
        Self {
            account_id: String::new(),
            api_token: None,
            model: "@cf/baai/bge-small-en-v1.5".to_string(),
            base_url: "https://api.cloudflare.com/client/v4".to_string(),
            dimension: DEFAULT_DIMENSION,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl CloudflareConfig {
    /// Create config from environment variables
    ///
    /// Expected environment variables:
    /// - `PRISM_CF_ACCOUNT_ID` - Cloudflare account id (required)
    /// - `CLOUDFLARE_API_TOKEN` - API token (required)
    /// - `PRISM_CF_MODEL` - model name (default: @cf/baai/bge-small-en-v1.5)
    /// - `PRISM_CF_BASE_URL` - API base URL (default: Cloudflare v4 API)
    pub fn from_env() -> Result<Self> {
        let account_id = std::env::var("PRISM_CF_ACCOUNT_ID").map_err(|_| {
            SearchError::ProviderUnavailable("PRISM_CF_ACCOUNT_ID is not set".into())
        })?;

        let api_token = std::env::var("CLOUDFLARE_API_TOKEN").map_err(|_| {
            SearchError::ProviderAuth("CLOUDFLARE_API_TOKEN is not set".into())
        })?;

        let model = std::env::var("PRISM_CF_MODEL")
            .unwrap_or_else(|_| "@cf/baai/bge-small-en-v1.5".into());

        let base_url = std::env::var("PRISM_CF_BASE_URL")
            .unwrap_or_else(|_| "https://api.cloudflare.com/client/v4".into());

        Ok(Self {
            account_id,
            api_token: Some(api_token),
            model,
            base_url,
            ..Default::default()
        })
    }

    /// Create config from the loaded settings section.
    ///
    /// The token is read from the environment variable the settings name.
    pub fn from_settings(
        settings: &prism_config::CloudflareSettings,
        dimension: usize,
        timeout_ms: u64,
    ) -> Result<Self> {
        let api_token = std::env::var(&settings.api_token_env).map_err(|_| {
            SearchError::ProviderAuth(format!("{} is not set", settings.api_token_env))
        })?;

        Ok(Self {
            account_id: settings.account_id.clone(),
            api_token: Some(api_token),
            model: settings.model.clone(),
            base_url: settings.base_url.clone(),
            dimension,
            timeout_ms,
            max_retries: settings.max_retries,
        })
    }

    /// Set request timeout
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set max retries
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

/// Request body for the Workers AI embedding endpoint
#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    text: Vec<String>,
}

/// Embedding payload inside the Workers AI response
#[derive(Debug, Deserialize)]
struct EmbeddingResult {
    data: Vec<Vec<f32>>,
    #[allow(dead_code)]
    shape: Option<Vec<usize>>,
}

/// API-level error in the Workers AI envelope
#[derive(Debug, Deserialize)]
struct ApiError {
    code: Option<i64>,
    message: String,
}

/// Workers AI response envelope
#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    result: Option<EmbeddingResult>,
    success: bool,
    #[serde(default)]
    errors: Vec<ApiError>,
}

/// Cloudflare Workers AI embedding provider
pub struct CloudflareProvider {
    client: Client,
    config: CloudflareConfig,
}

impl CloudflareProvider {
    /// Create a new provider
    pub fn new(config: CloudflareConfig) -> Result<Self> {
        if config.account_id.is_empty() {
            return Err(SearchError::ProviderUnavailable(
                "Cloudflare account_id is empty".into(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| SearchError::ProviderUnavailable(format!("HTTP client error: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Create provider from environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(CloudflareConfig::from_env()?)
    }

    /// The inference endpoint URL for the configured model
    fn run_url(&self) -> String {
        format!(
            "{}/accounts/{}/ai/run/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.account_id,
            self.config.model
        )
    }

    /// Send request with retry logic
    async fn request_with_retry(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let mut retry_delay = Duration::from_millis(RETRY_BASE_DELAY_MS);
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            match self.send_request(texts.clone()).await {
                Ok(embeddings) => return Ok(embeddings),
                Err(e) => {
                    // Auth failures never recover by retrying
                    if matches!(e, SearchError::ProviderAuth(_)) {
                        return Err(e);
                    }

                    if attempt < self.config.max_retries {
                        debug!(
                            "Cloudflare request failed (attempt {}), retrying in {:?}: {}",
                            attempt + 1,
                            retry_delay,
                            e
                        );
                        tokio::time::sleep(retry_delay).await;
                        retry_delay *= 2;
                        last_error = Some(e);
                    } else {
                        return Err(e);
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            SearchError::ProviderUnavailable("Request failed after retries".into())
        }))
    }

    /// Send a single request to the endpoint
    async fn send_request(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let url = self.run_url();
        let mut request = self.client.post(&url).json(&EmbeddingRequest { text: texts });

        if let Some(ref token) = self.config.api_token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                SearchError::ProviderUnavailable("Request timed out".into())
            } else if e.is_connect() {
                SearchError::ProviderUnavailable(format!("Connection failed: {}", e))
            } else {
                SearchError::ProviderUnavailable(format!("Request failed: {}", e))
            }
        })?;

        let status = response.status();

        match status {
            StatusCode::OK => {
                let envelope: EmbeddingResponse = response.json().await.map_err(|e| {
                    SearchError::ProviderUnavailable(format!("Invalid response: {}", e))
                })?;

                if !envelope.success {
                    let detail = envelope
                        .errors
                        .first()
                        .map(|e| format!("{} (code {:?})", e.message, e.code))
                        .unwrap_or_else(|| "unknown API error".into());
                    return Err(SearchError::ProviderUnavailable(format!(
                        "Workers AI error: {}",
                        detail
                    )));
                }

                let result = envelope.result.ok_or_else(|| {
                    SearchError::ProviderUnavailable("Response carried no result".into())
                })?;

                Ok(result.data)
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                let body = response.text().await.unwrap_or_default();
                Err(SearchError::ProviderAuth(format!(
                    "Authentication failed: {}",
                    body
                )))
            }
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok());
                Err(SearchError::ProviderRateLimit { retry_after })
            }
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(SearchError::ProviderUnavailable(format!(
                    "HTTP {}: {}",
                    status, body
                )))
            }
        }
    }
}

#[async_trait]
impl EmbeddingProvider for CloudflareProvider {
    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let expected = texts.len();
        let embeddings = self.request_with_retry(texts).await?;

        if embeddings.len() != expected {
            warn!(
                "Workers AI returned {} embeddings for {} inputs",
                embeddings.len(),
                expected
            );
        }
        Ok(embeddings)
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Cloudflare
    }

    async fn check_status(&self) -> Result<ProviderStatus> {
        let started = Instant::now();
        match self.send_request(vec!["ping".into()]).await {
            Ok(_) => Ok(ProviderStatus::healthy(ProviderKind::Cloudflare)
                .with_latency(started.elapsed().as_millis() as u64)),
            Err(e) => Ok(ProviderStatus::unavailable(
                ProviderKind::Cloudflare,
                e.to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: String) -> CloudflareConfig {
        CloudflareConfig {
            account_id: "acct".into(),
            api_token: Some("test-token".into()),
            base_url,
            dimension: 4,
            max_retries: 0,
            ..Default::default()
        }
    }

    fn success_body(vectors: Vec<Vec<f32>>) -> serde_json::Value {
        serde_json::json!({
            "result": { "shape": [vectors.len(), 4], "data": vectors },
            "success": true,
            "errors": [],
            "messages": []
        })
    }

    #[test]
    fn test_run_url() {
        let provider = CloudflareProvider::new(test_config(
            "https://api.cloudflare.com/client/v4/".into(),
        ))
        .unwrap();
        assert_eq!(
            provider.run_url(),
            "https://api.cloudflare.com/client/v4/accounts/acct/ai/run/@cf/baai/bge-small-en-v1.5"
        );
    }

    #[test]
    fn test_empty_account_rejected() {
        let config = CloudflareConfig {
            account_id: String::new(),
            ..Default::default()
        };
        assert!(CloudflareProvider::new(config).is_err());
    }

    #[tokio::test]
    async fn test_embed_batch_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/accounts/acct/ai/run/@cf/baai/bge-small-en-v1.5"))
            .and(header("Authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(success_body(vec![
                vec![0.1, 0.2, 0.3, 0.4],
                vec![0.5, 0.6, 0.7, 0.8],
            ])))
            .mount(&server)
            .await;

        let provider = CloudflareProvider::new(test_config(server.uri())).unwrap();
        let vecs = provider
            .embed_batch(vec!["one".into(), "two".into()])
            .await
            .unwrap();
        assert_eq!(vecs.len(), 2);
        assert_eq!(vecs[0], vec![0.1, 0.2, 0.3, 0.4]);
    }

    #[tokio::test]
    async fn test_auth_failure_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad token"))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = test_config(server.uri());
        config.max_retries = 3;
        let provider = CloudflareProvider::new(config).unwrap();

        let result = provider.embed_batch(vec!["text".into()]).await;
        assert!(matches!(result, Err(SearchError::ProviderAuth(_))));
    }

    #[tokio::test]
    async fn test_rate_limit_maps_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "30"))
            .mount(&server)
            .await;

        let provider = CloudflareProvider::new(test_config(server.uri())).unwrap();
        let result = provider.embed_batch(vec!["text".into()]).await;
        assert!(matches!(
            result,
            Err(SearchError::ProviderRateLimit {
                retry_after: Some(30)
            })
        ));
    }

    #[tokio::test]
    async fn test_api_level_failure_surfaces_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "result": null,
                "success": false,
                "errors": [{"code": 7009, "message": "model overloaded"}]
            })))
            .mount(&server)
            .await;

        let provider = CloudflareProvider::new(test_config(server.uri())).unwrap();
        let result = provider.embed_batch(vec!["text".into()]).await;
        match result {
            Err(SearchError::ProviderUnavailable(msg)) => {
                assert!(msg.contains("model overloaded"))
            }
            other => panic!("expected ProviderUnavailable, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_transient_failure_retries() {
        let server = MockServer::start().await;
        // First attempt fails, second succeeds
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(success_body(vec![vec![1.0, 0.0, 0.0, 0.0]])),
            )
            .mount(&server)
            .await;

        let mut config = test_config(server.uri());
        config.max_retries = 2;
        let provider = CloudflareProvider::new(config).unwrap();

        let vecs = provider.embed_batch(vec!["text".into()]).await.unwrap();
        assert_eq!(vecs.len(), 1);
    }
}
