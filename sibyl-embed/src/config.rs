//! Configuration for embedding providers

use crate::error::{EmbedError, Result};
use std::time::Duration;

/// Default OpenAI-compatible API base URL.
pub const DEFAULT_API_BASE_URL: &str = "https://api.openai.com/v1/";

/// Default embedding model identifier.
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Default embedding vector dimension for [`DEFAULT_EMBEDDING_MODEL`].
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 1536;

/// Default timeout for a single embedding request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Configuration for a remote embedding provider.
///
/// Identifies the endpoint, the model, and the vector dimension the rest of
/// the pipeline is shaped around. The model identifier participates in cache
/// invalidation downstream, so changing it here invalidates previously cached
/// vectors.
#[derive(Debug, Clone)]
pub struct EmbedConfig {
    /// Base URL of the OpenAI-compatible API (with or without trailing slash)
    pub api_base_url: String,
    /// API key sent as a bearer token
    pub api_key: String,
    /// Model identifier requested from the provider
    pub model: String,
    /// Expected dimension of returned vectors
    pub dimension: usize,
    /// Timeout applied to each HTTP request
    pub request_timeout: Duration,
}

impl EmbedConfig {
    /// Create a configuration with the given API key and default endpoint,
    /// model, and dimension.
    pub fn new<S: Into<String>>(api_key: S) -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            api_key: api_key.into(),
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            dimension: DEFAULT_EMBEDDING_DIMENSION,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Create a configuration from the environment.
    ///
    /// Reads the API key from [`API_KEY_ENV`] and applies defaults for
    /// everything else.
    ///
    /// # Returns
    /// The configuration, or [`EmbedError::MissingApiKey`] when the variable
    /// is unset or empty.
    pub fn from_env() -> Result<Self> {
        match std::env::var(API_KEY_ENV) {
            Ok(key) if !key.trim().is_empty() => Ok(Self::new(key)),
            _ => Err(EmbedError::MissingApiKey),
        }
    }

    /// Set the API base URL.
    pub fn with_api_base_url<S: Into<String>>(mut self, api_base_url: S) -> Self {
        self.api_base_url = api_base_url.into();
        self
    }

    /// Set the model identifier.
    pub fn with_model<S: Into<String>>(mut self, model: S) -> Self {
        self.model = model.into();
        self
    }

    /// Set the expected vector dimension.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    /// Set the per-request timeout.
    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    /// Validate the configuration.
    ///
    /// # Returns
    /// `Ok(())` when the configuration is usable, otherwise an
    /// [`EmbedError::InvalidConfig`] or [`EmbedError::MissingApiKey`]
    /// describing the problem.
    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(EmbedError::MissingApiKey);
        }
        if self.api_base_url.trim().is_empty() {
            return Err(EmbedError::invalid_config("api_base_url must not be empty"));
        }
        if self.model.trim().is_empty() {
            return Err(EmbedError::invalid_config("model must not be empty"));
        }
        if self.dimension == 0 {
            return Err(EmbedError::invalid_config("dimension must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EmbedConfig::new("sk-test");
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.model, DEFAULT_EMBEDDING_MODEL);
        assert_eq!(config.dimension, DEFAULT_EMBEDDING_DIMENSION);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_methods() {
        let config = EmbedConfig::new("sk-test")
            .with_api_base_url("http://localhost:8080/v1")
            .with_model("custom-model")
            .with_dimension(384)
            .with_request_timeout(Duration::from_secs(5));

        assert_eq!(config.api_base_url, "http://localhost:8080/v1");
        assert_eq!(config.model, "custom-model");
        assert_eq!(config.dimension, 384);
        assert_eq!(config.request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_validate_rejects_empty_key() {
        let config = EmbedConfig::new("   ");
        assert!(matches!(
            config.validate(),
            Err(EmbedError::MissingApiKey)
        ));
    }

    #[test]
    fn test_validate_rejects_zero_dimension() {
        let config = EmbedConfig::new("sk-test").with_dimension(0);
        assert!(matches!(
            config.validate(),
            Err(EmbedError::InvalidConfig { .. })
        ));
    }
}
