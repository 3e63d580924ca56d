//! Embedding provider implementations

use crate::config::EmbedConfig;
use crate::error::{EmbedError, Result};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

/// Trait for embedding providers that can generate embeddings from text.
///
/// Implementations make exactly one attempt per call; transient errors are
/// retried by the caller. Every returned vector has [`Embedder::dimension`]
/// components, and vectors are returned in the same order as the input texts.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate one embedding vector per input text, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Dimension of the vectors this provider returns.
    fn dimension(&self) -> usize;

    /// Stable identifier of the underlying model, used for cache invalidation.
    fn model_id(&self) -> &str;
}

/// Request body for the `/embeddings` endpoint.
#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

/// Response body from the `/embeddings` endpoint.
#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

fn embeddings_endpoint(api_base_url: &str) -> String {
    format!("{}/embeddings", api_base_url.trim_end_matches('/'))
}

/// Order the response by the provider-reported index and validate counts and
/// dimensions against what was requested.
fn vectors_from_response(
    mut response: EmbeddingResponse,
    expected_count: usize,
    expected_dimension: usize,
) -> Result<Vec<Vec<f32>>> {
    response.data.sort_by_key(|entry| entry.index);

    if response.data.len() != expected_count {
        return Err(EmbedError::malformed(format!(
            "expected {} embeddings, got {}",
            expected_count,
            response.data.len()
        )));
    }

    for entry in &response.data {
        if entry.embedding.len() != expected_dimension {
            return Err(EmbedError::DimensionMismatch {
                expected: expected_dimension,
                actual: entry.embedding.len(),
            });
        }
    }

    Ok(response.data.into_iter().map(|e| e.embedding).collect())
}

/// Embedding provider backed by an OpenAI-compatible `/embeddings` endpoint.
///
/// The HTTP client is constructed once with the bearer token baked into the
/// default headers; each [`Embedder::embed_batch`] call is a single POST with
/// no retries.
///
/// # Example
/// ```no_run
/// use sibyl_embed::{EmbedConfig, Embedder, OpenAiEmbedder};
///
/// # async fn example() -> sibyl_embed::Result<()> {
/// let embedder = OpenAiEmbedder::new(EmbedConfig::new("sk-test"))?;
/// let vectors = embedder.embed_batch(&["hello".to_string()]).await?;
/// assert_eq!(vectors[0].len(), embedder.dimension());
/// # Ok(())
/// # }
/// ```
pub struct OpenAiEmbedder {
    config: EmbedConfig,
    client: reqwest::Client,
    endpoint: String,
}

impl OpenAiEmbedder {
    /// Create a new provider from the given configuration.
    ///
    /// # Arguments
    /// * `config` - Endpoint, key, model, and dimension settings
    ///
    /// # Returns
    /// The provider, or an error when the configuration is invalid or the
    /// HTTP client cannot be constructed.
    pub fn new(config: EmbedConfig) -> Result<Self> {
        config.validate()?;

        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .map_err(|_| EmbedError::invalid_config("api_key contains invalid header bytes"))?;
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()?;

        let endpoint = embeddings_endpoint(&config.api_base_url);
        tracing::debug!("OpenAI embedder initialized for {}", endpoint);

        Ok(Self {
            config,
            client,
            endpoint,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        tracing::debug!("Requesting embeddings for {} texts", texts.len());
        let request = EmbeddingRequest {
            model: &self.config.model,
            input: texts,
        };

        let response = self.client.post(&self.endpoint).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(EmbedError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: EmbeddingResponse = response.json().await?;
        vectors_from_response(parsed, texts.len(), self.config.dimension)
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn model_id(&self) -> &str {
        &self.config.model
    }
}
