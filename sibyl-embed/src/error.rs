//! Error types for the embedding system

/// Result type for embedding operations.
///
/// This is a convenience type alias that uses [`EmbedError`] as the error type.
/// Used throughout the crate for operations that can fail.
///
/// # Example
pub type Result<T> = std::result::Result<T, EmbedError>;

/// Error type for all embedding operations.
///
/// Covers configuration problems, transport failures, and malformed or
/// inconsistent provider responses. Transient failures surface as
/// [`EmbedError::Request`] or [`EmbedError::Api`]; retry policy is the
/// caller's responsibility, a single call makes a single attempt.
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    /// Error when no API key is available for the provider
    #[error("No API key configured: set the OPENAI_API_KEY environment variable")]
    MissingApiKey,

    /// Error when the provider configuration is invalid
    #[error("Invalid embedding configuration: {message}")]
    InvalidConfig { message: String },

    /// Transport-level failure talking to the embedding endpoint
    #[error("Embedding request failed: {source}")]
    Request {
        #[from]
        source: reqwest::Error,
    },

    /// Non-success HTTP status from the embedding endpoint
    #[error("Embedding API returned status {status}: {message}")]
    Api { status: u16, message: String },

    /// Response body that does not match the expected wire shape
    #[error("Malformed embedding response: {message}")]
    MalformedResponse { message: String },

    /// A returned vector whose dimension differs from the configured one
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl EmbedError {
    /// Create an invalid configuration error with a custom message.
    ///
    /// # Arguments
    /// * `message` - A descriptive error message explaining what's wrong with the configuration
    ///
    /// # Returns
    /// A new [`EmbedError::InvalidConfig`] variant
    ///
    /// # Example
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create a malformed response error with a custom message.
    ///
    /// # Arguments
    /// * `message` - A description of how the response deviated from the wire shape
    ///
    /// # Returns
    /// A new [`EmbedError::MalformedResponse`] variant
    ///
    /// # Example
    pub fn malformed<S: Into<String>>(message: S) -> Self {
        Self::MalformedResponse {
            message: message.into(),
        }
    }
}
