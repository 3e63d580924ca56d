//! # sibyl-embed
//!
//! A small library for generating text embeddings through OpenAI-compatible
//! HTTP APIs. Designed for async operation with a clean provider abstraction
//! so callers can swap the remote endpoint for a deterministic fake in tests.
//!
//! ## Features
//!
//! - **OpenAI-Compatible**: Works with any `/embeddings` endpoint speaking the
//!   OpenAI wire shape, including local inference servers
//! - **Async-First Design**: Full async/await support with tokio integration
//! - **Single-Attempt Calls**: One HTTP request per call; batching and retry
//!   policy stay with the caller
//! - **Validated Responses**: Vector counts and dimensions are checked before
//!   anything reaches the rest of the pipeline
//!
//! ## Quick Start
//!
//! ```no_run
//! use sibyl_embed::{EmbedConfig, Embedder, OpenAiEmbedder};
//!
//! # async fn example() -> sibyl_embed::Result<()> {
//! let config = EmbedConfig::from_env()?;
//! let embedder = OpenAiEmbedder::new(config)?;
//!
//! let texts = vec!["Hello world".to_string(), "How are you?".to_string()];
//! let vectors = embedder.embed_batch(&texts).await?;
//!
//! println!("Generated {} embeddings of dimension {}",
//!          vectors.len(), embedder.dimension());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`config`]: Endpoint, model, and dimension configuration
//! - [`provider`]: The [`Embedder`] trait and the OpenAI-compatible client
//! - [`error`]: Error types and result handling
//!
//! ## Error Handling
//!
//! All operations return [`Result<T>`] using the crate's [`EmbedError`] type.
//! Providers are deliberately single-attempt: transient transport and API
//! failures surface immediately so callers can apply their own retry and
//! fallback policy.

pub mod config;
pub mod error;
pub mod provider;

// Re-export main types for easy access
pub use config::EmbedConfig;
pub use error::{EmbedError, Result};
pub use provider::{Embedder, OpenAiEmbedder};
