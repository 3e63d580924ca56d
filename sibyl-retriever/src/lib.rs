//! sibyl-retriever: Corpus construction and multi-strategy retrieval
//!
//! This crate provides the storage and search half of the pipeline: it turns
//! a list of URLs into a store of labeled, embedded text fragments and then
//! answers questions against that store with fused vector and keyword
//! retrieval.
//!
//! ## Key Modules
//!
//! - **[`retrieval::build_engine`]**: Fetch, chunk, embed, and store in one pass
//! - **[`retrieval::corpus_store`]**: SQLite persistence for fragments and the
//!   embedding cache
//! - **[`retrieval::embedding_cache`]**: Content-addressed cache with batched,
//!   retrying fetch
//! - **[`retrieval::nn_index`]**: Nearest-neighbor index over fragment vectors
//! - **[`retrieval::search_engine`]**: Direct, expanded, and keyword search
//!   with score fusion
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sibyl_retriever::retrieval::{
//!     build_engine::{BuildConfig, BuildEngine},
//!     corpus_store::CorpusStore,
//!     embedding_cache::{EmbeddingCache, EmbeddingCacheConfig},
//!     fetcher::HttpFetcher,
//! };
//! use sibyl_embed::{EmbedConfig, OpenAiEmbedder};
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let store = CorpusStore::open(std::path::Path::new("data")).await?;
//! let embedder = Arc::new(OpenAiEmbedder::new(EmbedConfig::from_env()?)?);
//! let cache = EmbeddingCache::load(store.clone(), embedder, EmbeddingCacheConfig::default()).await?;
//!
//! let config = BuildConfig::new(vec!["https://example.com/docs".to_string()]);
//! let mut engine = BuildEngine::new(config, store, Arc::new(HttpFetcher::new()?), cache)?;
//! let stats = engine.run().await?;
//! println!("built {} fragments", stats.fragments_created);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! URLs → Fetcher → Chunker → EmbeddingCache → SQLite CorpusStore
//!                                                  ↓
//! Question → SearchEngine ← FlatCosineIndex ← load_embeddings
//! ```

pub mod retrieval;
