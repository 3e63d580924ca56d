//! TOML configuration for the sibyl-answer binary.
//!
//! One optional `sibyl.toml` holds everything: the corpus data directory, the
//! URLs to build from, and one section per pipeline stage. Every field and
//! every section is optional; missing pieces fall back to the library
//! defaults, so an empty file and no file behave identically.
//!
//! ```toml
//! data_dir = "sibyl_data"
//! api_base_url = "https://api.openai.com/v1/"
//! urls = ["https://docs.example.com/refund-policy"]
//!
//! [chunking]
//! chunk_size = 1000
//! chunk_overlap = 200
//!
//! [embedding]
//! model = "text-embedding-3-small"
//! dimension = 1536
//! batch_size = 32
//!
//! [completion]
//! model = "gpt-4o"
//! temperature = 0.2
//! ```
//!
//! The API key never lives in the file; it is read from the environment.

use crate::completion::{
    CompletionParams, DEFAULT_COMPLETION_MODEL, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE,
};
use crate::context::{
    ContextConfig, DEFAULT_MAX_CONTEXT_BLOCKS, DEFAULT_PER_SOURCE_CAP, DEFAULT_SOURCE_LIMIT,
    DEFAULT_WEAK_MATCH_THRESHOLD,
};
use crate::service::{AnswerConfig, DEFAULT_SNAPSHOT_INTERVAL, DEFAULT_TOP_K};
use anyhow::Context;
use serde::Deserialize;
use sibyl_chunk::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use sibyl_embed::EmbedConfig;
use sibyl_embed::config::{
    DEFAULT_API_BASE_URL, DEFAULT_EMBEDDING_DIMENSION, DEFAULT_EMBEDDING_MODEL,
};
use sibyl_retriever::retrieval::build_engine::BuildConfig;
use sibyl_retriever::retrieval::embedding_cache::{
    DEFAULT_BATCH_DELAY, DEFAULT_BATCH_SIZE, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_BASE_DELAY,
    EmbeddingCacheConfig,
};
use sibyl_retriever::retrieval::search_engine::{
    DEFAULT_EXPANSION_K, DEFAULT_EXPANSION_THRESHOLD, DEFAULT_KEYWORD_CAP,
    DEFAULT_KEYWORD_MIN_LENGTH, DEFAULT_KEYWORD_MIN_MATCHES, DEFAULT_MAX_EXPANSIONS, SearchConfig,
};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file picked up from the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "sibyl.toml";

/// Default corpus data directory.
pub const DEFAULT_DATA_DIR: &str = "sibyl_data";

/// Whole-application configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory holding the corpus database
    pub data_dir: PathBuf,
    /// Base URL shared by the embedding and completion endpoints
    pub api_base_url: String,
    /// URLs the corpus is built from
    pub urls: Vec<String>,
    /// Chunking settings
    pub chunking: ChunkingSection,
    /// Embedding settings
    pub embedding: EmbeddingSection,
    /// Search fusion settings
    pub search: SearchSection,
    /// Context assembly settings
    pub context: ContextSection,
    /// Completion settings
    pub completion: CompletionSection,
    /// Answer service settings
    pub answer: AnswerSection,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            urls: Vec::new(),
            chunking: ChunkingSection::default(),
            embedding: EmbeddingSection::default(),
            search: SearchSection::default(),
            context: ContextSection::default(),
            completion: CompletionSection::default(),
            answer: AnswerSection::default(),
        }
    }
}

/// `[chunking]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChunkingSection {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingSection {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

/// `[embedding]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingSection {
    pub model: String,
    pub dimension: usize,
    pub batch_size: usize,
    pub max_retries: u32,
    pub retry_base_delay_secs: f64,
    pub batch_delay_secs: f64,
}

impl Default for EmbeddingSection {
    fn default() -> Self {
        Self {
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            dimension: DEFAULT_EMBEDDING_DIMENSION,
            batch_size: DEFAULT_BATCH_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_delay_secs: DEFAULT_RETRY_BASE_DELAY.as_secs_f64(),
            batch_delay_secs: DEFAULT_BATCH_DELAY.as_secs_f64(),
        }
    }
}

/// `[search]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    pub expansion_k: usize,
    pub expansion_threshold: f32,
    pub max_expansions: usize,
    pub keyword_min_length: usize,
    pub keyword_min_matches: usize,
    pub keyword_cap: usize,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            expansion_k: DEFAULT_EXPANSION_K,
            expansion_threshold: DEFAULT_EXPANSION_THRESHOLD,
            max_expansions: DEFAULT_MAX_EXPANSIONS,
            keyword_min_length: DEFAULT_KEYWORD_MIN_LENGTH,
            keyword_min_matches: DEFAULT_KEYWORD_MIN_MATCHES,
            keyword_cap: DEFAULT_KEYWORD_CAP,
        }
    }
}

/// `[context]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ContextSection {
    pub max_context_blocks: usize,
    pub per_source_cap: usize,
    pub weak_match_threshold: f32,
    pub source_limit: usize,
}

impl Default for ContextSection {
    fn default() -> Self {
        Self {
            max_context_blocks: DEFAULT_MAX_CONTEXT_BLOCKS,
            per_source_cap: DEFAULT_PER_SOURCE_CAP,
            weak_match_threshold: DEFAULT_WEAK_MATCH_THRESHOLD,
            source_limit: DEFAULT_SOURCE_LIMIT,
        }
    }
}

/// `[completion]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CompletionSection {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for CompletionSection {
    fn default() -> Self {
        Self {
            model: DEFAULT_COMPLETION_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

/// `[answer]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnswerSection {
    pub top_k: usize,
    pub snapshot_interval: usize,
}

impl Default for AnswerSection {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            snapshot_interval: DEFAULT_SNAPSHOT_INTERVAL,
        }
    }
}

impl AppConfig {
    /// Loads configuration from an explicit path, from `sibyl.toml` in the
    /// working directory, or from defaults, in that order.
    ///
    /// # Arguments
    /// * `path` - Explicit config file path; errors if missing or malformed
    ///
    /// # Returns
    /// The parsed configuration, or defaults when no file is involved.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if !default.exists() {
                    return Ok(Self::default());
                }
                default.to_path_buf()
            }
        };

        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: AppConfig = toml::from_str(&raw)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        Ok(config)
    }

    /// Embedding client configuration with the given API key.
    pub fn embed_config(&self, api_key: String) -> EmbedConfig {
        EmbedConfig::new(api_key)
            .with_api_base_url(self.api_base_url.clone())
            .with_model(self.embedding.model.clone())
            .with_dimension(self.embedding.dimension)
    }

    /// Embedding cache configuration.
    pub fn cache_config(&self) -> EmbeddingCacheConfig {
        EmbeddingCacheConfig::default()
            .with_batch_size(self.embedding.batch_size)
            .with_max_retries(self.embedding.max_retries)
            .with_retry_base_delay(Duration::from_secs_f64(self.embedding.retry_base_delay_secs))
            .with_batch_delay(Duration::from_secs_f64(self.embedding.batch_delay_secs))
    }

    /// Search engine configuration.
    pub fn search_config(&self) -> SearchConfig {
        SearchConfig::default()
            .with_expansion_k(self.search.expansion_k)
            .with_expansion_threshold(self.search.expansion_threshold)
            .with_max_expansions(self.search.max_expansions)
            .with_keyword_min_length(self.search.keyword_min_length)
            .with_keyword_min_matches(self.search.keyword_min_matches)
            .with_keyword_cap(self.search.keyword_cap)
    }

    /// Context builder configuration.
    pub fn context_config(&self) -> ContextConfig {
        ContextConfig::default()
            .with_max_context_blocks(self.context.max_context_blocks)
            .with_per_source_cap(self.context.per_source_cap)
            .with_weak_match_threshold(self.context.weak_match_threshold)
            .with_source_limit(self.context.source_limit)
    }

    /// Completion parameters.
    pub fn completion_params(&self) -> CompletionParams {
        CompletionParams::default()
            .with_model(self.completion.model.clone())
            .with_temperature(self.completion.temperature)
            .with_max_tokens(self.completion.max_tokens)
    }

    /// Answer service configuration.
    pub fn answer_config(&self) -> AnswerConfig {
        AnswerConfig::default()
            .with_top_k(self.answer.top_k)
            .with_snapshot_interval(self.answer.snapshot_interval)
    }

    /// Corpus build configuration.
    pub fn build_config(&self) -> BuildConfig {
        BuildConfig::new(self.urls.clone())
            .with_chunk_size(self.chunking.chunk_size)
            .with_chunk_overlap(self.chunking.chunk_overlap)
    }
}
