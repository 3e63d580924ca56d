//! Content-addressed embedding cache with batched remote fetch.
//!
//! The cache keys vectors by a blake3 hash of the exact fragment text, so any
//! text edit produces a different key and a stale vector can never be served
//! for changed content. Cached entries are only trusted when the persisted
//! model identifier and format version match the active embedder; on a model
//! switch the old entries are ignored (and physically dropped at the next
//! save), never silently mixed with vectors from another model.
//!
//! ## Fetch policy
//!
//! Misses are deduplicated, batched, and fetched through the [`Embedder`]
//! with exponential-backoff retries. A batch that keeps failing after the
//! configured attempts falls back to zero vectors rather than aborting the
//! whole corpus build; the fallback count is reported in [`CacheStats`] so a
//! degraded build is visible. Zero vectors have zero cosine similarity to
//! every query, so the affected fragments are effectively unranked.

use crate::retrieval::corpus_store::{CACHE_FORMAT_VERSION, CorpusStore};
use anyhow::Result;
use serde::Serialize;
use sibyl_embed::{EmbedError, Embedder};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Default number of texts per embedding request.
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Default number of attempts per batch before falling back to zero vectors.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Default base delay for exponential backoff between attempts.
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default pause between successive batch requests.
pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_millis(500);

/// Returns the lowercase hex blake3 hash of `text`, the cache key for its
/// embedding.
pub fn content_hash(text: &str) -> String {
    hex::encode(blake3::hash(text.as_bytes()).as_bytes())
}

fn zero_vector(dimension: usize) -> Vec<f32> {
    vec![0.0; dimension]
}

/// Configuration for batching and retry behavior.
#[derive(Debug, Clone)]
pub struct EmbeddingCacheConfig {
    /// Number of texts per embedding request
    pub batch_size: usize,
    /// Attempts per batch before giving up
    pub max_retries: u32,
    /// Base delay for exponential backoff (doubled per failed attempt)
    pub retry_base_delay: Duration,
    /// Pause between successive batch requests
    pub batch_delay: Duration,
}

impl Default for EmbeddingCacheConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
            batch_delay: DEFAULT_BATCH_DELAY,
        }
    }
}

impl EmbeddingCacheConfig {
    /// Set the number of texts per embedding request.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Set the number of attempts per batch.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    /// Set the base backoff delay.
    pub fn with_retry_base_delay(mut self, retry_base_delay: Duration) -> Self {
        self.retry_base_delay = retry_base_delay;
        self
    }

    /// Set the pause between successive batches.
    pub fn with_batch_delay(mut self, batch_delay: Duration) -> Self {
        self.batch_delay = batch_delay;
        self
    }
}

/// Embedding-cache effectiveness counters.
///
/// Hits and misses are counted per text occurrence, API calls per batch
/// request, and fallbacks per text that ended up with a zero vector.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub api_calls: u64,
    pub fallbacks: u64,
}

/// Content-addressed embedding cache backed by a [`CorpusStore`].
///
/// The in-memory entry map is loaded once at construction and persisted once
/// per [`EmbeddingCache::get_embeddings`] call that fetched anything new.
/// Query-time lookups through [`EmbeddingCache::embed_query`] are read-only:
/// they never retry and never persist, keeping the serving path free of
/// build-path side effects.
pub struct EmbeddingCache {
    store: CorpusStore,
    embedder: Arc<dyn Embedder>,
    config: EmbeddingCacheConfig,
    entries: HashMap<String, Vec<f32>>,
    stats: Mutex<CacheStats>,
}

impl EmbeddingCache {
    /// Loads the cache from the store, validating the persisted header
    /// against the active embedder.
    ///
    /// A missing header, a format-version bump, a model switch, or an
    /// unreadable cache all start from an empty map; none of them is fatal.
    pub async fn load(
        store: CorpusStore,
        embedder: Arc<dyn Embedder>,
        config: EmbeddingCacheConfig,
    ) -> Result<Self> {
        let entries = match store.load_embedding_cache().await {
            Ok(Some((meta, entries))) => {
                if meta.format_version != CACHE_FORMAT_VERSION {
                    tracing::warn!(
                        stored = meta.format_version,
                        expected = CACHE_FORMAT_VERSION,
                        "embedding cache format changed, starting empty"
                    );
                    HashMap::new()
                } else if meta.model_id != embedder.model_id() {
                    tracing::warn!(
                        stored = %meta.model_id,
                        active = %embedder.model_id(),
                        dropped = entries.len(),
                        "embedding model changed, ignoring cached vectors"
                    );
                    HashMap::new()
                } else {
                    tracing::info!("loaded embedding cache with {} entries", entries.len());
                    entries
                }
            }
            Ok(None) => HashMap::new(),
            Err(error) => {
                tracing::warn!("embedding cache unreadable, starting empty: {error:#}");
                HashMap::new()
            }
        };

        Ok(Self {
            store,
            embedder,
            config,
            entries,
            stats: Mutex::new(CacheStats::default()),
        })
    }

    /// Returns one embedding per input text, in input order.
    ///
    /// Cached texts are served from memory. The remaining texts are
    /// deduplicated, batched, and fetched with retries; texts whose batch
    /// exhausts its attempts receive zero vectors. Identical texts share a
    /// single fetch and a single cache entry. When anything was fetched the
    /// merged entry map is persisted once before returning.
    ///
    /// # Arguments
    /// * `texts` - Texts to embed, duplicates allowed
    ///
    /// # Returns
    /// Vectors parallel to `texts`. Only storage errors propagate; fetch
    /// failures degrade to zero vectors instead.
    pub async fn get_embeddings(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut pending: Vec<String> = Vec::new();
        let mut positions: HashMap<String, Vec<usize>> = HashMap::new();

        {
            let mut stats = self.stats.lock().unwrap();
            for (i, text) in texts.iter().enumerate() {
                let hash = content_hash(text);
                if let Some(vector) = self.entries.get(&hash) {
                    stats.cache_hits += 1;
                    results[i] = Some(vector.clone());
                } else {
                    stats.cache_misses += 1;
                    let slots = positions.entry(hash).or_default();
                    if slots.is_empty() {
                        pending.push(text.clone());
                    }
                    slots.push(i);
                }
            }
        }

        if pending.is_empty() {
            return Ok(results.into_iter().flatten().collect());
        }

        tracing::info!(
            "embedding {} new texts ({} already cached)",
            pending.len(),
            texts.len() - pending.len()
        );

        let batches: Vec<&[String]> = pending.chunks(self.config.batch_size).collect();
        for (batch_index, batch) in batches.iter().enumerate() {
            if batch_index > 0 {
                tokio::time::sleep(self.config.batch_delay).await;
            }

            let vectors = self.fetch_batch_with_retry(batch, batch_index, batches.len()).await;
            for (text, vector) in batch.iter().zip(vectors) {
                let hash = content_hash(text);
                for &slot in &positions[&hash] {
                    results[slot] = Some(vector.clone());
                }
                self.entries.insert(hash, vector);
            }
        }

        self.store
            .save_embedding_cache(self.embedder.model_id(), &self.entries)
            .await?;

        Ok(results.into_iter().flatten().collect())
    }

    /// Fetches one batch, retrying with exponential backoff. Falls back to
    /// zero vectors once the attempts are exhausted.
    async fn fetch_batch_with_retry(
        &self,
        batch: &[String],
        batch_index: usize,
        batch_count: usize,
    ) -> Vec<Vec<f32>> {
        self.stats.lock().unwrap().api_calls += 1;

        for attempt in 0..self.config.max_retries {
            match self.embedder.embed_batch(batch).await {
                Ok(vectors) => {
                    tracing::debug!(
                        "batch {}/{} embedded ({} texts)",
                        batch_index + 1,
                        batch_count,
                        batch.len()
                    );
                    return vectors;
                }
                Err(error) => {
                    tracing::warn!(
                        "batch {}/{} attempt {}/{} failed: {error}",
                        batch_index + 1,
                        batch_count,
                        attempt + 1,
                        self.config.max_retries
                    );
                    if attempt + 1 < self.config.max_retries {
                        let delay = self.config.retry_base_delay * 2u32.pow(attempt);
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        tracing::error!(
            "batch {}/{} failed after {} attempts, assigning zero vectors",
            batch_index + 1,
            batch_count,
            self.config.max_retries
        );
        self.stats.lock().unwrap().fallbacks += batch.len() as u64;
        vec![zero_vector(self.embedder.dimension()); batch.len()]
    }

    /// Embeds a single query text through the cache without mutating it.
    ///
    /// A hit is served from memory. A miss makes exactly one fetch attempt
    /// and the result is neither memoized nor persisted; failures propagate
    /// so the caller can decide which strategies to skip.
    pub async fn embed_query(&self, text: &str) -> sibyl_embed::Result<Vec<f32>> {
        let hash = content_hash(text);
        if let Some(vector) = self.entries.get(&hash) {
            self.stats.lock().unwrap().cache_hits += 1;
            return Ok(vector.clone());
        }

        {
            let mut stats = self.stats.lock().unwrap();
            stats.cache_misses += 1;
            stats.api_calls += 1;
        }

        let mut vectors = self.embedder.embed_batch(&[text.to_string()]).await?;
        match vectors.pop() {
            Some(vector) if vectors.is_empty() => Ok(vector),
            _ => Err(EmbedError::malformed("expected exactly one embedding")),
        }
    }

    /// Snapshot of the effectiveness counters.
    pub fn stats(&self) -> CacheStats {
        *self.stats.lock().unwrap()
    }

    /// Number of cached entries currently in memory.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when no entries are cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Identifier of the model producing the cached vectors.
    pub fn model_id(&self) -> &str {
        self.embedder.model_id()
    }

    /// Dimension of cached and fetched vectors.
    pub fn dimension(&self) -> usize {
        self.embedder.dimension()
    }
}
