//! Corpus build orchestration: fetch, chunk, embed, store.
//!
//! A build replaces the whole corpus in one pass. Pages are fetched
//! concurrently, chunked on blocking threads, embedded through the cache
//! (so an unchanged page costs no API calls on a rebuild), and written to
//! the store in a single transaction. Failed pages are skipped; a build
//! only aborts when nothing at all could be fetched or chunked.

use crate::retrieval::corpus_store::CorpusStore;
use crate::retrieval::embedding_cache::{CacheStats, EmbeddingCache};
use crate::retrieval::fetcher::DocumentFetcher;
use crate::retrieval::types::{Document, Fragment};
use anyhow::Result;
use sibyl_chunk::text::TextSplitter;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Configuration for a corpus build.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// URLs to fetch into the corpus
    pub urls: Vec<String>,
    /// Maximum chunk size in characters
    pub chunk_size: usize,
    /// Overlap between consecutive chunks in characters
    pub chunk_overlap: usize,
}

impl BuildConfig {
    /// Creates a build configuration with default chunking parameters.
    pub fn new(urls: Vec<String>) -> Self {
        Self {
            urls,
            chunk_size: sibyl_chunk::DEFAULT_CHUNK_SIZE,
            chunk_overlap: sibyl_chunk::DEFAULT_CHUNK_OVERLAP,
        }
    }

    /// Set the maximum chunk size.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Set the overlap between consecutive chunks.
    pub fn with_chunk_overlap(mut self, chunk_overlap: usize) -> Self {
        self.chunk_overlap = chunk_overlap;
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(!self.urls.is_empty(), "no URLs configured");
        anyhow::ensure!(self.chunk_size > 0, "chunk_size must be positive");
        anyhow::ensure!(
            self.chunk_overlap < self.chunk_size,
            "chunk_overlap ({}) must be smaller than chunk_size ({})",
            self.chunk_overlap,
            self.chunk_size
        );
        Ok(())
    }
}

/// Outcome of a corpus build.
#[derive(Debug, Clone)]
pub struct BuildStats {
    /// Pages fetched successfully
    pub urls_fetched: usize,
    /// Pages that failed or had no extractable text
    pub urls_failed: usize,
    /// Fragments written to the store
    pub fragments_created: usize,
    /// Wall-clock build duration
    pub elapsed: Duration,
    /// Embedding cache effectiveness for this build
    pub embedding: CacheStats,
}

/// Orchestrates fetch, chunk, embed, and store into one build pass.
pub struct BuildEngine {
    config: BuildConfig,
    store: CorpusStore,
    fetcher: Arc<dyn DocumentFetcher>,
    cache: EmbeddingCache,
}

impl BuildEngine {
    /// Creates a build engine after validating the configuration.
    pub fn new(
        config: BuildConfig,
        store: CorpusStore,
        fetcher: Arc<dyn DocumentFetcher>,
        cache: EmbeddingCache,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            store,
            fetcher,
            cache,
        })
    }

    /// Runs a full corpus build and returns its statistics.
    ///
    /// # Returns
    /// Build statistics, or an error when no page could be fetched, no
    /// fragment could be produced, or storage failed.
    pub async fn run(&mut self) -> Result<BuildStats> {
        let started = Instant::now();
        tracing::info!("building corpus from {} URLs", self.config.urls.len());

        let documents = self.fetcher.fetch_all(&self.config.urls).await;
        let urls_fetched = documents.len();
        let urls_failed = self.config.urls.len() - urls_fetched;
        anyhow::ensure!(urls_fetched > 0, "no pages could be fetched; aborting build");

        let fragments = chunk_documents(
            documents,
            self.config.chunk_size,
            self.config.chunk_overlap,
        )
        .await?;
        anyhow::ensure!(
            !fragments.is_empty(),
            "no fragments produced from {} fetched pages",
            urls_fetched
        );
        tracing::info!("chunked {} pages into {} fragments", urls_fetched, fragments.len());

        let texts: Vec<String> = fragments.iter().map(|f| f.text.clone()).collect();
        let embeddings = self.cache.get_embeddings(&texts).await?;

        self.store.replace_fragments(&fragments, &embeddings).await?;

        let stats = BuildStats {
            urls_fetched,
            urls_failed,
            fragments_created: fragments.len(),
            elapsed: started.elapsed(),
            embedding: self.cache.stats(),
        };
        tracing::info!(
            "corpus build finished: {} fragments from {} pages in {:.1}s",
            stats.fragments_created,
            stats.urls_fetched,
            stats.elapsed.as_secs_f64()
        );
        Ok(stats)
    }
}

/// Chunks documents concurrently on blocking threads, tagging every fragment
/// with its source URL. Document order is preserved in the output.
pub async fn chunk_documents(
    documents: Vec<Document>,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<Vec<Fragment>> {
    let splitter = TextSplitter::new(chunk_size, chunk_overlap);

    let tasks: Vec<_> = documents
        .into_iter()
        .map(|document| {
            let splitter = splitter.clone();
            tokio::task::spawn_blocking(move || {
                splitter
                    .split(&document.text)
                    .into_iter()
                    .map(|text| Fragment {
                        text,
                        source: document.source.clone(),
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut fragments = Vec::new();
    for task in futures::future::join_all(tasks).await {
        fragments.extend(task?);
    }
    Ok(fragments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::embedding_cache::EmbeddingCacheConfig;
    use async_trait::async_trait;
    use sibyl_embed::Embedder;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct StaticFetcher;

    #[async_trait]
    impl DocumentFetcher for StaticFetcher {
        async fn fetch(&self, url: &str) -> Option<Document> {
            if url.contains("broken") {
                return None;
            }
            Some(Document {
                source: url.to_string(),
                text: "First sentence of the page. Second sentence of the page.".to_string(),
            })
        }
    }

    struct CountingEmbedder {
        calls: AtomicUsize,
    }

    impl CountingEmbedder {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        async fn embed_batch(&self, texts: &[String]) -> sibyl_embed::Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts
                .iter()
                .map(|t| vec![t.len() as f32, 1.0, 0.0])
                .collect())
        }

        fn dimension(&self) -> usize {
            3
        }

        fn model_id(&self) -> &str {
            "counting-model"
        }
    }

    fn fast_cache_config() -> EmbeddingCacheConfig {
        EmbeddingCacheConfig::default()
            .with_retry_base_delay(Duration::from_millis(1))
            .with_batch_delay(Duration::from_millis(1))
    }

    fn build_config(urls: &[&str]) -> BuildConfig {
        BuildConfig::new(urls.iter().map(|u| u.to_string()).collect())
    }

    #[tokio::test]
    async fn test_build_populates_store() -> Result<()> {
        let store = CorpusStore::open_memory().await?;
        let cache = EmbeddingCache::load(
            store.clone(),
            Arc::new(CountingEmbedder::new()),
            fast_cache_config(),
        )
        .await?;

        let mut engine = BuildEngine::new(
            build_config(&["https://site/a", "https://site/broken", "https://site/b"]),
            store.clone(),
            Arc::new(StaticFetcher),
            cache,
        )?;

        let stats = engine.run().await?;
        assert_eq!(stats.urls_fetched, 2);
        assert_eq!(stats.urls_failed, 1);
        assert_eq!(stats.fragments_created, 2);

        let fragments = store.load_fragments().await?;
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0].source, "https://site/a");
        assert_eq!(fragments[1].source, "https://site/b");

        let embeddings = store.load_embeddings().await?;
        assert_eq!(embeddings.len(), 2);
        assert_eq!(embeddings[0].len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_build_aborts_when_nothing_fetched() -> Result<()> {
        let store = CorpusStore::open_memory().await?;
        let cache = EmbeddingCache::load(
            store.clone(),
            Arc::new(CountingEmbedder::new()),
            fast_cache_config(),
        )
        .await?;

        let mut engine = BuildEngine::new(
            build_config(&["https://site/broken"]),
            store,
            Arc::new(StaticFetcher),
            cache,
        )?;

        assert!(engine.run().await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_rebuild_hits_embedding_cache() -> Result<()> {
        let store = CorpusStore::open_memory().await?;
        let urls = ["https://site/a"];

        let first_embedder = Arc::new(CountingEmbedder::new());
        let cache = EmbeddingCache::load(store.clone(), first_embedder.clone(), fast_cache_config())
            .await?;
        let mut engine =
            BuildEngine::new(build_config(&urls), store.clone(), Arc::new(StaticFetcher), cache)?;
        engine.run().await?;
        assert_eq!(first_embedder.calls.load(Ordering::SeqCst), 1);

        let second_embedder = Arc::new(CountingEmbedder::new());
        let cache = EmbeddingCache::load(store.clone(), second_embedder.clone(), fast_cache_config())
            .await?;
        let mut engine =
            BuildEngine::new(build_config(&urls), store, Arc::new(StaticFetcher), cache)?;
        let stats = engine.run().await?;

        assert_eq!(second_embedder.calls.load(Ordering::SeqCst), 0);
        assert_eq!(stats.embedding.cache_hits as usize, stats.fragments_created);
        Ok(())
    }

    #[tokio::test]
    async fn test_chunk_documents_tags_sources() -> Result<()> {
        let documents = vec![
            Document {
                source: "https://site/a".to_string(),
                text: "Alpha page sentence.".to_string(),
            },
            Document {
                source: "https://site/b".to_string(),
                text: "Beta page sentence.".to_string(),
            },
        ];

        let fragments = chunk_documents(documents, 1000, 200).await?;
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0].source, "https://site/a");
        assert_eq!(fragments[0].text, "Alpha page sentence.");
        assert_eq!(fragments[1].source, "https://site/b");
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() -> Result<()> {
        let store = CorpusStore::open_memory().await?;
        let cache = EmbeddingCache::load(
            store.clone(),
            Arc::new(CountingEmbedder::new()),
            fast_cache_config(),
        )
        .await?;

        let config = build_config(&["https://site/a"])
            .with_chunk_size(100)
            .with_chunk_overlap(100);
        assert!(BuildEngine::new(config, store, Arc::new(StaticFetcher), cache).is_err());
        Ok(())
    }
}
