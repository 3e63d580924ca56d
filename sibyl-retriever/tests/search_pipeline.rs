use anyhow::Result;
use async_trait::async_trait;
use sibyl_embed::{EmbedError, Embedder};
use sibyl_retriever::retrieval::build_engine::{BuildConfig, BuildEngine};
use sibyl_retriever::retrieval::corpus_store::CorpusStore;
use sibyl_retriever::retrieval::embedding_cache::{EmbeddingCache, EmbeddingCacheConfig};
use sibyl_retriever::retrieval::fetcher::DocumentFetcher;
use sibyl_retriever::retrieval::nn_index::FlatCosineIndex;
use sibyl_retriever::retrieval::search_engine::{SearchConfig, SearchEngine};
use sibyl_retriever::retrieval::types::{Document, SearchStrategy};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing_test::traced_test;

const PAGE_REFUNDS: &str = "Refunds are issued within fourteen days of purchase.";
const PAGE_SHIPPING: &str = "Orders ship from the warehouse within two days.";
const PAGE_PRICING: &str = "Enterprise tiers include dedicated support lines.";

/// Serves three fixed pages; anything else fails.
struct FixtureFetcher;

#[async_trait]
impl DocumentFetcher for FixtureFetcher {
    async fn fetch(&self, url: &str) -> Option<Document> {
        let text = match url {
            "https://docs.example.com/refund-policy" => PAGE_REFUNDS,
            "https://docs.example.com/shipping-times" => PAGE_SHIPPING,
            "https://docs.example.com/enterprise-pricing" => PAGE_PRICING,
            _ => return None,
        };
        Some(Document {
            source: url.to_string(),
            text: text.to_string(),
        })
    }
}

/// Deterministic embedder answering from a text -> vector table; unknown
/// texts embed to the zero vector.
struct TableEmbedder {
    table: HashMap<String, Vec<f32>>,
}

impl TableEmbedder {
    fn fixture() -> Self {
        let mut table = HashMap::new();
        table.insert(PAGE_REFUNDS.to_string(), vec![1.0, 0.0, 0.0]);
        table.insert(PAGE_SHIPPING.to_string(), vec![0.0, 1.0, 0.0]);
        table.insert(PAGE_PRICING.to_string(), vec![0.0, 0.0, 1.0]);
        table.insert("How do refunds work?".to_string(), vec![1.0, 0.0, 0.0]);
        Self { table }
    }
}

#[async_trait]
impl Embedder for TableEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> sibyl_embed::Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| self.table.get(t).cloned().unwrap_or_else(|| vec![0.0; 3]))
            .collect())
    }

    fn dimension(&self) -> usize {
        3
    }

    fn model_id(&self) -> &str {
        "fixture-model"
    }
}

/// Embedder that is always unavailable.
struct OfflineEmbedder;

#[async_trait]
impl Embedder for OfflineEmbedder {
    async fn embed_batch(&self, _texts: &[String]) -> sibyl_embed::Result<Vec<Vec<f32>>> {
        Err(EmbedError::Api {
            status: 503,
            message: "unavailable".to_string(),
        })
    }

    fn dimension(&self) -> usize {
        3
    }

    fn model_id(&self) -> &str {
        "fixture-model"
    }
}

fn fixture_urls() -> Vec<String> {
    vec![
        "https://docs.example.com/refund-policy".to_string(),
        "https://docs.example.com/shipping-times".to_string(),
        "https://docs.example.com/enterprise-pricing".to_string(),
    ]
}

fn fast_cache_config() -> EmbeddingCacheConfig {
    EmbeddingCacheConfig::default()
        .with_retry_base_delay(Duration::from_millis(1))
        .with_batch_delay(Duration::from_millis(1))
        .with_max_retries(2)
}

/// Builds the fixture corpus into an in-memory store.
async fn build_fixture_corpus(store: &CorpusStore) -> Result<()> {
    let cache = EmbeddingCache::load(
        store.clone(),
        Arc::new(TableEmbedder::fixture()),
        fast_cache_config(),
    )
    .await?;
    let mut engine = BuildEngine::new(
        BuildConfig::new(fixture_urls()),
        store.clone(),
        Arc::new(FixtureFetcher),
        cache,
    )?;
    engine.run().await?;
    Ok(())
}

/// Assembles a search engine over an already-built store.
async fn search_engine_over(store: &CorpusStore, embedder: Arc<dyn Embedder>) -> Result<SearchEngine> {
    let cache = EmbeddingCache::load(store.clone(), embedder, fast_cache_config()).await?;
    let index = FlatCosineIndex::load(store).await?;
    let fragments = store.load_fragments().await?;
    Ok(SearchEngine::new(
        Arc::new(cache),
        Arc::new(index),
        Arc::new(fragments),
        SearchConfig::default(),
    ))
}

#[traced_test]
#[tokio::test]
async fn test_build_then_search_end_to_end() -> Result<()> {
    let store = CorpusStore::open_memory().await?;
    build_fixture_corpus(&store).await?;
    assert_eq!(store.fragment_count().await?, 3);

    let engine = search_engine_over(&store, Arc::new(TableEmbedder::fixture())).await?;
    let results = engine.search("How do refunds work?", 3).await?;

    assert!(!results.is_empty());
    assert_eq!(results[0].text, PAGE_REFUNDS);
    assert_eq!(results[0].source, "https://docs.example.com/refund-policy");
    assert_eq!(results[0].strategy, SearchStrategy::Direct);
    assert!((results[0].similarity - 1.0).abs() < 1e-5);
    Ok(())
}

#[tokio::test]
async fn test_rebuild_serves_vectors_from_cache() -> Result<()> {
    let store = CorpusStore::open_memory().await?;
    build_fixture_corpus(&store).await?;

    // Second build over the same store: every fragment vector is a cache hit.
    let cache = EmbeddingCache::load(
        store.clone(),
        Arc::new(TableEmbedder::fixture()),
        fast_cache_config(),
    )
    .await?;
    let mut engine = BuildEngine::new(
        BuildConfig::new(fixture_urls()),
        store.clone(),
        Arc::new(FixtureFetcher),
        cache,
    )?;
    let stats = engine.run().await?;

    assert_eq!(stats.embedding.cache_hits, 3);
    assert_eq!(stats.embedding.cache_misses, 0);
    assert_eq!(stats.embedding.api_calls, 0);
    Ok(())
}

#[tokio::test]
async fn test_keyword_fallback_when_embedding_offline() -> Result<()> {
    let store = CorpusStore::open_memory().await?;
    build_fixture_corpus(&store).await?;

    // Serving-side embedder is down: the cache is valid but queries cannot
    // be embedded, so only the keyword strategy contributes.
    let engine = search_engine_over(&store, Arc::new(OfflineEmbedder)).await?;
    let results = engine.search("enterprise support tiers", 5).await?;

    assert!(!results.is_empty());
    assert!(results.iter().all(|r| r.strategy == SearchStrategy::Keyword));
    assert_eq!(results[0].text, PAGE_PRICING);

    let stats = engine.stats();
    assert_eq!(stats.direct_hits, 0);
    assert_eq!(stats.expanded_hits, 0);
    assert!(stats.keyword_hits > 0);
    Ok(())
}

#[tokio::test]
async fn test_distinct_texts_never_repeat_in_results() -> Result<()> {
    let store = CorpusStore::open_memory().await?;
    build_fixture_corpus(&store).await?;

    let engine = search_engine_over(&store, Arc::new(TableEmbedder::fixture())).await?;
    // Question both embeds onto the refunds axis and shares the word
    // "refunds" with the refunds fragment.
    let results = engine.search("How do refunds work?", 5).await?;

    let refund_entries = results
        .iter()
        .filter(|r| r.text == PAGE_REFUNDS)
        .count();
    assert_eq!(refund_entries, 1);

    // Ranking is non-increasing
    for pair in results.windows(2) {
        assert!(pair[0].similarity >= pair[1].similarity);
    }
    Ok(())
}

#[tokio::test]
async fn test_index_load_requires_built_corpus() -> Result<()> {
    let store = CorpusStore::open_memory().await?;
    assert!(FlatCosineIndex::load(&store).await.is_err());
    Ok(())
}
