//! Multi-strategy retrieval over the fragment corpus.
//!
//! A search fans out to three strategies and fuses their results into one
//! ranked list:
//!
//! 1. **Direct**: cosine similarity between the question vector and every
//!    fragment vector.
//! 2. **Expanded**: the question is rewritten through a synonym table and the
//!    first rewrites are searched concurrently; only hits above a similarity
//!    threshold are admitted.
//! 3. **Keyword**: a lexical containment scan scoring fragments by the
//!    fraction of question keywords they contain.
//!
//! Fusion deduplicates by exact fragment text with first-writer-wins (the
//! strategy order above), then stable-sorts by score descending and truncates
//! to `top_k`. Similarity scores stay on one comparable scale: cosine
//! similarity for vector strategies, matched-fraction for keywords.
//!
//! If the question cannot be embedded the vector strategies are skipped with
//! a warning and the keyword strategy still runs, so retrieval degrades
//! instead of failing while the embedding endpoint is down.

use crate::retrieval::embedding_cache::EmbeddingCache;
use crate::retrieval::nn_index::NearestNeighborIndex;
use crate::retrieval::types::{Fragment, SearchResult, SearchStrategy};
use anyhow::Result;
use regex::Regex;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Default number of neighbors per expanded-query search.
pub const DEFAULT_EXPANSION_K: usize = 5;

/// Default similarity threshold for admitting expanded-query hits.
pub const DEFAULT_EXPANSION_THRESHOLD: f32 = 0.6;

/// Default number of query rewrites searched per question.
pub const DEFAULT_MAX_EXPANSIONS: usize = 2;

/// Default minimum keyword token length in characters.
pub const DEFAULT_KEYWORD_MIN_LENGTH: usize = 3;

/// Default minimum matched keywords for a fragment to score.
pub const DEFAULT_KEYWORD_MIN_MATCHES: usize = 1;

/// Default cap on keyword results per search.
pub const DEFAULT_KEYWORD_CAP: usize = 5;

/// Synonym rewrites applied when the trigger word occurs in the question.
const SYNONYM_REWRITES: &[(&str, &[&str])] = &[
    ("project", &["case study", "solution", "engagement"]),
    ("bot", &["chatbot", "assistant", "virtual agent"]),
    ("algorithm", &["model", "neural network", "machine learning"]),
    ("company", &["client", "customer", "organization"]),
    ("technology", &["platform", "system", "tool"]),
    ("analysis", &["analytics", "processing", "research"]),
    ("automation", &["optimization", "streamlining"]),
];

/// Question words that carry no retrieval signal.
const STOP_WORDS: &[&str] = &[
    "how", "what", "where", "when", "why", "which", "who", "the", "and", "for", "are", "was",
    "were", "can", "could", "this", "that", "does", "did", "has", "have", "had", "with", "about",
    "your", "you", "not",
];

/// Tuning knobs for the expansion and keyword strategies.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Neighbors fetched per expanded-query search
    pub expansion_k: usize,
    /// Minimum similarity for an expanded hit to be admitted
    pub expansion_threshold: f32,
    /// Number of rewrites searched per question
    pub max_expansions: usize,
    /// Minimum keyword token length in characters
    pub keyword_min_length: usize,
    /// Minimum matched keywords for a fragment to score
    pub keyword_min_matches: usize,
    /// Cap on keyword results per search
    pub keyword_cap: usize,
}

impl Default for SearchConfig {
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

impl SearchConfig {
    /// Set the neighbors fetched per expanded-query search.
    pub fn with_expansion_k(mut self, expansion_k: usize) -> Self {
        self.expansion_k = expansion_k;
        self
    }

    /// Set the similarity threshold for expanded hits.
    pub fn with_expansion_threshold(mut self, expansion_threshold: f32) -> Self {
        self.expansion_threshold = expansion_threshold;
        self
    }

    /// Set the number of rewrites searched per question.
    pub fn with_max_expansions(mut self, max_expansions: usize) -> Self {
        self.max_expansions = max_expansions;
        self
    }

    /// Set the minimum keyword token length.
    pub fn with_keyword_min_length(mut self, keyword_min_length: usize) -> Self {
        self.keyword_min_length = keyword_min_length.max(1);
        self
    }

    /// Set the minimum matched keywords for a fragment to score.
    pub fn with_keyword_min_matches(mut self, keyword_min_matches: usize) -> Self {
        self.keyword_min_matches = keyword_min_matches.max(1);
        self
    }

    /// Set the cap on keyword results.
    pub fn with_keyword_cap(mut self, keyword_cap: usize) -> Self {
        self.keyword_cap = keyword_cap;
        self
    }
}

/// Per-strategy admission counters.
#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct SearchStats {
    pub total_searches: u64,
    pub direct_hits: u64,
    pub expanded_hits: u64,
    pub keyword_hits: u64,
}

/// Multi-strategy search over the corpus.
///
/// Holds the embedding cache for query vectors, the nearest-neighbor index,
/// and the label-ordered fragments the index rows refer to. All lookups are
/// read-only, so one engine serves concurrent searches.
pub struct SearchEngine {
    cache: Arc<EmbeddingCache>,
    index: Arc<dyn NearestNeighborIndex>,
    fragments: Arc<Vec<Fragment>>,
    config: SearchConfig,
    keyword_pattern: Regex,
    stats: Mutex<SearchStats>,
}

impl SearchEngine {
    /// Creates a search engine over a label-aligned index/fragment pair.
    pub fn new(
        cache: Arc<EmbeddingCache>,
        index: Arc<dyn NearestNeighborIndex>,
        fragments: Arc<Vec<Fragment>>,
        config: SearchConfig,
    ) -> Self {
        let keyword_pattern =
            Regex::new(&format!(r"\p{{Alphabetic}}{{{},}}", config.keyword_min_length)).unwrap();
        Self {
            cache,
            index,
            fragments,
            config,
            keyword_pattern,
            stats: Mutex::new(SearchStats::default()),
        }
    }

    /// Rewrites the question through the synonym table.
    ///
    /// The original question always comes first; every trigger word found in
    /// the lowercased question contributes one rewrite per synonym.
    pub fn expand_query(&self, question: &str) -> Vec<String> {
        let lowered = question.to_lowercase();
        let mut expanded = vec![question.to_string()];

        for (trigger, synonyms) in SYNONYM_REWRITES {
            if lowered.contains(trigger) {
                for synonym in *synonyms {
                    expanded.push(lowered.replace(trigger, synonym));
                }
            }
        }

        expanded
    }

    /// Extracts search keywords from the question: lowercased alphabetic
    /// tokens of the configured minimum length, minus stop words, first
    /// occurrence kept.
    pub fn extract_keywords(&self, question: &str) -> Vec<String> {
        let lowered = question.to_lowercase();
        let mut seen = HashSet::new();
        let mut keywords = Vec::new();

        for token in self.keyword_pattern.find_iter(&lowered) {
            let token = token.as_str();
            if STOP_WORDS.contains(&token) {
                continue;
            }
            if seen.insert(token.to_string()) {
                keywords.push(token.to_string());
            }
        }

        keywords
    }

    /// Runs all strategies for `question` and returns the fused ranking,
    /// truncated to `top_k`.
    pub async fn search(&self, question: &str, top_k: usize) -> Result<Vec<SearchResult>> {
        let mut pool: Vec<SearchResult> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut direct_hits = 0u64;
        let mut expanded_hits = 0u64;
        let mut keyword_hits = 0u64;

        let question_vector = match self.cache.embed_query(question).await {
            Ok(vector) => Some(vector),
            Err(error) => {
                tracing::warn!("question embedding failed, skipping vector search: {error}");
                None
            }
        };

        if let Some(vector) = &question_vector {
            for (label, distance) in self.index.query(vector, top_k).await? {
                let Some(fragment) = self.fragments.get(label as usize) else {
                    continue;
                };
                if seen.insert(fragment.text.clone()) {
                    pool.push(SearchResult {
                        text: fragment.text.clone(),
                        source: fragment.source.clone(),
                        similarity: 1.0 - distance,
                        strategy: SearchStrategy::Direct,
                    });
                    direct_hits += 1;
                }
            }
        }

        if question_vector.is_some() {
            let rewrites: Vec<String> = self
                .expand_query(question)
                .into_iter()
                .skip(1)
                .take(self.config.max_expansions)
                .filter(|rewrite| rewrite != question)
                .collect();

            let embeds =
                futures::future::join_all(rewrites.iter().map(|r| self.cache.embed_query(r)))
                    .await;

            for (rewrite, embedded) in rewrites.iter().zip(embeds) {
                let vector = match embedded {
                    Ok(vector) => vector,
                    Err(error) => {
                        tracing::warn!("rewrite {rewrite:?} embedding failed: {error}");
                        continue;
                    }
                };

                for (label, distance) in self.index.query(&vector, self.config.expansion_k).await? {
                    let similarity = 1.0 - distance;
                    if similarity <= self.config.expansion_threshold {
                        continue;
                    }
                    let Some(fragment) = self.fragments.get(label as usize) else {
                        continue;
                    };
                    if seen.insert(fragment.text.clone()) {
                        pool.push(SearchResult {
                            text: fragment.text.clone(),
                            source: fragment.source.clone(),
                            similarity,
                            strategy: SearchStrategy::Expanded,
                        });
                        expanded_hits += 1;
                    }
                }
            }
        }

        let keywords = self.extract_keywords(question);
        if !keywords.is_empty() {
            let fragments = Arc::clone(&self.fragments);
            let min_matches = self.config.keyword_min_matches;
            let cap = self.config.keyword_cap;
            let scan = tokio::task::spawn_blocking(move || {
                keyword_scan(&fragments, &keywords, min_matches, cap)
            })
            .await?;

            for result in scan {
                if seen.insert(result.text.clone()) {
                    pool.push(result);
                    keyword_hits += 1;
                }
            }
        }

        // Stable sort keeps earlier strategies first among ties
        pool.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
        });
        pool.truncate(top_k);

        {
            let mut stats = self.stats.lock().unwrap();
            stats.total_searches += 1;
            stats.direct_hits += direct_hits;
            stats.expanded_hits += expanded_hits;
            stats.keyword_hits += keyword_hits;
        }

        tracing::debug!(
            "search {:?}: {} direct, {} expanded, {} keyword, {} returned",
            question,
            direct_hits,
            expanded_hits,
            keyword_hits,
            pool.len()
        );

        Ok(pool)
    }

    /// Snapshot of the per-strategy counters.
    pub fn stats(&self) -> SearchStats {
        *self.stats.lock().unwrap()
    }
}

/// Scores fragments by the fraction of keywords they contain (substring
/// containment over lowercased text), keeping the best `cap` with at least
/// `min_matches` matched keywords.
fn keyword_scan(
    fragments: &[Fragment],
    keywords: &[String],
    min_matches: usize,
    cap: usize,
) -> Vec<SearchResult> {
    let mut results = Vec::new();

    for fragment in fragments {
        let lowered = fragment.text.to_lowercase();
        let matched = keywords
            .iter()
            .filter(|keyword| lowered.contains(keyword.as_str()))
            .count();
        if matched >= min_matches {
            results.push(SearchResult {
                text: fragment.text.clone(),
                source: fragment.source.clone(),
                similarity: matched as f32 / keywords.len() as f32,
                strategy: SearchStrategy::Keyword,
            });
        }
    }

    results.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
    });
    results.truncate(cap);
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::corpus_store::CorpusStore;
    use crate::retrieval::embedding_cache::EmbeddingCacheConfig;
    use crate::retrieval::nn_index::FlatCosineIndex;
    use async_trait::async_trait;
    use sibyl_embed::{EmbedError, Embedder};
    use std::collections::HashMap;

    /// Embedder answering from a fixed text -> vector table; unknown texts
    /// get a zero vector.
    struct TableEmbedder {
        table: HashMap<String, Vec<f32>>,
    }

    impl TableEmbedder {
        fn new(entries: &[(&str, [f32; 3])]) -> Self {
            let table = entries
                .iter()
                .map(|(text, vector)| (text.to_string(), vector.to_vec()))
                .collect();
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
            "table-model"
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        async fn embed_batch(&self, _texts: &[String]) -> sibyl_embed::Result<Vec<Vec<f32>>> {
            Err(EmbedError::Api {
                status: 500,
                message: "down".to_string(),
            })
        }

        fn dimension(&self) -> usize {
            3
        }

        fn model_id(&self) -> &str {
            "failing-model"
        }
    }

    fn fragment(text: &str, source: &str) -> Fragment {
        Fragment {
            text: text.to_string(),
            source: source.to_string(),
        }
    }

    async fn engine_with(
        embedder: Arc<dyn Embedder>,
        fragments: Vec<Fragment>,
        vectors: Vec<Vec<f32>>,
        config: SearchConfig,
    ) -> SearchEngine {
        let store = CorpusStore::open_memory().await.unwrap();
        let cache = EmbeddingCache::load(store, embedder, EmbeddingCacheConfig::default())
            .await
            .unwrap();
        SearchEngine::new(
            Arc::new(cache),
            Arc::new(FlatCosineIndex::build(vectors)),
            Arc::new(fragments),
            config,
        )
    }

    #[tokio::test]
    async fn test_expand_query_without_trigger() {
        let engine = engine_with(
            Arc::new(TableEmbedder::new(&[])),
            vec![],
            vec![],
            SearchConfig::default(),
        )
        .await;

        let expanded = engine.expand_query("Where is the office located");
        assert_eq!(expanded, vec!["Where is the office located".to_string()]);
    }

    #[tokio::test]
    async fn test_expand_query_with_trigger() {
        let engine = engine_with(
            Arc::new(TableEmbedder::new(&[])),
            vec![],
            vec![],
            SearchConfig::default(),
        )
        .await;

        let expanded = engine.expand_query("Tell me about the Project scope");
        assert_eq!(expanded[0], "Tell me about the Project scope");
        assert!(expanded.contains(&"tell me about the case study scope".to_string()));
        assert!(expanded.contains(&"tell me about the engagement scope".to_string()));
    }

    #[tokio::test]
    async fn test_extract_keywords_filters_and_dedups() {
        let engine = engine_with(
            Arc::new(TableEmbedder::new(&[])),
            vec![],
            vec![],
            SearchConfig::default(),
        )
        .await;

        let keywords = engine.extract_keywords("How did the Pricing pricing model work?");
        assert_eq!(keywords, vec!["pricing".to_string(), "model".to_string(), "work".to_string()]);
    }

    #[test]
    fn test_keyword_scan_scores_by_fraction() {
        let fragments = vec![
            fragment("Pricing model for enterprise tiers.", "https://a"),
            fragment("Pricing page only.", "https://b"),
            fragment("Unrelated content.", "https://c"),
        ];
        let keywords = vec!["pricing".to_string(), "model".to_string()];

        let results = keyword_scan(&fragments, &keywords, 1, 5);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].source, "https://a");
        assert!((results[0].similarity - 1.0).abs() < 1e-6);
        assert!((results[1].similarity - 0.5).abs() < 1e-6);
        assert_eq!(results[0].strategy, SearchStrategy::Keyword);
    }

    #[test]
    fn test_keyword_scan_min_matches_and_cap() {
        let fragments: Vec<Fragment> = (0..10)
            .map(|i| fragment(&format!("shared text {i}"), "https://s"))
            .collect();
        let keywords = vec!["shared".to_string(), "absent".to_string()];

        let capped = keyword_scan(&fragments, &keywords, 1, 4);
        assert_eq!(capped.len(), 4);

        let strict = keyword_scan(&fragments, &keywords, 2, 4);
        assert!(strict.is_empty());
    }

    #[tokio::test]
    async fn test_direct_search_ranks_exact_match_first() {
        let question = "What does the onboarding flow look like?";
        let embedder = TableEmbedder::new(&[(question, [1.0, 0.0, 0.0])]);
        let engine = engine_with(
            Arc::new(embedder),
            vec![
                fragment("Onboarding starts with an intake call.", "https://a"),
                fragment("Unrelated billing notes.", "https://b"),
            ],
            vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]],
            SearchConfig::default(),
        )
        .await;

        let results = engine.search(question, 2).await.unwrap();
        assert_eq!(results[0].source, "https://a");
        assert_eq!(results[0].strategy, SearchStrategy::Direct);
        assert!((results[0].similarity - 1.0).abs() < 1e-5);
        assert_eq!(engine.stats().direct_hits, 2);
    }

    #[tokio::test]
    async fn test_expanded_strategy_admits_above_threshold() {
        let question = "Project details";
        // Direct vector points at the first axis; the first rewrite
        // ("case study details") points at the third.
        let embedder = TableEmbedder::new(&[
            (question, [1.0, 0.0, 0.0]),
            ("case study details", [0.0, 0.0, 1.0]),
        ]);
        let fragments = vec![
            fragment("Axis zero content.", "https://0"),
            fragment("Mixed content one.", "https://1"),
            fragment("Axis two content.", "https://2"),
            fragment("Mixed content three.", "https://3"),
            fragment("Axis one content.", "https://4"),
        ];
        let vectors = vec![
            vec![1.0, 0.0, 0.0],
            vec![1.0, 1.0, 0.0],
            vec![0.0, 0.0, 1.0],
            vec![1.0, 2.0, 0.0],
            vec![0.0, 1.0, 0.0],
        ];
        let engine = engine_with(
            Arc::new(embedder),
            fragments,
            vectors,
            SearchConfig::default(),
        )
        .await;

        let results = engine.search(question, 3).await.unwrap();
        assert_eq!(results.len(), 3);

        let expanded: Vec<&SearchResult> = results
            .iter()
            .filter(|r| r.strategy == SearchStrategy::Expanded)
            .collect();
        assert_eq!(expanded.len(), 1);
        assert_eq!(expanded[0].source, "https://2");
        assert!(expanded[0].similarity > 0.6);
    }

    #[tokio::test]
    async fn test_embed_failure_degrades_to_keyword_only() {
        let engine = engine_with(
            Arc::new(FailingEmbedder),
            vec![
                fragment("The warranty covers two years.", "https://a"),
                fragment("Shipping takes five days.", "https://b"),
            ],
            vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]],
            SearchConfig::default(),
        )
        .await;

        let results = engine.search("warranty length", 5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].strategy, SearchStrategy::Keyword);
        assert_eq!(results[0].source, "https://a");
        assert_eq!(engine.stats().direct_hits, 0);
    }

    #[tokio::test]
    async fn test_dedup_keeps_first_strategy() {
        let question = "warranty coverage";
        let embedder = TableEmbedder::new(&[(question, [1.0, 0.0, 0.0])]);
        let engine = engine_with(
            Arc::new(embedder),
            vec![fragment("The warranty covers coverage terms.", "https://a")],
            vec![vec![1.0, 0.0, 0.0]],
            SearchConfig::default(),
        )
        .await;

        // Admitted by direct search and matched by keywords; only the direct
        // result survives.
        let results = engine.search(question, 5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].strategy, SearchStrategy::Direct);
        assert_eq!(engine.stats().keyword_hits, 0);
    }

    #[tokio::test]
    async fn test_results_truncated_to_top_k() {
        let question = "shared token everywhere";
        let embedder = TableEmbedder::new(&[(question, [1.0, 0.0, 0.0])]);
        let fragments: Vec<Fragment> = (0..6)
            .map(|i| fragment(&format!("shared fragment number {i}"), "https://s"))
            .collect();
        let vectors = (0..6).map(|_| vec![1.0, 0.0, 0.0]).collect();
        let engine = engine_with(
            Arc::new(embedder),
            fragments,
            vectors,
            SearchConfig::default(),
        )
        .await;

        let results = engine.search(question, 2).await.unwrap();
        assert_eq!(results.len(), 2);
    }
}
