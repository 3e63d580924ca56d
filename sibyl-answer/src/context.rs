//! Context assembly from ranked search results.
//!
//! The context builder turns a ranked result list into two artifacts for the
//! completion layer:
//!
//! - a prompt-ready **context block**: results grouped by source, capped per
//!   source, weak matches dropped, each survivor rendered as a labeled block
//!   and joined with a separator;
//! - an ordered **source list**: the distinct source URLs, sorted and capped,
//!   each with a display name derived from the URL path.
//!
//! An empty input produces an empty context string. Callers treat that as
//! "insufficient information", not as an error.

use serde::Serialize;
use sibyl_retriever::retrieval::types::SearchResult;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

/// Default cap on blocks in the assembled context.
pub const DEFAULT_MAX_CONTEXT_BLOCKS: usize = 32;

/// Default cap on blocks contributed by a single source.
pub const DEFAULT_PER_SOURCE_CAP: usize = 10;

/// Results at or below this similarity never reach the context.
pub const DEFAULT_WEAK_MATCH_THRESHOLD: f32 = 0.2;

/// Default cap on entries in the extracted source list.
pub const DEFAULT_SOURCE_LIMIT: usize = 5;

/// Separator between context blocks.
const BLOCK_SEPARATOR: &str = "\n---\n";

/// Tuning knobs for context assembly.
#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// Maximum number of blocks in the assembled context
    pub max_context_blocks: usize,
    /// Maximum number of blocks taken from one source
    pub per_source_cap: usize,
    /// Similarity floor; results at or below it are dropped
    pub weak_match_threshold: f32,
    /// Maximum number of sources in the extracted list
    pub source_limit: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_context_blocks: DEFAULT_MAX_CONTEXT_BLOCKS,
            per_source_cap: DEFAULT_PER_SOURCE_CAP,
            weak_match_threshold: DEFAULT_WEAK_MATCH_THRESHOLD,
            source_limit: DEFAULT_SOURCE_LIMIT,
        }
    }
}

impl ContextConfig {
    /// Set the maximum number of context blocks.
    pub fn with_max_context_blocks(mut self, max_context_blocks: usize) -> Self {
        self.max_context_blocks = max_context_blocks;
        self
    }

    /// Set the per-source block cap.
    pub fn with_per_source_cap(mut self, per_source_cap: usize) -> Self {
        self.per_source_cap = per_source_cap;
        self
    }

    /// Set the weak-match similarity floor.
    pub fn with_weak_match_threshold(mut self, weak_match_threshold: f32) -> Self {
        self.weak_match_threshold = weak_match_threshold;
        self
    }

    /// Set the source list cap.
    pub fn with_source_limit(mut self, source_limit: usize) -> Self {
        self.source_limit = source_limit;
        self
    }
}

/// A citable source: display name plus the URL it points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Source {
    /// Human-readable name derived from the URL path
    pub name: String,
    /// Source URL
    pub url: String,
}

/// Assembles prompt context and source lists from search results.
#[derive(Debug, Clone, Default)]
pub struct ContextBuilder {
    config: ContextConfig,
}

impl ContextBuilder {
    /// Create a builder with the given configuration.
    pub fn new(config: ContextConfig) -> Self {
        Self { config }
    }

    /// Builds the prompt context block from ranked results.
    ///
    /// Results are grouped by source in order of first appearance. Within a
    /// group they are sorted by similarity descending and capped at
    /// `per_source_cap`, then anything at or below `weak_match_threshold` is
    /// dropped. Each survivor becomes one labeled block; the whole context is
    /// capped at `max_context_blocks` blocks.
    ///
    /// # Arguments
    /// * `results` - Ranked search results
    ///
    /// # Returns
    /// The joined context string; empty when nothing survives filtering.
    pub fn create_context(&self, results: &[SearchResult], _question: &str) -> String {
        if results.is_empty() {
            return String::new();
        }

        let mut order: Vec<&str> = Vec::new();
        let mut by_source: HashMap<&str, Vec<&SearchResult>> = HashMap::new();
        for result in results {
            let group = by_source.entry(result.source.as_str()).or_default();
            if group.is_empty() {
                order.push(result.source.as_str());
            }
            group.push(result);
        }

        let mut blocks = Vec::new();
        for source in order {
            let mut group = by_source.remove(source).unwrap_or_default();
            group.sort_by(|a, b| {
                b.similarity
                    .partial_cmp(&a.similarity)
                    .unwrap_or(Ordering::Equal)
            });
            group.truncate(self.config.per_source_cap);

            for result in group {
                if result.similarity > self.config.weak_match_threshold {
                    blocks.push(format!(
                        "Source: {}\nRelevance: {:.2}\nContent: {}\n",
                        result.source, result.similarity, result.text
                    ));
                }
            }
        }

        blocks.truncate(self.config.max_context_blocks);
        blocks.join(BLOCK_SEPARATOR)
    }

    /// Extracts the ordered source list the citation markers resolve against.
    ///
    /// Sources are the distinct result URLs, sorted lexicographically and
    /// capped at `source_limit`. The display name is the last non-empty URL
    /// path segment with hyphens turned into spaces and each word
    /// title-cased.
    pub fn extract_sources(&self, results: &[SearchResult]) -> Vec<Source> {
        let mut urls: BTreeSet<&str> = BTreeSet::new();
        for result in results {
            urls.insert(result.source.as_str());
        }

        urls.into_iter()
            .take(self.config.source_limit)
            .map(|url| Source {
                name: display_name(url),
                url: url.to_string(),
            })
            .collect()
    }
}

/// Derives a display name from the last non-empty path segment of a URL.
fn display_name(url: &str) -> String {
    let segment = url.rsplit('/').find(|s| !s.is_empty()).unwrap_or(url);
    segment
        .split('-')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
