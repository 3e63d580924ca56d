//! Core data types shared across the retrieval pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A successfully fetched page: its URL and the extracted plain text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// URL the text was fetched from
    pub source: String,
    /// Extracted, whitespace-normalized page text
    pub text: String,
}

/// A sentence-aligned slice of a document; the atomic unit of retrieval.
///
/// Fragments are identified by their position (label) in the corpus store,
/// which is also their row position in the vector index. The struct itself
/// carries only the text and its originating URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    /// Chunk text
    pub text: String,
    /// URL of the document this fragment was cut from
    pub source: String,
}

/// Which retrieval strategy produced a search result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchStrategy {
    /// Vector similarity against the question itself
    Direct,
    /// Vector similarity against a synonym-rewritten question
    Expanded,
    /// Lexical keyword containment scan
    Keyword,
}

impl SearchStrategy {
    /// Short lowercase name, matching the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchStrategy::Direct => "direct",
            SearchStrategy::Expanded => "expanded",
            SearchStrategy::Keyword => "keyword",
        }
    }
}

impl fmt::Display for SearchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ranked retrieval hit.
///
/// `similarity` is comparable across strategies: cosine similarity in
/// `[-1, 1]` for vector strategies, matched-fraction in `[0, 1]` for the
/// keyword strategy. Results are ranked on this single scale.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    /// Fragment text
    pub text: String,
    /// URL of the originating document
    pub source: String,
    /// Strategy-specific relevance score, higher is better
    pub similarity: f32,
    /// Strategy that admitted this result
    pub strategy: SearchStrategy,
}
