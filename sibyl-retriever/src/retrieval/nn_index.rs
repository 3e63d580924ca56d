//! Nearest-neighbor index contract and the flat cosine implementation.
//!
//! The index answers k-nearest-neighbor queries over the fragment vectors by
//! label. Labels are row positions, so the caller resolves them back to
//! fragments through the label-ordered corpus loaded from the store.
//!
//! [`FlatCosineIndex`] is an exact brute-force scan. At corpus sizes where an
//! approximate structure would matter, swap in another [`NearestNeighborIndex`]
//! implementation; exactness here keeps ranking deterministic.

use crate::retrieval::corpus_store::CorpusStore;
use anyhow::Result;
use async_trait::async_trait;
use std::cmp::Ordering;
use std::sync::Arc;

/// K-nearest-neighbor queries over the corpus vectors.
#[async_trait]
pub trait NearestNeighborIndex: Send + Sync {
    /// Returns the `k` nearest labels as `(label, distance)` pairs, ascending
    /// by distance. Fewer pairs come back when the index holds fewer than `k`
    /// vectors.
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<(i64, f32)>>;

    /// Number of vectors in the index.
    fn len(&self) -> usize;

    /// Returns `true` when the index holds no vectors.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Cosine distance in `[0, 2]`; zero-magnitude vectors are defined to be at
/// distance 1 (similarity 0) from everything.
fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Exact brute-force cosine index over the fragment vectors.
///
/// Row `i` holds the vector for the fragment labeled `i`. Queries scan every
/// row on a blocking thread so large corpora do not stall the async runtime.
pub struct FlatCosineIndex {
    vectors: Arc<Vec<Vec<f32>>>,
}

impl FlatCosineIndex {
    /// Builds an index over `vectors`; row positions become labels.
    pub fn build(vectors: Vec<Vec<f32>>) -> Self {
        Self {
            vectors: Arc::new(vectors),
        }
    }

    /// Loads all fragment vectors from the store and builds the index.
    ///
    /// # Returns
    /// The index, or an error when the store holds no fragments (nothing has
    /// been built yet).
    pub async fn load(store: &CorpusStore) -> Result<Self> {
        let vectors = store.load_embeddings().await?;
        anyhow::ensure!(
            !vectors.is_empty(),
            "corpus store holds no fragment vectors; run a corpus build first"
        );
        tracing::info!("loaded vector index with {} rows", vectors.len());
        Ok(Self::build(vectors))
    }
}

#[async_trait]
impl NearestNeighborIndex for FlatCosineIndex {
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<(i64, f32)>> {
        let vectors = Arc::clone(&self.vectors);
        let query = vector.to_vec();

        let hits = tokio::task::spawn_blocking(move || {
            let mut scored: Vec<(i64, f32)> = vectors
                .iter()
                .enumerate()
                .map(|(label, row)| (label as i64, cosine_distance(&query, row)))
                .collect();
            scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
            scored.truncate(k);
            scored
        })
        .await?;

        Ok(hits)
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }
}
