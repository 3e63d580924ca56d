//! Core SQLite database operations for corpus and embedding-cache storage.
//!
//! This module provides the foundational data layer for sibyl-retriever,
//! implementing direct SQLite operations for storing labeled fragments, their
//! embedding vectors, and the content-addressed embedding cache.
//!
//! ## Key Components
//!
//! - **CorpusStore**: Main database interface with optimized SQLite configuration
//! - **CacheMeta**: Versioned header describing the persisted embedding cache
//!
//! ## Database Schema
//!
//! ```sql
//! -- Fragments table: one row per corpus fragment, label = index row
//! CREATE TABLE fragments (
//!     label INTEGER PRIMARY KEY,       -- position in the vector index
//!     source TEXT,                     -- URL of the originating document
//!     text TEXT,                       -- fragment text
//!     embedding BLOB                   -- f32 embedding vector
//! );
//!
//! -- Embedding cache: content hash -> vector
//! CREATE TABLE embedding_cache (
//!     text_hash TEXT PRIMARY KEY,      -- blake3 hash of the fragment text
//!     vector BLOB                      -- f32 embedding vector
//! );
//!
//! -- Single-row header describing the cache contents
//! CREATE TABLE embedding_cache_meta (
//!     id INTEGER PRIMARY KEY CHECK (id = 1),
//!     format_version INTEGER,          -- persisted cache format
//!     model_id TEXT,                   -- model that produced the vectors
//!     created_at INTEGER               -- unix timestamp of the last save
//! );
//! ```
//!
//! ## SQLite Optimizations
//!
//! - **WAL mode**: Better concurrency for read/write operations
//! - **Large page size** (64KB): Optimized for embedding blob storage
//! - **Auto-vacuum**: Keeps database size manageable
//! - **Foreign keys**: Maintains referential integrity

use crate::retrieval::types::Fragment;
use anyhow::Result;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::path::Path;

/// Version of the persisted embedding-cache format. Bump when the container
/// layout changes; readers treat other versions as an empty cache.
pub const CACHE_FORMAT_VERSION: i64 = 1;

/// Database file name created under the data directory.
pub const DB_FILE_NAME: &str = "sibyl.db";

/// Header row describing the persisted embedding cache.
///
/// Readers must compare `model_id` (and `format_version`) against the active
/// embedder before trusting any cached vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheMeta {
    /// Persisted cache format version
    pub format_version: i64,
    /// Identifier of the model that produced the cached vectors
    pub model_id: String,
    /// Unix timestamp of the last save
    pub created_at: i64,
}

/// SQLite-based corpus and embedding-cache storage.
///
/// CorpusStore provides low-level database operations for the retrieval
/// pipeline. Fragment labels are their row positions: the fragment stored
/// with label `i` corresponds to row `i` of the vector index, so
/// [`CorpusStore::load_fragments`] and [`CorpusStore::load_embeddings`]
/// return parallel, label-ordered vectors.
#[derive(Clone, Debug)]
pub struct CorpusStore {
    pool: SqlitePool,
}

impl CorpusStore {
    /// Opens the corpus store with persistent SQLite storage under `base`.
    pub async fn open(base: &Path) -> Result<Self> {
        let db_path = base.join(DB_FILE_NAME);

        let pool = SqlitePool::connect_with(
            SqliteConnectOptions::new()
                .filename(db_path)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .busy_timeout(std::time::Duration::from_secs(5))
                .foreign_keys(true)
                .create_if_missing(true)
                .auto_vacuum(sqlx::sqlite::SqliteAutoVacuum::Full)
                .page_size(1 << 16)
                .optimize_on_close(true, 1 << 10),
        )
        .await?;
        Self::new_with_pool(pool).await
    }

    /// Opens the corpus store with in-memory SQLite storage for testing.
    pub async fn open_memory() -> Result<Self> {
        let pool = SqlitePool::connect("sqlite::memory:").await?;
        Self::new_with_pool(pool).await
    }

    async fn new_with_pool(pool: SqlitePool) -> Result<Self> {
        // Create tables directly
        Self::create_tables(&pool).await?;

        Ok(Self { pool })
    }

    async fn create_tables(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS fragments (
                label INTEGER PRIMARY KEY,
                source TEXT NOT NULL,
                text TEXT NOT NULL,
                embedding BLOB NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS embedding_cache (
                text_hash TEXT PRIMARY KEY,
                vector BLOB NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS embedding_cache_meta (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                format_version INTEGER NOT NULL,
                model_id TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_fragments_source ON fragments(source)")
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Replaces the whole fragment table atomically.
    ///
    /// Labels are assigned from position: fragment `i` is stored with label
    /// `i` and must line up with row `i` of the vector index built from
    /// `embeddings`. Existing fragments are dropped in the same transaction,
    /// so a failed build never leaves a half-written corpus behind.
    ///
    /// # Arguments
    /// * `fragments` - Corpus fragments in index order
    /// * `embeddings` - One f32 vector per fragment, parallel to `fragments`
    pub async fn replace_fragments(
        &self,
        fragments: &[Fragment],
        embeddings: &[Vec<f32>],
    ) -> Result<()> {
        anyhow::ensure!(
            fragments.len() == embeddings.len(),
            "fragment/embedding count mismatch: {} vs {}",
            fragments.len(),
            embeddings.len()
        );

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM fragments").execute(&mut *tx).await?;

        for (label, (fragment, embedding)) in fragments.iter().zip(embeddings).enumerate() {
            sqlx::query(
                r#"
                INSERT INTO fragments (label, source, text, embedding)
                VALUES (?1, ?2, ?3, ?4)
                "#,
            )
            .bind(label as i64)
            .bind(&fragment.source)
            .bind(&fragment.text)
            .bind(bytemuck::cast_slice::<f32, u8>(embedding))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::debug!("stored {} fragments", fragments.len());
        Ok(())
    }

    /// Loads all fragments ordered by label.
    pub async fn load_fragments(&self) -> Result<Vec<Fragment>> {
        let rows = sqlx::query("SELECT source, text FROM fragments ORDER BY label")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| Fragment {
                source: row.get("source"),
                text: row.get("text"),
            })
            .collect())
    }

    /// Loads all fragment embeddings ordered by label, parallel to
    /// [`CorpusStore::load_fragments`].
    pub async fn load_embeddings(&self) -> Result<Vec<Vec<f32>>> {
        let rows = sqlx::query("SELECT embedding FROM fragments ORDER BY label")
            .fetch_all(&self.pool)
            .await?;

        let mut embeddings = Vec::with_capacity(rows.len());
        for row in rows {
            let bytes: Vec<u8> = row.get("embedding");
            embeddings.push(bytemuck::cast_slice::<u8, f32>(&bytes).to_vec());
        }
        Ok(embeddings)
    }

    /// Number of fragments currently stored.
    pub async fn fragment_count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM fragments")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }

    /// Loads the persisted embedding cache, if any.
    ///
    /// Returns the header and all entries as stored. Validity checks (format
    /// version, model identifier) are the caller's job; a store with no saved
    /// header yields `None`.
    pub async fn load_embedding_cache(
        &self,
    ) -> Result<Option<(CacheMeta, HashMap<String, Vec<f32>>)>> {
        let meta_row =
            sqlx::query("SELECT format_version, model_id, created_at FROM embedding_cache_meta WHERE id = 1")
                .fetch_optional(&self.pool)
                .await?;

        let Some(meta_row) = meta_row else {
            return Ok(None);
        };

        let meta = CacheMeta {
            format_version: meta_row.get("format_version"),
            model_id: meta_row.get("model_id"),
            created_at: meta_row.get("created_at"),
        };

        let rows = sqlx::query("SELECT text_hash, vector FROM embedding_cache")
            .fetch_all(&self.pool)
            .await?;

        let mut entries = HashMap::with_capacity(rows.len());
        for row in rows {
            let hash: String = row.get("text_hash");
            let bytes: Vec<u8> = row.get("vector");
            entries.insert(hash, bytemuck::cast_slice::<u8, f32>(&bytes).to_vec());
        }

        Ok(Some((meta, entries)))
    }

    /// Replaces the persisted embedding cache with `entries` in one
    /// transaction, stamping the header with the current format version,
    /// `model_id`, and save time.
    ///
    /// Entries cached under a previous model are dropped here, not at load
    /// time: a model switch ignores stale entries until the next save
    /// physically removes them.
    pub async fn save_embedding_cache(
        &self,
        model_id: &str,
        entries: &HashMap<String, Vec<f32>>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM embedding_cache")
            .execute(&mut *tx)
            .await?;

        for (hash, vector) in entries {
            sqlx::query("INSERT INTO embedding_cache (text_hash, vector) VALUES (?1, ?2)")
                .bind(hash)
                .bind(bytemuck::cast_slice::<f32, u8>(vector))
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query(
            r#"
            INSERT INTO embedding_cache_meta (id, format_version, model_id, created_at)
            VALUES (1, ?1, ?2, ?3)
            ON CONFLICT(id) DO UPDATE SET
                format_version = excluded.format_version,
                model_id = excluded.model_id,
                created_at = excluded.created_at
            "#,
        )
        .bind(CACHE_FORMAT_VERSION)
        .bind(model_id)
        .bind(chrono::Utc::now().timestamp())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::debug!("saved embedding cache with {} entries", entries.len());
        Ok(())
    }

    /// Access to the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
