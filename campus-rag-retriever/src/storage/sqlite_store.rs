//! SQLite implementation of the storage traits
//!
//! ## Database Schema
//!
//! ```sql
//! CREATE TABLE meta (
//!     key TEXT PRIMARY KEY,
//!     value TEXT NOT NULL
//! );
//!
//! CREATE TABLE chunks (
//!     id INTEGER PRIMARY KEY AUTOINCREMENT,
//!     source TEXT NOT NULL,            -- document file name
//!     chunk_index INTEGER NOT NULL,    -- 0-based position within the document
//!     text TEXT NOT NULL,
//!     embedding BLOB NOT NULL,         -- little-endian f32 vector
//!     CONSTRAINT unique_chunk UNIQUE(source, chunk_index)
//! );
//! ```
//!
//! The vector dimension is implied by the blob length. The database runs in WAL
//! mode so readers are not blocked while a rebuild writes rows one by one.

use super::{Chunk, ChunkStore, IndexStore, META_DOCS_FINGERPRINT, MetadataStore};
use crate::error::{Result, RetrieverError};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::path::Path;

const F32_BYTES: usize = std::mem::size_of::<f32>();

/// Encode a vector as a little-endian `f32` blob.
pub fn pack_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decode a little-endian `f32` blob.
///
/// A blob whose length is not a multiple of four bytes is rejected as corrupt.
pub fn unpack_vector(blob: &[u8]) -> Result<Vec<f32>> {
    if blob.len() % F32_BYTES != 0 {
        return Err(RetrieverError::CorruptVector { len: blob.len() });
    }
    Ok(blob
        .chunks_exact(F32_BYTES)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

/// SQLite-backed [`IndexStore`].
#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
    location: String,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path`. Missing parent
    /// directories are created.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| RetrieverError::io(parent, e))?;
        }

        let pool = SqlitePool::connect_with(
            SqliteConnectOptions::new()
                .filename(path)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .busy_timeout(std::time::Duration::from_secs(5))
                .create_if_missing(true),
        )
        .await?;
        Self::new_with_pool(pool, path.display().to_string()).await
    }

    /// In-memory database for tests. The pool is pinned to one connection that
    /// never expires, since every connection would otherwise see its own empty
    /// database.
    pub async fn open_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Self::new_with_pool(pool, ":memory:".to_string()).await
    }

    async fn new_with_pool(pool: SqlitePool, location: String) -> Result<Self> {
        Self::create_tables(&pool).await?;
        Ok(Self { pool, location })
    }

    async fn create_tables(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                text TEXT NOT NULL,
                embedding BLOB NOT NULL,
                CONSTRAINT unique_chunk UNIQUE(source, chunk_index)
            )
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    fn row_to_chunk(row: &sqlx::sqlite::SqliteRow) -> Result<Chunk> {
        let chunk_index: i64 = row.try_get("chunk_index")?;
        let blob: Vec<u8> = row.try_get("embedding")?;
        Ok(Chunk {
            source: row.try_get("source")?,
            chunk_index: chunk_index as usize,
            text: row.try_get("text")?,
            embedding: unpack_vector(&blob)?,
        })
    }
}

const UPSERT_CHUNK: &str = r#"
    INSERT INTO chunks (source, chunk_index, text, embedding)
    VALUES (?, ?, ?, ?)
    ON CONFLICT(source, chunk_index) DO UPDATE SET
        text = excluded.text,
        embedding = excluded.embedding
"#;

const UPSERT_META: &str = r#"
    INSERT INTO meta (key, value) VALUES (?, ?)
    ON CONFLICT(key) DO UPDATE SET value = excluded.value
"#;

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM meta WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(match row {
            Some(row) => Some(row.try_get("value")?),
            None => None,
        })
    }

    async fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(UPSERT_META)
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_meta_entries(&self, entries: &[(&str, &str)]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for (key, value) in entries {
            sqlx::query(UPSERT_META)
                .bind(*key)
                .bind(*value)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn delete_meta(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM meta WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ChunkStore for SqliteStore {
    async fn insert_chunk(&self, chunk: &Chunk) -> Result<()> {
        sqlx::query(UPSERT_CHUNK)
            .bind(&chunk.source)
            .bind(chunk.chunk_index as i64)
            .bind(&chunk.text)
            .bind(pack_vector(&chunk.embedding))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn clear_chunks(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM chunks").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM meta WHERE key = ?")
            .bind(META_DOCS_FINGERPRINT)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn replace_all_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM chunks").execute(&mut *tx).await?;
        for chunk in chunks {
            sqlx::query(UPSERT_CHUNK)
                .bind(&chunk.source)
                .bind(chunk.chunk_index as i64)
                .bind(&chunk.text)
                .bind(pack_vector(&chunk.embedding))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn load_all_chunks(&self) -> Result<Vec<Chunk>> {
        let rows = sqlx::query(
            "SELECT source, chunk_index, text, embedding FROM chunks ORDER BY source ASC, chunk_index ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::row_to_chunk).collect()
    }

    async fn chunk_count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }
}

impl IndexStore for SqliteStore {
    fn location(&self) -> String {
        self.location.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::META_EMBED_MODEL;
    use tempfile::tempdir;

    fn chunk(source: &str, chunk_index: usize, embedding: Vec<f32>) -> Chunk {
        Chunk {
            source: source.to_string(),
            chunk_index,
            text: format!("{source} #{chunk_index}"),
            embedding,
        }
    }

    #[test]
    fn test_pack_unpack_vector() {
        let vector = vec![0.0, -1.5, 3.25, f32::MIN_POSITIVE, 1e-12];
        let blob = pack_vector(&vector);
        assert_eq!(blob.len(), vector.len() * 4);
        assert_eq!(&blob[4..8], &(-1.5f32).to_le_bytes());
        assert_eq!(unpack_vector(&blob).unwrap(), vector);

        assert!(unpack_vector(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_unpack_rejects_truncated_blob() {
        let err = unpack_vector(&[0, 0, 128, 63, 1]).unwrap_err();
        assert!(matches!(err, RetrieverError::CorruptVector { len: 5 }));
    }

    #[tokio::test]
    async fn test_meta_roundtrip() -> anyhow::Result<()> {
        let store = SqliteStore::open_memory().await?;

        assert_eq!(store.get_meta(META_EMBED_MODEL).await?, None);
        store.set_meta(META_EMBED_MODEL, "nomic-embed-text").await?;
        store.set_meta(META_EMBED_MODEL, "bge-m3").await?;
        assert_eq!(store.get_meta(META_EMBED_MODEL).await?.as_deref(), Some("bge-m3"));

        store
            .set_meta_entries(&[(META_DOCS_FINGERPRINT, "abc"), (META_EMBED_MODEL, "m")])
            .await?;
        assert_eq!(store.get_meta(META_DOCS_FINGERPRINT).await?.as_deref(), Some("abc"));
        assert_eq!(store.get_meta(META_EMBED_MODEL).await?.as_deref(), Some("m"));

        store.delete_meta(META_EMBED_MODEL).await?;
        assert_eq!(store.get_meta(META_EMBED_MODEL).await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_chunks_load_in_source_then_index_order() -> anyhow::Result<()> {
        let store = SqliteStore::open_memory().await?;

        store.insert_chunk(&chunk("b.md", 1, vec![1.0])).await?;
        store.insert_chunk(&chunk("a.md", 0, vec![2.0, 3.0])).await?;
        store.insert_chunk(&chunk("b.md", 0, vec![4.0])).await?;

        let loaded = store.load_all_chunks().await?;
        let keys: Vec<_> = loaded
            .iter()
            .map(|c| (c.source.as_str(), c.chunk_index))
            .collect();
        assert_eq!(keys, vec![("a.md", 0), ("b.md", 0), ("b.md", 1)]);
        assert_eq!(loaded[0].embedding, vec![2.0, 3.0]);
        assert_eq!(store.chunk_count().await?, 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_insert_chunk_replaces_same_position() -> anyhow::Result<()> {
        let store = SqliteStore::open_memory().await?;

        store.insert_chunk(&chunk("a.md", 0, vec![1.0])).await?;
        let mut updated = chunk("a.md", 0, vec![9.0, 9.0]);
        updated.text = "replaced".to_string();
        store.insert_chunk(&updated).await?;

        let loaded = store.load_all_chunks().await?;
        assert_eq!(loaded, vec![updated]);
        Ok(())
    }

    #[tokio::test]
    async fn test_clear_chunks_invalidates_fingerprint_only() -> anyhow::Result<()> {
        let store = SqliteStore::open_memory().await?;
        store.insert_chunk(&chunk("a.md", 0, vec![1.0])).await?;
        store
            .set_meta_entries(&[(META_DOCS_FINGERPRINT, "fp"), (META_EMBED_MODEL, "m")])
            .await?;

        store.clear_chunks().await?;

        assert_eq!(store.chunk_count().await?, 0);
        assert_eq!(store.get_meta(META_DOCS_FINGERPRINT).await?, None);
        assert_eq!(store.get_meta(META_EMBED_MODEL).await?.as_deref(), Some("m"));
        Ok(())
    }

    #[tokio::test]
    async fn test_replace_all_chunks() -> anyhow::Result<()> {
        let store = SqliteStore::open_memory().await?;
        store.insert_chunk(&chunk("old.md", 0, vec![1.0])).await?;

        let fresh = vec![chunk("a.md", 0, vec![0.5]), chunk("a.md", 1, vec![0.25])];
        store.replace_all_chunks(&fresh).await?;

        assert_eq!(store.load_all_chunks().await?, fresh);
        Ok(())
    }

    #[tokio::test]
    async fn test_corrupt_blob_fails_load() -> anyhow::Result<()> {
        let store = SqliteStore::open_memory().await?;
        sqlx::query("INSERT INTO chunks (source, chunk_index, text, embedding) VALUES ('a.md', 0, 't', ?)")
            .bind(vec![1u8, 2, 3])
            .execute(&store.pool)
            .await?;

        let err = store.load_all_chunks().await.unwrap_err();
        assert!(matches!(err, RetrieverError::CorruptVector { len: 3 }));
        Ok(())
    }

    #[tokio::test]
    async fn test_file_store_persists_and_creates_parent() -> anyhow::Result<()> {
        let temp_dir = tempdir()?;
        let db_path = temp_dir.path().join("nested").join("rag.sqlite");

        {
            let store = SqliteStore::open(&db_path).await?;
            store.insert_chunk(&chunk("a.md", 0, vec![1.0, 2.0])).await?;
            store.set_meta(META_EMBED_MODEL, "m").await?;
            assert_eq!(store.location(), db_path.display().to_string());
        }

        let reopened = SqliteStore::open(&db_path).await?;
        assert_eq!(reopened.chunk_count().await?, 1);
        assert_eq!(reopened.get_meta(META_EMBED_MODEL).await?.as_deref(), Some("m"));
        Ok(())
    }
}
