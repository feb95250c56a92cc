//! Storage abstraction layer for the retrieval index
//!
//! The index persists two things: the chunk rows (text plus embedding vector)
//! and a small key/value metadata table that records which document set and
//! which embedding model the rows were built from.
//!
//! ## Key Components
//!
//! - **MetadataStore**: key/value reads and writes for the validity key
//! - **ChunkStore**: durable chunk rows
//! - **IndexStore**: both of the above, the shape the retrieval index holds
//!
//! ```text
//! MetadataStore ─┐
//!                ├─ IndexStore ── SqliteStore (concrete implementation)
//! ChunkStore ────┘
//! ```

use crate::error::Result;
use async_trait::async_trait;

pub mod sqlite_store;

/// Meta key holding the fingerprint of the document set the chunks came from.
pub const META_DOCS_FINGERPRINT: &str = "docs_fingerprint";

/// Meta key holding the embedding model identifier used for the vectors.
pub const META_EMBED_MODEL: &str = "embed_model";

/// Meta key holding the RFC 3339 time of the last successful rebuild.
pub const META_INDEXED_AT: &str = "indexed_at";

/// One retrievable unit: a piece of a document and its embedding.
///
/// `(source, chunk_index)` is unique within a store.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub source: String,
    pub chunk_index: usize,
    pub text: String,
    pub embedding: Vec<f32>,
}

/// Key/value metadata about the stored index.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn get_meta(&self, key: &str) -> Result<Option<String>>;

    /// Insert or overwrite a single key
    async fn set_meta(&self, key: &str, value: &str) -> Result<()>;

    /// Insert or overwrite several keys in one transaction
    async fn set_meta_entries(&self, entries: &[(&str, &str)]) -> Result<()>;

    async fn delete_meta(&self, key: &str) -> Result<()>;
}

/// Durable chunk rows.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Write one row immediately, replacing any row with the same `(source, chunk_index)`
    async fn insert_chunk(&self, chunk: &Chunk) -> Result<()>;

    /// Delete every row and the stored document fingerprint in one transaction.
    ///
    /// Until a new fingerprint is written, whatever rows follow are never
    /// treated as a valid index.
    async fn clear_chunks(&self) -> Result<()>;

    /// Atomically replace every row with `chunks`
    async fn replace_all_chunks(&self, chunks: &[Chunk]) -> Result<()>;

    /// All rows ordered by `(source, chunk_index)` ascending
    async fn load_all_chunks(&self) -> Result<Vec<Chunk>>;

    async fn chunk_count(&self) -> Result<usize>;
}

/// Everything the retrieval index needs from its backing store.
pub trait IndexStore: MetadataStore + ChunkStore {
    /// Human readable location, reported by status
    fn location(&self) -> String;
}
