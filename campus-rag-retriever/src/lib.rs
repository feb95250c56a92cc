//! campus-rag-retriever: local document retrieval over a folder of Markdown files
//!
//! The crate turns a document directory into overlapping paragraph chunks,
//! embeds each chunk through an [`EmbeddingProvider`](campus_rag_embed::EmbeddingProvider),
//! caches the vectors in SQLite and answers similarity queries with a filtered
//! top-K result set.
//!
//! ## Key Modules
//!
//! - **[`retrieval`]**: the retrieval index, document enumeration, keyword
//!   filtering, similarity and the process-wide index registry
//! - **[`storage`]**: storage traits with a SQLite implementation
//! - **[`error`]**: the crate error type
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use campus_rag_embed::{EmbedConfig, OllamaProvider};
//! use campus_rag_retriever::retrieval::rag_index::{IndexConfig, RetrievalIndex, SearchOptions};
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let embedder = Arc::new(OllamaProvider::new(EmbedConfig::default())?);
//! let index = RetrievalIndex::open(IndexConfig::new("docs", "data/rag.sqlite"), embedder).await?;
//!
//! if !index.status().await?.ready {
//!     index.reindex().await?;
//! }
//! for hit in index.search("教务处 办公时间", &SearchOptions::default()).await? {
//!     println!("{:.3} {}#{}", hit.score, hit.source, hit.chunk_index);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! docs/*.md → list + fingerprint → chunk → embed → SQLite (chunks + meta)
//!                                                     ↓
//!                     query → embed → cosine scan → keyword gate → top-K
//! ```
//!
//! The index is only trusted when the stored document fingerprint and embedding
//! model both match the live ones. Rebuilding is always an explicit call to
//! [`reindex`](retrieval::rag_index::RetrievalIndex::reindex).

pub mod error;
pub mod retrieval;
pub mod storage;

pub use error::{Result, RetrieverError};
