//! Error types for the retrieval engine

use campus_rag_embed::EmbedError;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, RetrieverError>;

/// Failures surfaced by the store, the document source and the retrieval index.
///
/// An index with no chunks is not an error: searches over it return an empty
/// result list.
#[derive(Debug, thiserror::Error)]
pub enum RetrieverError {
    /// The SQLite store could not be opened, read or written
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// A stored vector blob whose length is not a whole number of `f32`s
    #[error("corrupt vector blob of {len} bytes")]
    CorruptVector { len: usize },

    /// The embedding service failed. During a reindex this aborts the rebuild
    /// and leaves the index stale.
    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbedError),

    /// Missing document directory or unusable options
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// A document or store directory could not be accessed
    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RetrieverError {
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
