//! # campus-rag-embed
//!
//! Client side of the embedding capability used by the retrieval index. The
//! index never runs a model itself; it asks an [`EmbeddingProvider`] for one
//! vector per text and stores whatever comes back.
//!
//! ## Quick Start
//!
//! ```no_run
//! use campus_rag_embed::{EmbedConfig, EmbeddingProvider, OllamaProvider};
//!
//! # async fn example() -> campus_rag_embed::Result<()> {
//! let provider = OllamaProvider::new(EmbedConfig::default())?;
//! let vector = provider.embed_text("教务处办公时间").await?;
//! println!("{} dimensions from {}", vector.len(), provider.model_name());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`config`]: service location, model name and timeout, with environment loading
//! - [`provider`]: the provider trait and the Ollama HTTP implementation
//! - [`error`]: error types and result handling
//!
//! ## Error Handling
//!
//! All operations return [`Result<T>`] using the crate's [`EmbedError`] type.
//! There are no retries apart from the fallback between the two Ollama
//! endpoints.

pub mod config;
pub mod error;
pub mod provider;

// Re-export main types for easy access
pub use config::EmbedConfig;
pub use error::{EmbedError, Result};
pub use provider::{EmbeddingProvider, EmbeddingResult, OllamaProvider};
