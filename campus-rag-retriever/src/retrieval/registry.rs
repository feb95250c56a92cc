//! Process-wide cache of retrieval indexes.
//!
//! Opening an index loads every chunk into memory, so callers that serve many
//! requests share one [`RetrievalIndex`] per `(docs_dir, db_path)` pair for the
//! lifetime of the process.

use crate::error::Result;
use crate::retrieval::rag_index::{IndexConfig, RetrievalIndex};
use campus_rag_embed::EmbeddingProvider;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use tokio::sync::Mutex;

type RegistryKey = (PathBuf, PathBuf);

static INDEX_REGISTRY: OnceLock<Mutex<HashMap<RegistryKey, Arc<RetrievalIndex>>>> =
    OnceLock::new();

fn registry() -> &'static Mutex<HashMap<RegistryKey, Arc<RetrievalIndex>>> {
    INDEX_REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Return the shared index for `config.docs_dir` and `config.db_path`,
/// opening it on first use.
///
/// The configuration and embedder only take effect for the call that opens
/// the index; later calls for the same pair get the existing instance.
pub async fn shared_index(
    config: IndexConfig,
    embedder: Arc<dyn EmbeddingProvider>,
) -> Result<Arc<RetrievalIndex>> {
    let key = (config.docs_dir.clone(), config.db_path.clone());
    let mut indexes = registry().lock().await;
    if let Some(index) = indexes.get(&key) {
        return Ok(index.clone());
    }

    tracing::debug!(
        "Opening shared index for {} at {}",
        key.0.display(),
        key.1.display()
    );
    let index = Arc::new(RetrievalIndex::open(config, embedder).await?);
    indexes.insert(key, index.clone());
    Ok(index)
}

/// Number of indexes currently shared.
pub async fn registry_size() -> usize {
    registry().lock().await.len()
}

/// Forget every shared index. Outstanding handles keep working.
pub async fn clear_registry() {
    registry().lock().await.clear();
}
