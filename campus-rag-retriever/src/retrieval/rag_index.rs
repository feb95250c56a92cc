//! The retrieval index: cache validation, full rebuilds and filtered search.
//!
//! ## States
//!
//! An index is **fresh** when the store's `docs_fingerprint` equals the
//! fingerprint of the live document directory *and* its `embed_model` equals
//! the configured provider's model. Anything else is **stale**, and a stale
//! index serves no chunks at all. Nothing here rebuilds implicitly: callers
//! check [`RetrievalIndex::status`] and call [`RetrievalIndex::reindex`].
//!
//! ## Search
//!
//! 1. Every loaded chunk is scored by cosine similarity against the query vector.
//! 2. The best `preselect` chunks (default `max(20, top_k * 6)`) form the pool.
//! 3. Pool members must reach `min_score` and, when `min_keyword_hits > 0`,
//!    contain at least that many of the query's keywords.
//! 4. Survivors are returned best first, at most `max(1, top_k)` of them.
//!
//! The keyword gate exists to drop results that are close in embedding space
//! but share no vocabulary with the question.
//!
//! ## Concurrency
//!
//! A reindex holds the index gate exclusively for its whole run. Searches and
//! status calls share it and may overlap each other.

use crate::error::{Result, RetrieverError};
use crate::retrieval::documents::{DEFAULT_EXTENSIONS, fingerprint, list_documents, read_document};
use crate::retrieval::keywords::{extract_keywords, keyword_hits};
use crate::retrieval::similarity::cosine;
use crate::storage::sqlite_store::SqliteStore;
use crate::storage::{
    Chunk, IndexStore, META_DOCS_FINGERPRINT, META_EMBED_MODEL, META_INDEXED_AT,
};
use campus_rag_context::{ChunkerConfig, ParagraphChunker};
use campus_rag_embed::EmbeddingProvider;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, info};

pub const DEFAULT_TOP_K: usize = 5;
pub const DEFAULT_MIN_SCORE: f32 = 0.38;
pub const DEFAULT_MIN_KEYWORD_HITS: usize = 1;

/// Smallest candidate pool used when no explicit preselect size is given
pub const MIN_PRESELECT: usize = 20;

/// Where the index reads documents from and stores vectors.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    pub docs_dir: PathBuf,
    pub db_path: PathBuf,
    /// File extensions treated as documents, case-insensitive
    pub extensions: Vec<String>,
    pub chunker: ChunkerConfig,
    /// Embedding requests kept in flight during a rebuild
    pub embed_concurrency: usize,
}

impl IndexConfig {
    pub fn new(docs_dir: impl Into<PathBuf>, db_path: impl Into<PathBuf>) -> Self {
        Self {
            docs_dir: docs_dir.into(),
            db_path: db_path.into(),
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            chunker: ChunkerConfig::default(),
            embed_concurrency: 1,
        }
    }

    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_chunker(mut self, chunker: ChunkerConfig) -> Self {
        self.chunker = chunker;
        self
    }

    pub fn with_embed_concurrency(mut self, embed_concurrency: usize) -> Self {
        self.embed_concurrency = embed_concurrency;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.embed_concurrency == 0 {
            return Err(RetrieverError::configuration(
                "embed_concurrency must be at least 1",
            ));
        }
        if self.chunker.max_chars == 0 {
            return Err(RetrieverError::configuration("max_chars must be at least 1"));
        }
        if self.extensions.is_empty() {
            return Err(RetrieverError::configuration(
                "at least one document extension is required",
            ));
        }
        Ok(())
    }
}

/// Tuning for a single search call.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOptions {
    pub top_k: usize,
    pub min_score: f32,
    pub min_keyword_hits: usize,
    /// Candidate pool size before filtering; defaults to `max(20, top_k * 6)`
    pub preselect: Option<usize>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            min_score: DEFAULT_MIN_SCORE,
            min_keyword_hits: DEFAULT_MIN_KEYWORD_HITS,
            preselect: None,
        }
    }
}

impl SearchOptions {
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }

    pub fn with_min_keyword_hits(mut self, min_keyword_hits: usize) -> Self {
        self.min_keyword_hits = min_keyword_hits;
        self
    }

    pub fn with_preselect(mut self, preselect: Option<usize>) -> Self {
        self.preselect = preselect;
        self
    }

    /// Number of top scored chunks considered, given `available` chunks.
    pub fn pool_size(&self, available: usize) -> usize {
        let wanted = self
            .preselect
            .unwrap_or_else(|| MIN_PRESELECT.max(self.top_k.saturating_mul(6)))
            .max(1);
        wanted.min(available)
    }

    fn result_limit(&self) -> usize {
        self.top_k.max(1)
    }
}

/// One ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub score: f32,
    pub keyword_hits: usize,
    pub source: String,
    pub chunk_index: usize,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentChunkCount {
    pub source: String,
    pub chunks: usize,
}

/// Summary of a completed rebuild.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReindexReport {
    pub ok: bool,
    pub embedding_model: String,
    /// File names processed, in indexing order
    pub documents: Vec<String>,
    pub chunks: usize,
    pub per_document: Vec<DocumentChunkCount>,
    /// Wall time, rounded to two decimals
    pub seconds: f64,
}

/// Diagnostic view of the index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub docs_dir: String,
    pub store_location: String,
    pub embedding_model: String,
    pub documents_count: usize,
    pub cached_fingerprint: Option<String>,
    pub current_fingerprint: String,
    pub cached_model: Option<String>,
    pub in_memory_chunk_count: usize,
    pub ready: bool,
}

/// Chunks held in memory and the fingerprint they were loaded for.
#[derive(Debug, Default)]
struct LoadedChunks {
    fingerprint: Option<String>,
    chunks: Arc<Vec<Chunk>>,
}

/// Outcome of comparing the store against the live document set.
#[derive(Debug)]
struct Freshness {
    documents_count: usize,
    current_fingerprint: String,
    cached_fingerprint: Option<String>,
    cached_model: Option<String>,
    fresh: bool,
    chunks: Arc<Vec<Chunk>>,
}

/// Vector index over a document directory.
pub struct RetrievalIndex {
    config: IndexConfig,
    store: Arc<dyn IndexStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    chunker: ParagraphChunker,
    gate: RwLock<()>,
    loaded: RwLock<LoadedChunks>,
}

impl std::fmt::Debug for RetrievalIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalIndex")
            .field("config", &self.config)
            .field("store", &self.store.location())
            .field("embedder", &self.embedder.provider_name())
            .field("model", &self.embedder.model_name())
            .finish()
    }
}

impl RetrievalIndex {
    /// Open the SQLite store at `config.db_path` and load any valid cached index.
    pub async fn open(config: IndexConfig, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let store = SqliteStore::open(&config.db_path).await?;
        Self::open_with_store(config, Arc::new(store), embedder).await
    }

    /// Open over an already constructed store.
    pub async fn open_with_store(
        config: IndexConfig,
        store: Arc<dyn IndexStore>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        config.validate()?;
        let index = Self {
            chunker: ParagraphChunker::new(config.chunker),
            config,
            store,
            embedder,
            gate: RwLock::new(()),
            loaded: RwLock::new(LoadedChunks::default()),
        };
        index.ensure_loaded().await?;
        Ok(index)
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn embedding_model(&self) -> &str {
        self.embedder.model_name()
    }

    /// Bring the in-memory chunks in line with the store without rebuilding.
    ///
    /// Returns whether the index is fresh. A stale index has no chunks in memory.
    pub async fn ensure_loaded(&self) -> Result<bool> {
        let _gate = self.gate.read().await;
        Ok(self.refresh().await?.fresh)
    }

    /// Caller must hold the gate.
    async fn refresh(&self) -> Result<Freshness> {
        let documents = list_documents(&self.config.docs_dir, &self.config.extensions).await?;
        let current_fingerprint = fingerprint(&documents);
        let cached_fingerprint = self.store.get_meta(META_DOCS_FINGERPRINT).await?;
        let cached_model = self.store.get_meta(META_EMBED_MODEL).await?;

        let fresh = cached_fingerprint.as_deref() == Some(current_fingerprint.as_str())
            && cached_model.as_deref() == Some(self.embedder.model_name());

        let chunks = if fresh {
            self.load_for(&current_fingerprint).await?
        } else {
            let mut loaded = self.loaded.write().await;
            if loaded.fingerprint.is_some() {
                debug!("Index is stale, dropping in-memory chunks");
            }
            *loaded = LoadedChunks::default();
            loaded.chunks.clone()
        };

        Ok(Freshness {
            documents_count: documents.len(),
            current_fingerprint,
            cached_fingerprint,
            cached_model,
            fresh,
            chunks,
        })
    }

    async fn load_for(&self, fingerprint: &str) -> Result<Arc<Vec<Chunk>>> {
        {
            let loaded = self.loaded.read().await;
            if loaded.fingerprint.as_deref() == Some(fingerprint) {
                return Ok(loaded.chunks.clone());
            }
        }

        let chunks = Arc::new(self.store.load_all_chunks().await?);
        debug!(
            "Loaded {} chunks from {}",
            chunks.len(),
            self.store.location()
        );
        let mut loaded = self.loaded.write().await;
        *loaded = LoadedChunks {
            fingerprint: Some(fingerprint.to_string()),
            chunks: chunks.clone(),
        };
        Ok(chunks)
    }

    /// Rebuild the whole index from the document directory.
    ///
    /// Rows are written one by one as they are embedded. The new fingerprint is
    /// recorded only after every document succeeded, so an aborted rebuild
    /// leaves a stale index that the next successful rebuild overwrites.
    pub async fn reindex(&self) -> Result<ReindexReport> {
        let _gate = self.gate.write().await;
        let started = Instant::now();
        let model = self.embedder.model_name().to_string();

        info!(
            "Reindex started: docs_dir={}, model={}",
            self.config.docs_dir.display(),
            model
        );

        let documents = list_documents(&self.config.docs_dir, &self.config.extensions).await?;
        let current_fingerprint = fingerprint(&documents);

        *self.loaded.write().await = LoadedChunks::default();
        self.store.clear_chunks().await?;

        let concurrency = self.config.embed_concurrency.max(1);
        let mut per_document = Vec::with_capacity(documents.len());
        let mut total_chunks = 0;

        for document in &documents {
            let doc_started = Instant::now();
            let text = read_document(&document.path).await?;
            let pieces = self.chunker.chunk(&text);
            debug!("{}: {} chunks", document.name, pieces.len());

            let mut embedded = stream::iter(pieces.iter().cloned())
                .map(|piece| {
                    let embedder = Arc::clone(&self.embedder);
                    async move { embedder.embed_text(&piece).await }
                })
                .buffered(concurrency);

            let mut chunk_index = 0;
            while let Some(vector) = embedded.next().await {
                let chunk = Chunk {
                    source: document.name.clone(),
                    chunk_index,
                    text: pieces[chunk_index].clone(),
                    embedding: vector?,
                };
                self.store.insert_chunk(&chunk).await?;
                chunk_index += 1;
            }

            info!(
                source = %document.name,
                chunks = pieces.len(),
                seconds = round2(doc_started.elapsed().as_secs_f64()),
                "Indexed document"
            );
            total_chunks += pieces.len();
            per_document.push(DocumentChunkCount {
                source: document.name.clone(),
                chunks: pieces.len(),
            });
        }

        let indexed_at = chrono::Utc::now().to_rfc3339();
        self.store
            .set_meta_entries(&[
                (META_DOCS_FINGERPRINT, current_fingerprint.as_str()),
                (META_EMBED_MODEL, model.as_str()),
                (META_INDEXED_AT, indexed_at.as_str()),
            ])
            .await?;
        self.load_for(&current_fingerprint).await?;

        let report = ReindexReport {
            ok: true,
            embedding_model: model,
            documents: documents.into_iter().map(|d| d.name).collect(),
            chunks: total_chunks,
            per_document,
            seconds: round2(started.elapsed().as_secs_f64()),
        };
        info!(
            "Reindex finished: {}",
            serde_json::to_string(&report).unwrap_or_default()
        );
        Ok(report)
    }

    /// Report freshness and sizes, loading a valid cached index if needed.
    pub async fn status(&self) -> Result<StatusReport> {
        let _gate = self.gate.read().await;
        let state = self.refresh().await?;
        Ok(StatusReport {
            docs_dir: self.config.docs_dir.display().to_string(),
            store_location: self.store.location(),
            embedding_model: self.embedder.model_name().to_string(),
            documents_count: state.documents_count,
            cached_fingerprint: state.cached_fingerprint,
            current_fingerprint: state.current_fingerprint,
            cached_model: state.cached_model,
            in_memory_chunk_count: state.chunks.len(),
            ready: state.fresh,
        })
    }

    /// Rank chunks for `query`. A stale or empty index yields no hits and
    /// makes no embedding call.
    pub async fn search(&self, query: &str, options: &SearchOptions) -> Result<Vec<SearchHit>> {
        let _gate = self.gate.read().await;
        let chunks = self.refresh().await?.chunks;
        if chunks.is_empty() {
            info!("Search hits: none (index empty or stale)");
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.embed_text(query).await?;
        let hits = rank_chunks(&chunks, &query_vector, query, options);

        if hits.is_empty() {
            info!("Search hits: none (filtered)");
        } else {
            for hit in &hits {
                info!(
                    source = %hit.source,
                    chunk_index = hit.chunk_index,
                    score = hit.score,
                    keyword_hits = hit.keyword_hits,
                    "Search hit"
                );
            }
        }
        Ok(hits)
    }

    /// Stored chunks, optionally restricted to one source, without touching
    /// the freshness state.
    pub async fn stored_chunks(&self, source: Option<&str>) -> Result<Vec<Chunk>> {
        let _gate = self.gate.read().await;
        let mut chunks = self.store.load_all_chunks().await?;
        if let Some(source) = source {
            chunks.retain(|c| c.source == source);
        }
        Ok(chunks)
    }
}

/// Score, preselect, filter and truncate.
fn rank_chunks(
    chunks: &[Chunk],
    query_vector: &[f32],
    query: &str,
    options: &SearchOptions,
) -> Vec<SearchHit> {
    let mut scored: Vec<(f32, &Chunk)> = chunks
        .iter()
        .map(|chunk| (cosine(query_vector, &chunk.embedding), chunk))
        // Non-finite components give NaN, which never ranks
        .filter(|(score, _)| !score.is_nan())
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));

    let pool = options.pool_size(scored.len());
    let keywords = extract_keywords(query);
    debug!("Query keywords: {:?}", keywords);

    let mut hits: Vec<SearchHit> = scored
        .into_iter()
        .take(pool)
        .filter_map(|(score, chunk)| {
            if score < options.min_score {
                return None;
            }
            let hits = keyword_hits(&chunk.text, &keywords);
            if options.min_keyword_hits > 0 && hits < options.min_keyword_hits {
                return None;
            }
            Some(SearchHit {
                score,
                keyword_hits: hits,
                source: chunk.source.clone(),
                chunk_index: chunk.chunk_index,
                text: chunk.text.clone(),
            })
        })
        .collect();

    hits.sort_by(|a, b| b.score.total_cmp(&a.score));
    hits.truncate(options.result_limit());
    hits
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
