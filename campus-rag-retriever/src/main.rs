use anyhow::Context;
use campus_rag_embed::{EmbedConfig, OllamaProvider, config as embed_config};
use campus_rag_retriever::retrieval::rag_index::{
    DEFAULT_MIN_KEYWORD_HITS, DEFAULT_MIN_SCORE, DEFAULT_TOP_K, IndexConfig, RetrievalIndex,
    SearchOptions,
};
use campus_rag_retriever::storage::Chunk;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

/// Build, inspect and query the campus document retrieval index.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory containing the Markdown documents
    #[arg(long, env = "DOCS_DIR", default_value = "docs")]
    docs_dir: PathBuf,

    /// SQLite file holding the vector index
    #[arg(long, env = "RAG_DB_PATH", default_value = "data/rag.sqlite")]
    db_path: PathBuf,

    /// Embedding model served by Ollama
    #[arg(long, env = embed_config::ENV_MODEL, default_value = embed_config::DEFAULT_MODEL)]
    model: String,

    /// Ollama base URL
    #[arg(long, env = embed_config::ENV_BASE_URL, default_value = embed_config::DEFAULT_BASE_URL)]
    ollama_url: String,

    /// Per-request embedding timeout in seconds
    #[arg(long, env = embed_config::ENV_TIMEOUT, default_value_t = embed_config::DEFAULT_TIMEOUT_SECS as f64)]
    timeout_secs: f64,

    /// Embedding requests kept in flight while reindexing
    #[arg(long, env = "RAG_EMBED_CONCURRENCY", default_value_t = 1)]
    embed_concurrency: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show whether the cached index matches the documents and model
    Status {
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Rebuild the index from scratch
    Reindex {
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Search the index
    Search {
        /// Question or search text
        query: String,
        /// Maximum number of results
        #[arg(short = 'k', long, env = "RAG_TOP_K", default_value_t = DEFAULT_TOP_K)]
        top_k: usize,
        /// Minimum cosine similarity
        #[arg(long, env = "RAG_MIN_SCORE", default_value_t = DEFAULT_MIN_SCORE)]
        min_score: f32,
        /// Minimum number of query keywords a result must contain (0 disables)
        #[arg(long, env = "RAG_MIN_KEYWORD_HITS", default_value_t = DEFAULT_MIN_KEYWORD_HITS)]
        min_keyword_hits: usize,
        /// Candidate pool size before filtering
        #[arg(long)]
        preselect: Option<usize>,
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// List stored chunks without their vectors
    Chunks {
        /// Only chunks from this document
        #[arg(long)]
        source: Option<String>,
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum OutputFormat {
    Summary,
    Full,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "summary" => Ok(OutputFormat::Summary),
            "full" => Ok(OutputFormat::Full),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid format: {s}")),
        }
    }
}

#[derive(Serialize)]
struct ChunkOutput<'a> {
    source: &'a str,
    chunk_index: usize,
    chars: usize,
    dimension: usize,
    text: &'a str,
}

impl<'a> From<&'a Chunk> for ChunkOutput<'a> {
    fn from(chunk: &'a Chunk) -> Self {
        Self {
            source: &chunk.source,
            chunk_index: chunk.chunk_index,
            chars: chunk.text.chars().count(),
            dimension: chunk.embedding.len(),
            text: &chunk.text,
        }
    }
}

fn init_logging() {
    let level = std::env::var("LOG_LEVEL")
        .ok()
        .and_then(|v| v.trim().parse::<tracing::Level>().ok())
        .unwrap_or(tracing::Level::INFO);
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.replace('\n', " ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        let cut: String = flat.chars().take(max_chars).collect();
        format!("{cut}...")
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging();

    if !args.timeout_secs.is_finite() || args.timeout_secs <= 0.0 {
        anyhow::bail!("--timeout-secs must be positive");
    }
    let embed = EmbedConfig::new(&args.ollama_url, &args.model)
        .with_timeout(Duration::from_secs_f64(args.timeout_secs));
    let embedder = Arc::new(OllamaProvider::new(embed).context("invalid embedding configuration")?);

    let config = IndexConfig::new(&args.docs_dir, &args.db_path)
        .with_embed_concurrency(args.embed_concurrency);
    let index = RetrievalIndex::open(config, embedder)
        .await
        .with_context(|| format!("failed to open index at {}", args.db_path.display()))?;

    match args.command {
        Commands::Status { format } => {
            let status = index.status().await?;
            if format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                println!("Documents:    {} ({})", status.documents_count, status.docs_dir);
                println!("Store:        {}", status.store_location);
                println!(
                    "Model:        {} (cached: {})",
                    status.embedding_model,
                    status.cached_model.as_deref().unwrap_or("-")
                );
                println!("Fingerprint:  {}", status.current_fingerprint);
                println!(
                    "Cached:       {}",
                    status.cached_fingerprint.as_deref().unwrap_or("-")
                );
                println!("Chunks:       {}", status.in_memory_chunk_count);
                println!(
                    "Ready:        {}",
                    if status.ready { "yes" } else { "no (run reindex)" }
                );
            }
        }
        Commands::Reindex { format } => {
            let report = index.reindex().await?;
            if format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                for doc in &report.per_document {
                    println!("{:>5}  {}", doc.chunks, doc.source);
                }
                println!(
                    "Indexed {} chunks from {} documents with {} in {:.2}s",
                    report.chunks,
                    report.documents.len(),
                    report.embedding_model,
                    report.seconds
                );
            }
        }
        Commands::Search {
            query,
            top_k,
            min_score,
            min_keyword_hits,
            preselect,
            format,
        } => {
            let options = SearchOptions::default()
                .with_top_k(top_k)
                .with_min_score(min_score)
                .with_min_keyword_hits(min_keyword_hits)
                .with_preselect(preselect);
            let hits = index.search(&query, &options).await?;

            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&hits)?),
                OutputFormat::Full => {
                    for hit in &hits {
                        println!(
                            "=== {}#{} score={:.4} keyword_hits={}",
                            hit.source, hit.chunk_index, hit.score, hit.keyword_hits
                        );
                        println!("{}\n", hit.text);
                    }
                }
                OutputFormat::Summary => {
                    if hits.is_empty() {
                        println!("No results.");
                    }
                    for hit in &hits {
                        println!(
                            "{:.4}  {:>2}  {}#{}  {}",
                            hit.score,
                            hit.keyword_hits,
                            hit.source,
                            hit.chunk_index,
                            preview(&hit.text, 60)
                        );
                    }
                }
            }
        }
        Commands::Chunks { source, format } => {
            let chunks = index.stored_chunks(source.as_deref()).await?;
            let outputs: Vec<ChunkOutput> = chunks.iter().map(ChunkOutput::from).collect();

            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outputs)?),
                OutputFormat::Full => {
                    for chunk in &outputs {
                        println!(
                            "=== {}#{} ({} chars, dim {})",
                            chunk.source, chunk.chunk_index, chunk.chars, chunk.dimension
                        );
                        println!("{}\n", chunk.text);
                    }
                }
                OutputFormat::Summary => {
                    for chunk in &outputs {
                        println!(
                            "{}#{}  {} chars  {}",
                            chunk.source,
                            chunk.chunk_index,
                            chunk.chars,
                            preview(chunk.text, 60)
                        );
                    }
                    println!("{} chunks", outputs.len());
                }
            }
        }
    }

    Ok(())
}
