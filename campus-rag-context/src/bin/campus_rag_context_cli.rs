use campus_rag_context::text::{
    ChunkerConfig, DEFAULT_MAX_CHARS, DEFAULT_OVERLAP, DocumentChunk, ParagraphChunker,
};
use clap::Parser;
use serde::Serialize;
use std::fs;
use std::io::{self, Read};

/// A CLI tool to chunk a document into JSON output using campus-rag-context.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the input document. If not provided, reads from stdin.
    #[arg(short, long)]
    input: Option<String>,

    /// Source name recorded on every chunk. Defaults to the input file name.
    #[arg(short, long)]
    source: Option<String>,

    /// Advisory maximum length of each chunk, in characters.
    #[arg(short, long, default_value_t = DEFAULT_MAX_CHARS)]
    max_chars: usize,

    /// Characters of each chunk repeated at the start of the next one.
    #[arg(short, long, default_value_t = DEFAULT_OVERLAP)]
    overlap: usize,
}

#[derive(Serialize)]
struct SerializableChunk<'a> {
    source: &'a str,
    chunk_index: usize,
    chars: usize,
    text: &'a str,
}

fn main() -> io::Result<()> {
    let args = Args::parse();

    let (document, default_source) = if let Some(input_path) = &args.input {
        let name = std::path::Path::new(input_path)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| input_path.clone());
        (fs::read_to_string(input_path)?, name)
    } else {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        (buffer, "stdin".to_string())
    };
    let source = args.source.unwrap_or(default_source);

    let config = ChunkerConfig::default()
        .with_max_chars(args.max_chars)
        .with_overlap(args.overlap);
    let chunks: Vec<DocumentChunk> =
        ParagraphChunker::new(config).chunk_document(&source, &document);

    let serializable_chunks: Vec<SerializableChunk> = chunks
        .iter()
        .map(|c| SerializableChunk {
            source: &c.source,
            chunk_index: c.chunk_index,
            chars: c.text.chars().count(),
            text: &c.text,
        })
        .collect();

    let json_output = serde_json::to_string_pretty(&serializable_chunks)?;
    println!("{}", json_output);

    Ok(())
}
