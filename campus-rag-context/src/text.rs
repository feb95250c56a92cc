//! Paragraph-based chunking of plain-text and Markdown documents.
//!
//! Documents are turned into overlapping, size-bounded chunks that serve as the
//! atomic retrievable unit of the retrieval index. The process has two steps:
//!
//! 1. [`split_paragraphs`] splits the text on blank lines, trims every paragraph
//!    and drops empty paragraphs as well as pure filler (rules and bare headings
//!    made of `#`, `-`, `=`, `*`, `_`, spaces and tabs).
//! 2. [`merge_paragraphs`] greedily packs paragraphs into chunks of at most
//!    `max_chars` characters. When a chunk closes, the next one is seeded with the
//!    trailing `overlap` characters of the closed chunk, so a concept that straddles
//!    a paragraph boundary is retrievable from either neighbour.
//!
//! Lengths are measured in Unicode scalar values, not bytes, so CJK text is
//! budgeted the same way as ASCII text. The size bound is advisory: a single
//! paragraph longer than `max_chars` is emitted whole rather than split.
//!
//! # Example
//!
//! ```
//! use campus_rag_context::text::{ChunkerConfig, ParagraphChunker};
//!
//! let chunker = ParagraphChunker::new(ChunkerConfig::default().with_max_chars(50).with_overlap(10));
//! let text = "# Office hours\n\nThe office opens at nine.\n\n---\n\nLeave requests go to the counsellor.";
//! let chunks = chunker.chunk(text);
//!
//! assert_eq!(chunks.len(), 2);
//! assert_eq!(chunks[0], "# Office hours\n\nThe office opens at nine.");
//! // The second chunk starts with the last 10 characters of the first one.
//! assert!(chunks[1].starts_with("s at nine."));
//! assert!(chunks[1].ends_with("Leave requests go to the counsellor."));
//! ```
use regex::Regex;
use std::sync::OnceLock;

/// Default upper bound for a chunk, in characters.
pub const DEFAULT_MAX_CHARS: usize = 900;

/// Default number of trailing characters carried into the next chunk.
pub const DEFAULT_OVERLAP: usize = 120;

const PARAGRAPH_SEPARATOR: &str = "\n\n";
const SEPARATOR_CHARS: usize = 2;

fn paragraph_break() -> &'static Regex {
    static PARAGRAPH_BREAK: OnceLock<Regex> = OnceLock::new();
    PARAGRAPH_BREAK.get_or_init(|| Regex::new(r"\n\s*\n+").expect("paragraph pattern is valid"))
}

/// Sizing parameters for [`ParagraphChunker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkerConfig {
    /// Advisory maximum chunk length in characters
    pub max_chars: usize,
    /// Characters of the previous chunk repeated at the start of the next one
    pub overlap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_MAX_CHARS,
            overlap: DEFAULT_OVERLAP,
        }
    }
}

impl ChunkerConfig {
    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }

    pub fn with_overlap(mut self, overlap: usize) -> Self {
        self.overlap = overlap;
        self
    }
}

/// A chunk tagged with the document it came from and its position in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentChunk {
    /// Document identifier (the file name for on-disk corpora)
    pub source: String,
    /// Position within the source, 0-based and contiguous
    pub chunk_index: usize,
    /// Chunk content
    pub text: String,
}

/// Splits documents into overlapping paragraph-aligned chunks.
#[derive(Debug, Clone, Default)]
pub struct ParagraphChunker {
    config: ChunkerConfig,
}

impl ParagraphChunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Chunks `text` into an ordered sequence of chunk strings.
    ///
    /// The output is a pure function of the input text and the configuration.
    pub fn chunk(&self, text: &str) -> Vec<String> {
        merge_paragraphs(&split_paragraphs(text), &self.config)
    }

    /// Chunks a document and tags every chunk with `source` and its index.
    pub fn chunk_document(&self, source: &str, text: &str) -> Vec<DocumentChunk> {
        self.chunk(text)
            .into_iter()
            .enumerate()
            .map(|(chunk_index, text)| DocumentChunk {
                source: source.to_string(),
                chunk_index,
                text,
            })
            .collect()
    }
}

/// Splits text on blank-line boundaries, dropping empty and filler-only paragraphs.
///
/// Windows line endings are normalised first. Every returned paragraph is trimmed.
pub fn split_paragraphs(text: &str) -> Vec<String> {
    let normalized = text.replace("\r\n", "\n");
    paragraph_break()
        .split(&normalized)
        .map(str::trim)
        .filter(|p| !p.is_empty() && !is_filler(p))
        .map(str::to_string)
        .collect()
}

fn is_filler(paragraph: &str) -> bool {
    paragraph
        .chars()
        .all(|c| matches!(c, '#' | '-' | '=' | '*' | '_' | ' ' | '\t'))
}

/// Greedily packs paragraphs into chunks bounded by `config.max_chars`.
///
/// Each paragraph is budgeted with a two character separator. A chunk is closed
/// when the next paragraph would push it over the bound; the trailing
/// `config.overlap` characters of the closed chunk then seed the next buffer.
pub fn merge_paragraphs<S: AsRef<str>>(paragraphs: &[S], config: &ChunkerConfig) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut parts: Vec<String> = Vec::new();
    let mut current_len = 0;

    for paragraph in paragraphs {
        let paragraph = paragraph.as_ref();
        let paragraph_len = paragraph.chars().count();

        if !parts.is_empty() && current_len + paragraph_len + SEPARATOR_CHARS > config.max_chars {
            let chunk = parts.join(PARAGRAPH_SEPARATOR);
            parts.clear();
            current_len = 0;

            if config.overlap > 0 {
                let seed = tail_chars(&chunk, config.overlap);
                current_len = seed.chars().count();
                parts.push(seed.to_string());
            }
            chunks.push(chunk);
        }

        parts.push(paragraph.to_string());
        current_len += paragraph_len + SEPARATOR_CHARS;
    }

    if !parts.is_empty() {
        chunks.push(parts.join(PARAGRAPH_SEPARATOR));
    }

    chunks
}

/// Returns the last `n` characters of `s` (all of `s` when it is shorter).
pub fn tail_chars(s: &str, n: usize) -> &str {
    let total = s.chars().count();
    if total <= n {
        return s;
    }
    s.char_indices()
        .nth(total - n)
        .map(|(idx, _)| &s[idx..])
        .unwrap_or("")
}
