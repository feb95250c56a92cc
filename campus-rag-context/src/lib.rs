pub mod text;

// Re-export the chunking entry points for external use
pub use text::{
    ChunkerConfig, DEFAULT_MAX_CHARS, DEFAULT_OVERLAP, DocumentChunk, ParagraphChunker,
    merge_paragraphs, split_paragraphs,
};
