pub mod text;

// Re-export the chunking entry points for external use
pub use text::{ChunkingConfig, ChunkingError, TextChunk, chunk, chunk_document, chunk_spans};
