//! Overlapping text segmentation for embedding.
//!
//! Extracted document text is usually far longer than what an embedding model can
//! take in one pass, so it is cut into windows of roughly `size` characters that
//! overlap by `overlap` characters. Each window prefers to end on a natural
//! boundary (`.`, `!`, `?` or a newline) found within the last
//! [`BOUNDARY_LOOKBACK`] characters of the window, and falls back to a hard cut
//! when none is present. A boundary sitting exactly at the hard end is kept with
//! its window, which can make that window one character longer than `size`.
//!
//! Lengths and offsets are counted in Unicode scalar values (`char`s), never in
//! bytes, so multi-byte text is never split inside a code point.
//!
//! # Example
//!
//! ```
//! use docsearch_context::text::{ChunkingConfig, chunk};
//!
//! let text = "Hello world. ".repeat(100);
//! let chunks = chunk(&text, 1000, 100).unwrap();
//!
//! assert_eq!(chunks.len(), 2);
//! assert!(chunks[0].ends_with('.'));
//!
//! let config = ChunkingConfig::default();
//! assert_eq!((config.size, config.overlap), (1000, 100));
//! ```

use serde::Serialize;
use std::ops::Range;

/// Default maximum window length in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Default number of characters shared by consecutive windows.
pub const DEFAULT_CHUNK_OVERLAP: usize = 100;

/// How far back from a window's hard end the boundary search reaches.
///
/// Fixed regardless of the window size.
pub const BOUNDARY_LOOKBACK: usize = 200;

/// Characters that may end a window early.
pub const BOUNDARY_CHARS: &[char] = &['.', '!', '?', '\n'];

/// Invalid chunking parameters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChunkingError {
    /// The window would never advance: the size is zero or the overlap is not
    /// smaller than the size.
    #[error("invalid chunk window: size {size}, overlap {overlap} (overlap must be smaller than a non-zero size)")]
    InvalidWindow { size: usize, overlap: usize },
}

/// Window parameters for the chunker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChunkingConfig {
    /// Maximum size of each chunk in characters
    pub size: usize,
    /// Characters repeated at the start of the next chunk
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl ChunkingConfig {
    pub fn new(size: usize, overlap: usize) -> Self {
        Self { size, overlap }
    }

    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size;
        self
    }

    pub fn with_overlap(mut self, overlap: usize) -> Self {
        self.overlap = overlap;
        self
    }

    /// Reject windows that cannot make progress.
    pub fn validate(&self) -> Result<(), ChunkingError> {
        if self.size == 0 || self.overlap >= self.size {
            return Err(ChunkingError::InvalidWindow {
                size: self.size,
                overlap: self.overlap,
            });
        }
        Ok(())
    }
}

/// One chunk of a document, numbered within that document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextChunk {
    /// Trimmed chunk text
    pub text: String,
    /// 0-based position of this chunk within its document
    pub index: usize,
    /// Number of chunks the document produced
    pub total_in_document: usize,
}

/// Split `text` into overlapping, trimmed chunks.
///
/// Text no longer than `size` yields exactly one chunk holding the trimmed text,
/// even when that is empty; callers are expected to skip empty documents. Longer
/// text yields only non-empty chunks.
///
/// # Errors
/// [`ChunkingError::InvalidWindow`] when `size == 0` or `overlap >= size`.
pub fn chunk(text: &str, size: usize, overlap: usize) -> Result<Vec<String>, ChunkingError> {
    let config = ChunkingConfig::new(size, overlap);
    let spans = chunk_spans(text, &config)?;

    if spans.len() == 1 {
        return Ok(vec![text[spans[0].clone()].trim().to_string()]);
    }

    Ok(spans
        .into_iter()
        .map(|span| text[span].trim())
        .filter(|piece| !piece.is_empty())
        .map(str::to_string)
        .collect())
}

/// Chunk a whole document and number the resulting pieces.
pub fn chunk_document(text: &str, config: &ChunkingConfig) -> Result<Vec<TextChunk>, ChunkingError> {
    let pieces = chunk(text, config.size, config.overlap)?;
    let total = pieces.len();

    Ok(pieces
        .into_iter()
        .enumerate()
        .map(|(index, text)| TextChunk {
            text,
            index,
            total_in_document: total,
        })
        .collect())
}

/// Byte ranges of the untrimmed windows `chunk` would emit, in order.
///
/// Consecutive ranges overlap by `config.overlap` characters, so together they
/// cover the whole text. A short tail can produce a final range lying entirely
/// inside the one before it.
pub fn chunk_spans(text: &str, config: &ChunkingConfig) -> Result<Vec<Range<usize>>, ChunkingError> {
    config.validate()?;

    let chars: Vec<char> = text.chars().collect();
    let offsets: Vec<usize> = text
        .char_indices()
        .map(|(offset, _)| offset)
        .chain(std::iter::once(text.len()))
        .collect();
    let len = chars.len();

    if len <= config.size {
        return Ok(vec![0..text.len()]);
    }

    let mut spans = Vec::new();
    let mut start = 0;

    while start < len {
        let hard_end = start + config.size;
        if hard_end >= len {
            spans.push(offsets[start]..offsets[len]);
            start = hard_end - config.overlap;
            continue;
        }

        // A boundary too close to `start` would move the next window backwards.
        let end = match find_boundary(&chars, start, hard_end) {
            Some(end) if end > start + config.overlap => end,
            _ => hard_end,
        };

        spans.push(offsets[start]..offsets[end]);
        start = end - config.overlap;
    }

    Ok(spans)
}

/// Exclusive end position just past the nearest boundary character at or before
/// `end`, searching no further back than the lookback floor.
fn find_boundary(chars: &[char], start: usize, end: usize) -> Option<usize> {
    let floor = end.saturating_sub(BOUNDARY_LOOKBACK).max(start);
    ((floor + 1)..=end)
        .rev()
        .find(|&i| BOUNDARY_CHARS.contains(&chars[i]))
        .map(|i| i + 1)
}
