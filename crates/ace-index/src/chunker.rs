//! Fixed-size text chunking.
//!
//! Syllabus text is split into consecutive segments of at most
//! `chunk_size` characters. Chunk order is significant: the index of a
//! chunk is the tie-break key when two chunks score the same in search.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Default chunk size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Errors that can occur when configuring a chunker.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ChunkerError {
    #[error("chunk size must be greater than zero")]
    ZeroChunkSize,
}

/// A segment of document text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Position of this chunk in the source document (0-based)
    pub index: usize,

    /// The chunk content
    pub text: String,
}

impl Chunk {
    pub fn new(index: usize, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
        }
    }
}

/// Splits text into fixed-size, order-preserving chunks.
#[derive(Debug, Clone)]
pub struct TextChunker {
    chunk_size: usize,
}

impl TextChunker {
    /// Create a chunker producing chunks of at most `chunk_size` characters.
    pub fn new(chunk_size: usize) -> Result<Self, ChunkerError> {
        if chunk_size == 0 {
            return Err(ChunkerError::ZeroChunkSize);
        }
        Ok(Self { chunk_size })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Split `text` into chunks.
    ///
    /// Boundaries are counted in characters, so multi-byte UTF-8 sequences
    /// are never split. Empty input yields no chunks.
    pub fn chunk(&self, text: &str) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let mut current = String::new();
        let mut count = 0;

        for ch in text.chars() {
            current.push(ch);
            count += 1;
            if count == self.chunk_size {
                chunks.push(Chunk::new(chunks.len(), std::mem::take(&mut current)));
                count = 0;
            }
        }

        if !current.is_empty() {
            chunks.push(Chunk::new(chunks.len(), current));
        }

        debug!(
            chunks = chunks.len(),
            chunk_size = self.chunk_size,
            "Chunked document text"
        );
        chunks
    }
}

impl Default for TextChunker {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}
