//! Syllabus indexing and retrieval for Ace.
//!
//! This crate provides:
//! - Fixed-size text chunking
//! - Embedding generation via the Gemini embedding API
//! - An in-memory vector index with cosine search and snapshot persistence
//! - A concept dependency graph (in-memory or Neo4j)
//! - Graph building from extracted concepts and topic lookup for questions

pub mod chunker;
pub mod embeddings;
pub mod graph;
pub mod graph_builder;
pub mod graph_query;
pub mod snapshot;
pub mod vector_index;

// Re-exports
pub use chunker::{Chunk, ChunkerError, TextChunker, DEFAULT_CHUNK_SIZE};
pub use embeddings::{EmbeddingError, EmbeddingProvider, GeminiEmbeddings};
pub use graph::{
    Concept, GraphError, GraphStore, GraphWrite, MemoryGraphStore, Neo4jConfig, Neo4jStore,
    TopicNeighborhood, WriteSummary,
};
pub use graph_builder::{GraphBuilder, MergeStats};
pub use graph_query::{GraphQuery, DEFAULT_CONTEXT_LIMIT};
pub use snapshot::{SnapshotError, SnapshotStore, DEFAULT_SNAPSHOT_PATH};
pub use vector_index::{cosine_similarity, IndexState, IngestStats, SearchHit, VectorIndex, VectorIndexError};

/// Default number of chunks returned by vector search.
pub const DEFAULT_TOP_K: usize = 3;
