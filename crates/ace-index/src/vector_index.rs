//! In-memory vector index over the current syllabus chunks.
//!
//! The index holds exactly one document's chunks at a time. Ingestion
//! replaces the whole state; there is no append and no deletion. The state
//! sits behind a read/write lock: searches share read guards, the swap on
//! ingestion takes the write guard only for the swap itself. Whole
//! ingestions, including the snapshot write that follows the swap, are
//! serialized so the persisted snapshot always matches the last swap.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::chunker::Chunk;
use crate::embeddings::{EmbeddingError, EmbeddingProvider};
use crate::snapshot::{self, SnapshotError, SnapshotStore};

/// Errors raised by the vector index.
#[derive(Error, Debug)]
pub enum VectorIndexError {
    #[error("Embedding failed: {0}")]
    EmbeddingFailure(#[from] EmbeddingError),

    #[error("Query vector has {query} dimensions, index has {index}")]
    DimensionMismatch { query: usize, index: usize },
}

/// Chunks and their embedding vectors, index-aligned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexState {
    pub chunks: Vec<Chunk>,
    pub vectors: Vec<Vec<f32>>,
}

impl IndexState {
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Vector dimensionality, or `None` for an empty state.
    pub fn dimensions(&self) -> Option<usize> {
        self.vectors.first().map(Vec::len)
    }
}

/// A chunk returned from search together with its cosine similarity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub chunk: Chunk,
    pub score: f32,
}

/// Outcome of a successful ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestStats {
    pub chunks: usize,
    pub dimensions: usize,
    pub persisted: bool,
}

/// Cosine similarity of two equal-length vectors.
///
/// Returns 0.0 when either vector has zero magnitude, and when a
/// non-finite component makes the similarity undefined.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let similarity = dot / (norm_a.sqrt() * norm_b.sqrt());
    if similarity.is_finite() {
        similarity
    } else {
        0.0
    }
}

/// Process-wide vector index with full-replace ingestion.
pub struct VectorIndex {
    embeddings: Arc<dyn EmbeddingProvider>,
    state: RwLock<IndexState>,
    ingest_lock: Mutex<()>,
    snapshots: Option<SnapshotStore>,
}

impl VectorIndex {
    /// Create an empty index without persistence.
    pub fn new(embeddings: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            embeddings,
            state: RwLock::new(IndexState::default()),
            ingest_lock: Mutex::new(()),
            snapshots: None,
        }
    }

    /// Persist the state to `store` after every ingestion.
    pub fn with_snapshot_store(mut self, store: SnapshotStore) -> Self {
        self.snapshots = Some(store);
        self
    }

    /// Load the snapshot, if any, into the index.
    ///
    /// A missing or unreadable snapshot is logged and leaves the index
    /// empty. Returns the number of chunks restored.
    pub async fn restore(&self) -> usize {
        let Some(store) = &self.snapshots else {
            return 0;
        };

        match store.load() {
            Ok(Some(restored)) => {
                let count = restored.len();
                *self.state.write().await = restored;
                info!(chunks = count, path = ?store.path(), "Restored vector index snapshot");
                count
            }
            Ok(None) => {
                debug!(path = ?store.path(), "No vector index snapshot found, starting empty");
                0
            }
            Err(e) => {
                warn!(path = ?store.path(), error = %e, "Could not restore vector index, starting empty");
                *self.state.write().await = IndexState::default();
                0
            }
        }
    }

    /// Replace the index contents with `chunks`.
    ///
    /// All chunks are embedded in a single batched call before the state is
    /// touched; if embedding fails the previous state stays in place.
    pub async fn ingest(&self, chunks: Vec<Chunk>) -> Result<IngestStats, VectorIndexError> {
        let _ingesting = self.ingest_lock.lock().await;

        info!(chunks = chunks.len(), model = self.embeddings.model_name(), "Embedding chunks");
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = if texts.is_empty() {
            Vec::new()
        } else {
            self.embeddings.embed_batch(&texts).await?
        };

        check_shape(chunks.len(), &vectors).map_err(EmbeddingError::InvalidResponse)?;
        let next = IndexState { chunks, vectors };
        let count = next.len();
        let dimensions = next.dimensions().unwrap_or(0);

        // Encode before the swap so the write guard covers only the assignment.
        let encoded = self.snapshots.as_ref().map(|store| (store.clone(), snapshot::encode(&next)));
        *self.state.write().await = next;

        let persisted = match encoded {
            None => false,
            Some((store, Ok(bytes))) => match write_snapshot(store, bytes).await {
                Ok(()) => true,
                Err(e) => {
                    error!(error = %e, "Failed to persist vector index snapshot");
                    false
                }
            },
            Some((_, Err(e))) => {
                error!(error = %e, "Failed to encode vector index snapshot");
                false
            }
        };

        Ok(IngestStats {
            chunks: count,
            dimensions,
            persisted,
        })
    }

    /// Return up to `top_k` chunks most similar to `query`.
    ///
    /// Results are ordered by descending similarity, ties by ascending
    /// chunk index. An empty index or `top_k == 0` yields no results and
    /// does not call the embedding provider.
    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>, VectorIndexError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        if self.state.read().await.is_empty() {
            debug!("Vector index is empty, nothing to search");
            return Ok(Vec::new());
        }

        let query_vector = self.embeddings.embed(query).await?;

        let state = self.state.read().await;
        if let Some(index_dims) = state.dimensions() {
            if index_dims != query_vector.len() {
                return Err(VectorIndexError::DimensionMismatch {
                    query: query_vector.len(),
                    index: index_dims,
                });
            }
        }

        let hits = rank(&state, &query_vector, top_k);
        debug!(query_len = query.len(), hits = hits.len(), "Vector search complete");
        Ok(hits)
    }

    /// Write the current state to the snapshot store.
    ///
    /// Returns `Ok(false)` when the index has no snapshot store. Waits for
    /// any running ingestion so the snapshot never precedes its write.
    pub async fn snapshot(&self) -> Result<bool, SnapshotError> {
        let Some(store) = self.snapshots.clone() else {
            return Ok(false);
        };
        let _ingesting = self.ingest_lock.lock().await;
        let bytes = snapshot::encode(&*self.state.read().await)?;
        write_snapshot(store, bytes).await?;
        Ok(true)
    }

    /// Copy of the current state.
    pub async fn state(&self) -> IndexState {
        self.state.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.is_empty()
    }
}

/// Write pre-encoded snapshot bytes off the async worker threads.
async fn write_snapshot(store: SnapshotStore, bytes: Vec<u8>) -> Result<(), SnapshotError> {
    let path = store.path().to_path_buf();
    tokio::task::spawn_blocking(move || store.write(&bytes))
        .await
        .map_err(|e| SnapshotError::Io {
            path,
            source: std::io::Error::new(std::io::ErrorKind::Other, e),
        })?
}

/// One non-empty vector per chunk, all of the same length.
pub(crate) fn check_shape(chunk_count: usize, vectors: &[Vec<f32>]) -> Result<(), String> {
    if chunk_count != vectors.len() {
        return Err(format!("Expected {} vectors, got {}", chunk_count, vectors.len()));
    }

    if let Some(first) = vectors.first() {
        if first.is_empty() {
            return Err("Empty embedding vector".to_string());
        }
        if let Some(bad) = vectors.iter().position(|v| v.len() != first.len()) {
            return Err(format!(
                "Vector {} has {} dimensions, expected {}",
                bad,
                vectors[bad].len(),
                first.len()
            ));
        }
    }
    Ok(())
}

fn rank(state: &IndexState, query_vector: &[f32], top_k: usize) -> Vec<SearchHit> {
    let mut scored: Vec<(usize, f32)> = state
        .vectors
        .iter()
        .enumerate()
        .map(|(pos, vector)| (pos, cosine_similarity(query_vector, vector)))
        .collect();

    scored.sort_by(|a, b| {
        b.1.total_cmp(&a.1)
            .then_with(|| state.chunks[a.0].index.cmp(&state.chunks[b.0].index))
    });

    scored
        .into_iter()
        .take(top_k)
        .map(|(pos, score)| SearchHit {
            chunk: state.chunks[pos].clone(),
            score,
        })
        .collect()
}
