//! Integration tests for ace-index crate.
//!
//! These tests verify chunk → embed → search and concept → graph → query
//! end to end, using a keyword-count embedding instead of a remote model.

use std::sync::Arc;

use async_trait::async_trait;
use tempfile::tempdir;

use ace_index::{
    Chunk, Concept, EmbeddingError, EmbeddingProvider, GraphBuilder, GraphQuery, IndexState,
    MemoryGraphStore, SnapshotStore, TextChunker, VectorIndex,
};

const VOCABULARY: &[&str] = &["grading", "exam", "recursion", "graphs", "office", "hours", "late"];

/// Embeds text as counts of a fixed vocabulary.
struct KeywordEmbeddings;

#[async_trait]
impl EmbeddingProvider for KeywordEmbeddings {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts
            .iter()
            .map(|text| {
                let lower = text.to_lowercase();
                VOCABULARY
                    .iter()
                    .map(|word| lower.matches(word).count() as f32)
                    .collect()
            })
            .collect())
    }

    fn model_name(&self) -> &str {
        "keywords"
    }
}

/// Two-chunk document where only the first chunk talks about grading.
#[tokio::test]
async fn test_search_finds_the_similar_chunk() {
    let index = VectorIndex::new(Arc::new(KeywordEmbeddings));
    let chunker = TextChunker::new(40).unwrap();

    let first = "Grading: the exam is 60% of grading.    ";
    let second = "Recursion and graphs in weeks 3 to 5.";
    assert_eq!(first.chars().count(), 40);
    let chunks = chunker.chunk(&format!("{first}{second}"));
    assert_eq!(chunks.len(), 2);

    index.ingest(chunks.clone()).await.unwrap();

    let hits = index.search("How is grading done for the exam?", 1).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].chunk, chunks[0]);
}

/// Results never exceed min(top_k, chunk count) and are ranked.
#[tokio::test]
async fn test_search_bounds_and_order() {
    let index = VectorIndex::new(Arc::new(KeywordEmbeddings));
    let chunks: Vec<Chunk> = [
        "office hours",
        "late exam",
        "exam exam grading",
        "graphs",
        "exam grading",
    ]
    .iter()
    .enumerate()
    .map(|(i, t)| Chunk::new(i, *t))
    .collect();
    index.ingest(chunks).await.unwrap();

    for top_k in 0..8 {
        let hits = index.search("exam grading", top_k).await.unwrap();
        assert_eq!(hits.len(), top_k.min(5));
        for pair in hits.windows(2) {
            assert!(pair[0].score >= pair[1].score);
            if pair[0].score == pair[1].score {
                assert!(pair[0].chunk.index < pair[1].chunk.index);
            }
        }
    }
}

/// Restoring a snapshot reproduces the exact state.
#[tokio::test]
async fn test_snapshot_round_trip_through_index() {
    let dir = tempdir().unwrap();
    let path = dir.path().join(".ace").join("index.json");

    let index = VectorIndex::new(Arc::new(KeywordEmbeddings)).with_snapshot_store(SnapshotStore::new(&path));
    index
        .ingest(vec![Chunk::new(0, "exam grading"), Chunk::new(1, "late office hours")])
        .await
        .unwrap();
    let state: IndexState = index.state().await;

    let restored = VectorIndex::new(Arc::new(KeywordEmbeddings)).with_snapshot_store(SnapshotStore::new(&path));
    assert_eq!(restored.restore().await, 2);
    assert_eq!(restored.state().await, state);
}

/// Concepts merged twice give the same graph, and queries only return
/// topics the question mentions.
#[tokio::test]
async fn test_graph_merge_and_query() {
    let store = Arc::new(MemoryGraphStore::new());
    let builder = GraphBuilder::new(store.clone());
    let query = GraphQuery::new(store.clone());

    let concepts = vec![
        Concept::new("Recursion").with_prerequisites(["Functions"]),
        Concept::new("Dynamic Programming").with_prerequisites(["Recursion"]),
    ];
    builder.merge("cs201.pdf", &concepts).await.unwrap();
    let once = store.snapshot().await;
    builder.merge("cs201.pdf", &concepts).await.unwrap();
    assert_eq!(store.snapshot().await, once);

    let question = "Should I learn recursion before dynamic programming?";
    let topics = query.topics_for(question).await.unwrap();
    let names: Vec<&str> = topics.iter().map(|t| t.topic.as_str()).collect();
    assert_eq!(names, vec!["Dynamic Programming", "Recursion"]);
    for topic in &topics {
        assert!(question.to_lowercase().contains(&topic.topic.to_lowercase()));
    }

    let recursion = &topics[1];
    assert_eq!(recursion.prerequisites, vec!["Functions".to_string()]);
    assert_eq!(recursion.unlocks, vec!["Dynamic Programming".to_string()]);
}
