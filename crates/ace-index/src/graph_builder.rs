//! Graph builder for merging extracted concepts into the course graph.
//!
//! This module bridges the concept extractor output with the graph store,
//! converting a document's concept list into one idempotent write.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, info};

use crate::graph::{Concept, GraphError, GraphStore, GraphWrite, WriteSummary};

/// Result of merging one document's concepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeStats {
    /// Number of concepts merged
    pub concepts: usize,
    /// Distinct topic names touched (concepts and prerequisites)
    pub topics: usize,
    /// What the store reported as newly created
    pub summary: WriteSummary,
}

/// Merges concept lists into a [`GraphStore`].
pub struct GraphBuilder {
    store: Arc<dyn GraphStore>,
}

impl GraphBuilder {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    /// Build the write for `document_name` covering `concepts`.
    ///
    /// Operation order: the syllabus node; then per concept its topic node
    /// and COVERS edge; then per prerequisite its topic node and the
    /// PREREQUISITE_TO edge into the concept.
    pub fn plan(document_name: &str, concepts: &[Concept]) -> GraphWrite {
        let mut write = GraphWrite::new();
        write.merge_syllabus(document_name);

        for concept in concepts {
            write
                .merge_topic(&concept.name)
                .merge_covers(document_name, &concept.name);

            for prerequisite in &concept.prerequisites {
                write
                    .merge_topic(prerequisite)
                    .merge_prerequisite(prerequisite, &concept.name);
            }
        }
        write
    }

    /// Merge `concepts` for `document_name` in a single transaction.
    pub async fn merge(&self, document_name: &str, concepts: &[Concept]) -> Result<MergeStats, GraphError> {
        let write = Self::plan(document_name, concepts);
        let topics: BTreeSet<&str> = concepts
            .iter()
            .flat_map(|c| std::iter::once(c.name.as_str()).chain(c.prerequisites.iter().map(String::as_str)))
            .collect();

        debug!(
            document = document_name,
            ops = write.len(),
            backend = self.store.backend_name(),
            "Merging concepts into graph"
        );
        let summary = self.store.apply(write).await?;

        info!(
            document = document_name,
            concepts = concepts.len(),
            nodes_created = summary.nodes_created,
            relationships_created = summary.relationships_created,
            "Merged concepts into graph"
        );

        Ok(MergeStats {
            concepts: concepts.len(),
            topics: topics.len(),
            summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GraphOp, MemoryGraphStore};

    fn concepts() -> Vec<Concept> {
        vec![
            Concept::new("Derivatives").with_prerequisites(["Limits", "Functions"]),
            Concept::new("Integrals").with_prerequisites(["Derivatives"]),
        ]
    }

    #[test]
    fn test_plan_order() {
        let write = GraphBuilder::plan("calc.pdf", &[Concept::new("Limits").with_prerequisites(["Functions"])]);

        assert_eq!(
            write.ops(),
            &[
                GraphOp::MergeSyllabus { name: "calc.pdf".to_string() },
                GraphOp::MergeTopic { name: "Limits".to_string() },
                GraphOp::MergeCovers {
                    syllabus: "calc.pdf".to_string(),
                    topic: "Limits".to_string()
                },
                GraphOp::MergeTopic { name: "Functions".to_string() },
                GraphOp::MergePrerequisite {
                    prerequisite: "Functions".to_string(),
                    topic: "Limits".to_string()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_merge_builds_expected_graph() {
        let store = Arc::new(MemoryGraphStore::new());
        let builder = GraphBuilder::new(store.clone());

        let stats = builder.merge("calc.pdf", &concepts()).await.unwrap();
        assert_eq!(stats.concepts, 2);
        assert_eq!(stats.topics, 4);

        let graph = store.snapshot().await;
        // 1 syllabus + Derivatives, Limits, Functions, Integrals
        assert_eq!(graph.node_count(), 5);
        // 2 COVERS + 3 PREREQUISITE_TO
        assert_eq!(graph.edge_count(), 5);
        assert!(graph
            .prerequisites
            .contains(&("Derivatives".to_string(), "Integrals".to_string())));
    }

    #[tokio::test]
    async fn test_merge_twice_is_idempotent() {
        let store = Arc::new(MemoryGraphStore::new());
        let builder = GraphBuilder::new(store.clone());

        builder.merge("calc.pdf", &concepts()).await.unwrap();
        let nodes = store.node_count().await;
        let edges = store.edge_count().await;

        let again = builder.merge("calc.pdf", &concepts()).await.unwrap();
        assert_eq!(again.summary, WriteSummary::default());
        assert_eq!(store.node_count().await, nodes);
        assert_eq!(store.edge_count().await, edges);
    }

    #[tokio::test]
    async fn test_topics_shared_across_documents() {
        let store = Arc::new(MemoryGraphStore::new());
        let builder = GraphBuilder::new(store.clone());

        builder.merge("calc-1.pdf", &concepts()).await.unwrap();
        builder
            .merge("calc-2.pdf", &[Concept::new("Integrals")])
            .await
            .unwrap();

        let graph = store.snapshot().await;
        assert_eq!(graph.syllabi.len(), 2);
        assert_eq!(graph.topics.len(), 4);
        assert_eq!(graph.covers.len(), 3);
    }

    #[tokio::test]
    async fn test_merge_without_concepts_creates_syllabus_only() {
        let store = Arc::new(MemoryGraphStore::new());
        let builder = GraphBuilder::new(store.clone());

        let stats = builder.merge("empty.pdf", &[]).await.unwrap();
        assert_eq!(stats.summary.nodes_created, 1);
        assert_eq!(store.edge_count().await, 0);
    }
}
