//! Concept dependency graph for course syllabi.
//!
//! The schema is fixed: two node labels and two relationship types.
//!
//! - **Syllabus** nodes: one per ingested document, keyed by name
//! - **Topic** nodes: one per distinct concept name, shared across documents
//! - **COVERS**: syllabus -> topic
//! - **PREREQUISITE_TO**: prerequisite topic -> dependent topic
//!
//! Node identity is the `name` property. Every write is a merge keyed on
//! name, so replaying a write never creates duplicates.
//!
//! # Example
//!
//! ```no_run
//! use ace_index::graph::{GraphStore, GraphWrite, MemoryGraphStore};
//!
//! # async fn demo() -> Result<(), ace_index::graph::GraphError> {
//! let store = MemoryGraphStore::new();
//!
//! let mut write = GraphWrite::new();
//! write.merge_syllabus("cs101.pdf");
//! write.merge_topic("Recursion");
//! write.merge_covers("cs101.pdf", "Recursion");
//! store.apply(write).await?;
//!
//! let found = store.neighborhoods("how does recursion work?", 3).await?;
//! assert_eq!(found[0].topic, "Recursion");
//! # Ok(())
//! # }
//! ```

pub mod memory;
pub mod neo4j;

pub use memory::{CourseGraph, MemoryGraphStore};
pub use neo4j::{Neo4jConfig, Neo4jStore};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Label of document nodes.
pub const SYLLABUS_LABEL: &str = "Syllabus";

/// Label of concept nodes.
pub const TOPIC_LABEL: &str = "Topic";

/// Relationship from a syllabus to a topic it covers.
pub const COVERS: &str = "COVERS";

/// Relationship from a prerequisite topic to the topic that depends on it.
pub const PREREQUISITE_TO: &str = "PREREQUISITE_TO";

/// Errors raised by graph stores.
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Graph write failed: {0}")]
    WriteFailure(String),

    #[error("Graph query failed: {0}")]
    QueryFailure(String),

    #[error("Graph database unreachable: {0}")]
    Network(String),

    #[error("Invalid graph database response: {0}")]
    InvalidResponse(String),
}

/// A course concept and the names of the concepts it depends on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Concept {
    pub name: String,
    #[serde(default)]
    pub prerequisites: Vec<String>,
}

impl Concept {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prerequisites: Vec::new(),
        }
    }

    pub fn with_prerequisites<I, S>(mut self, prerequisites: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prerequisites = prerequisites.into_iter().map(Into::into).collect();
        self
    }
}

/// A single idempotent merge operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum GraphOp {
    /// Ensure `Syllabus{name}` exists
    MergeSyllabus { name: String },
    /// Ensure `Topic{name}` exists
    MergeTopic { name: String },
    /// Ensure `(Syllabus{syllabus})-[:COVERS]->(Topic{topic})` exists
    MergeCovers { syllabus: String, topic: String },
    /// Ensure `(Topic{prerequisite})-[:PREREQUISITE_TO]->(Topic{topic})` exists
    MergePrerequisite { prerequisite: String, topic: String },
}

/// An ordered batch of merge operations committed as one transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphWrite {
    ops: Vec<GraphOp>,
}

impl GraphWrite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge_syllabus(&mut self, name: impl Into<String>) -> &mut Self {
        self.ops.push(GraphOp::MergeSyllabus { name: name.into() });
        self
    }

    pub fn merge_topic(&mut self, name: impl Into<String>) -> &mut Self {
        self.ops.push(GraphOp::MergeTopic { name: name.into() });
        self
    }

    pub fn merge_covers(&mut self, syllabus: impl Into<String>, topic: impl Into<String>) -> &mut Self {
        self.ops.push(GraphOp::MergeCovers {
            syllabus: syllabus.into(),
            topic: topic.into(),
        });
        self
    }

    pub fn merge_prerequisite(
        &mut self,
        prerequisite: impl Into<String>,
        topic: impl Into<String>,
    ) -> &mut Self {
        self.ops.push(GraphOp::MergePrerequisite {
            prerequisite: prerequisite.into(),
            topic: topic.into(),
        });
        self
    }

    pub fn ops(&self) -> &[GraphOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// What a committed write changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub nodes_created: usize,
    pub relationships_created: usize,
}

/// A topic together with its one-hop neighbours.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicNeighborhood {
    pub topic: String,
    /// Topics with a PREREQUISITE_TO edge into this topic
    pub prerequisites: Vec<String>,
    /// Topics this topic has a PREREQUISITE_TO edge into
    pub unlocks: Vec<String>,
}

/// Backend holding the course graph.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Commit all operations atomically. On error nothing is applied.
    async fn apply(&self, write: GraphWrite) -> Result<WriteSummary, GraphError>;

    /// Up to `limit` topics whose name occurs case-insensitively in `text`,
    /// with their immediate prerequisites and successors.
    async fn neighborhoods(&self, text: &str, limit: usize) -> Result<Vec<TopicNeighborhood>, GraphError>;

    /// Short backend identifier for logs.
    fn backend_name(&self) -> &str;
}

/// Case-insensitive "topic name occurs in text" test shared by backends.
pub fn mentions(text_lower: &str, topic: &str) -> bool {
    !topic.is_empty() && text_lower.contains(&topic.to_lowercase())
}
