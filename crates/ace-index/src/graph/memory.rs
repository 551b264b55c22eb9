//! In-process graph store with optional JSON persistence.
//!
//! Writes are applied to a copy of the graph which replaces the live graph
//! only after every operation succeeded and the copy was persisted.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{mentions, GraphError, GraphOp, GraphStore, GraphWrite, TopicNeighborhood, WriteSummary};

/// Default persistence file for the in-memory backend.
pub const DEFAULT_GRAPH_PATH: &str = ".ace/graph.json";

/// Name-keyed course graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseGraph {
    pub syllabi: BTreeSet<String>,
    pub topics: BTreeSet<String>,
    /// (syllabus, topic)
    pub covers: BTreeSet<(String, String)>,
    /// (prerequisite, topic)
    pub prerequisites: BTreeSet<(String, String)>,
}

impl CourseGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.syllabi.len() + self.topics.len()
    }

    pub fn edge_count(&self) -> usize {
        self.covers.len() + self.prerequisites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node_count() == 0
    }

    fn apply_op(&mut self, op: &GraphOp, summary: &mut WriteSummary) -> Result<(), GraphError> {
        match op {
            GraphOp::MergeSyllabus { name } => {
                require_name(name)?;
                if self.syllabi.insert(name.clone()) {
                    summary.nodes_created += 1;
                }
            }
            GraphOp::MergeTopic { name } => {
                require_name(name)?;
                if self.topics.insert(name.clone()) {
                    summary.nodes_created += 1;
                }
            }
            GraphOp::MergeCovers { syllabus, topic } => {
                if !self.syllabi.contains(syllabus) {
                    return Err(GraphError::WriteFailure(format!("no Syllabus named {syllabus:?}")));
                }
                if !self.topics.contains(topic) {
                    return Err(GraphError::WriteFailure(format!("no Topic named {topic:?}")));
                }
                if self.covers.insert((syllabus.clone(), topic.clone())) {
                    summary.relationships_created += 1;
                }
            }
            GraphOp::MergePrerequisite { prerequisite, topic } => {
                for name in [prerequisite, topic] {
                    if !self.topics.contains(name) {
                        return Err(GraphError::WriteFailure(format!("no Topic named {name:?}")));
                    }
                }
                if self.prerequisites.insert((prerequisite.clone(), topic.clone())) {
                    summary.relationships_created += 1;
                }
            }
        }
        Ok(())
    }

    /// Topics mentioned in `text`, in ascending name order.
    pub fn neighborhoods(&self, text: &str, limit: usize) -> Vec<TopicNeighborhood> {
        let text_lower = text.to_lowercase();
        self.topics
            .iter()
            .filter(|topic| mentions(&text_lower, topic))
            .take(limit)
            .map(|topic| TopicNeighborhood {
                topic: topic.clone(),
                prerequisites: self
                    .prerequisites
                    .iter()
                    .filter(|(_, t)| t == topic)
                    .map(|(p, _)| p.clone())
                    .collect(),
                unlocks: self
                    .prerequisites
                    .iter()
                    .filter(|(p, _)| p == topic)
                    .map(|(_, t)| t.clone())
                    .collect(),
            })
            .collect()
    }
}

fn require_name(name: &str) -> Result<(), GraphError> {
    if name.trim().is_empty() {
        return Err(GraphError::WriteFailure("node name must not be empty".to_string()));
    }
    Ok(())
}

/// Graph store kept in process memory.
pub struct MemoryGraphStore {
    graph: RwLock<CourseGraph>,
    path: Option<PathBuf>,
}

impl MemoryGraphStore {
    /// Create an empty, non-persistent store.
    pub fn new() -> Self {
        Self {
            graph: RwLock::new(CourseGraph::new()),
            path: None,
        }
    }

    /// Open a store persisted at `path`.
    ///
    /// A missing file starts an empty graph. An unreadable file is logged
    /// and also starts empty; the next commit overwrites it.
    pub fn open<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let graph = match fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<CourseGraph>(&bytes) {
                Ok(graph) => {
                    info!(
                        topics = graph.topics.len(),
                        syllabi = graph.syllabi.len(),
                        "Loaded course graph from {:?}",
                        path
                    );
                    graph
                }
                Err(e) => {
                    warn!(error = %e, "Could not parse course graph at {:?}, starting empty", path);
                    CourseGraph::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No course graph at {:?}, starting empty", path);
                CourseGraph::new()
            }
            Err(e) => {
                warn!(error = %e, "Could not read course graph at {:?}, starting empty", path);
                CourseGraph::new()
            }
        };

        Self {
            graph: RwLock::new(graph),
            path: Some(path),
        }
    }

    /// Copy of the current graph.
    pub async fn snapshot(&self) -> CourseGraph {
        self.graph.read().await.clone()
    }

    pub async fn node_count(&self) -> usize {
        self.graph.read().await.node_count()
    }

    pub async fn edge_count(&self) -> usize {
        self.graph.read().await.edge_count()
    }

    fn persist(&self, graph: &CourseGraph) -> Result<(), GraphError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let json = serde_json::to_vec_pretty(graph)
            .map_err(|e| GraphError::WriteFailure(format!("failed to serialize graph: {e}")))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| GraphError::WriteFailure(format!("failed to create {parent:?}: {e}")))?;
        }
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, json)
            .map_err(|e| GraphError::WriteFailure(format!("failed to write {tmp_path:?}: {e}")))?;
        fs::rename(&tmp_path, path)
            .map_err(|e| GraphError::WriteFailure(format!("failed to replace {path:?}: {e}")))?;
        Ok(())
    }
}

impl Default for MemoryGraphStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn apply(&self, write: GraphWrite) -> Result<WriteSummary, GraphError> {
        let mut live = self.graph.write().await;
        let mut next = live.clone();
        let mut summary = WriteSummary::default();

        for op in write.ops() {
            next.apply_op(op, &mut summary)?;
        }

        if summary != WriteSummary::default() {
            self.persist(&next)?;
        }
        *live = next;

        debug!(
            ops = write.len(),
            nodes_created = summary.nodes_created,
            relationships_created = summary.relationships_created,
            "Committed graph write"
        );
        Ok(summary)
    }

    async fn neighborhoods(&self, text: &str, limit: usize) -> Result<Vec<TopicNeighborhood>, GraphError> {
        Ok(self.graph.read().await.neighborhoods(text, limit))
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}
