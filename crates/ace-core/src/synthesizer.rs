//! Hybrid context assembly.
//!
//! Runs vector search and graph lookup for a question and merges both into
//! the answer prompt. A failing source is logged and replaced by its
//! placeholder; the question is still answered from the other source.

use std::sync::Arc;

use ace_index::{GraphQuery, VectorIndex, DEFAULT_TOP_K};
use tracing::{debug, warn};

use crate::prompts::{answer_prompt, NO_GRAPH_MATCHES, NO_TEXT_MATCHES};

/// Retrieved context for one question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HybridContext {
    pub graph_text: String,
    pub vector_text: String,
}

impl HybridContext {
    pub fn render(&self, question: &str) -> String {
        answer_prompt(&self.graph_text, &self.vector_text, question)
    }
}

pub struct ContextSynthesizer {
    index: Arc<VectorIndex>,
    graph: GraphQuery,
    top_k: usize,
}

impl ContextSynthesizer {
    pub fn new(index: Arc<VectorIndex>, graph: GraphQuery) -> Self {
        Self {
            index,
            graph,
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn graph(&self) -> &GraphQuery {
        &self.graph
    }

    /// Gather both sources for `question`.
    pub async fn gather(&self, question: &str) -> HybridContext {
        let (hits, topics) = tokio::join!(
            self.index.search(question, self.top_k),
            self.graph.context_for(question)
        );

        let chunks: Vec<String> = match hits {
            Ok(hits) => hits.into_iter().map(|hit| hit.chunk.text).collect(),
            Err(e) => {
                warn!(error = %e, "Vector search failed, answering without syllabus text");
                Vec::new()
            }
        };
        let topics = topics.unwrap_or_else(|e| {
            warn!(error = %e, "Graph query failed, answering without graph context");
            Vec::new()
        });

        debug!(chunks = chunks.len(), topics = topics.len(), "Hybrid context gathered");

        HybridContext {
            graph_text: if topics.is_empty() {
                NO_GRAPH_MATCHES.to_string()
            } else {
                topics.join("\n")
            },
            vector_text: if chunks.is_empty() {
                NO_TEXT_MATCHES.to_string()
            } else {
                chunks.join("\n\n")
            },
        }
    }

    /// The complete answer prompt for `question`.
    pub async fn build(&self, question: &str) -> String {
        self.gather(question).await.render(question)
    }
}
