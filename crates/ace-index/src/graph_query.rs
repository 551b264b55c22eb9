//! Topic lookup for free-text questions.
//!
//! Finds the topics a question mentions and describes each one together
//! with its immediate prerequisites and the topics it unlocks.

use std::sync::Arc;

use tracing::debug;

use crate::graph::{mentions, GraphError, GraphStore, TopicNeighborhood};

/// Default number of topics returned per question.
pub const DEFAULT_CONTEXT_LIMIT: usize = 3;

impl TopicNeighborhood {
    /// Human-readable one-line description.
    pub fn describe(&self) -> String {
        let mut info = format!("Topic '{}' found in Knowledge Graph.", self.topic);
        if !self.prerequisites.is_empty() {
            info.push_str(&format!(" It requires: {}.", self.prerequisites.join(", ")));
        }
        if !self.unlocks.is_empty() {
            info.push_str(&format!(" It unlocks: {}.", self.unlocks.join(", ")));
        }
        info
    }
}

/// Graph-side retrieval for the hybrid context.
pub struct GraphQuery {
    store: Arc<dyn GraphStore>,
    limit: usize,
}

impl GraphQuery {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self {
            store,
            limit: DEFAULT_CONTEXT_LIMIT,
        }
    }

    /// Set the maximum number of topics returned.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Topics mentioned in `text` with their one-hop neighbours.
    ///
    /// No match is an empty result, not an error.
    pub async fn topics_for(&self, text: &str) -> Result<Vec<TopicNeighborhood>, GraphError> {
        let text_lower = text.to_lowercase();
        let mut found = self.store.neighborhoods(text, self.limit).await?;
        found.retain(|n| mentions(&text_lower, &n.topic));
        found.truncate(self.limit);

        debug!(matches = found.len(), limit = self.limit, "Graph query complete");
        Ok(found)
    }

    /// One description line per mentioned topic.
    pub async fn context_for(&self, text: &str) -> Result<Vec<String>, GraphError> {
        Ok(self
            .topics_for(text)
            .await?
            .iter()
            .map(TopicNeighborhood::describe)
            .collect())
    }
}
