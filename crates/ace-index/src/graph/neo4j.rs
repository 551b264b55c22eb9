//! Neo4j backend over the HTTP transactional API.
//!
//! A write is sent as one `tx/commit` request holding one parameterised
//! `MERGE` statement per operation. Neo4j runs the statements in a single
//! transaction and rolls the whole request back if any statement fails.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use super::{mentions, GraphError, GraphOp, GraphStore, GraphWrite, TopicNeighborhood, WriteSummary};

const MERGE_SYLLABUS: &str = "MERGE (s:Syllabus {name: $name})";

const MERGE_TOPIC: &str = "MERGE (t:Topic {name: $name})";

const MERGE_COVERS: &str = "\
MATCH (s:Syllabus {name: $syllabus}), (t:Topic {name: $topic})
MERGE (s)-[:COVERS]->(t)";

const MERGE_PREREQUISITE: &str = "\
MATCH (p:Topic {name: $prerequisite}), (t:Topic {name: $topic})
MERGE (p)-[:PREREQUISITE_TO]->(t)";

const NEIGHBORHOOD_QUERY: &str = "\
MATCH (n:Topic)
WHERE n.name <> '' AND toLower($text) CONTAINS toLower(n.name)
OPTIONAL MATCH (p:Topic)-[:PREREQUISITE_TO]->(n)
OPTIONAL MATCH (n)-[:PREREQUISITE_TO]->(f:Topic)
RETURN n.name AS topic,
       collect(DISTINCT p.name) AS prereqs,
       collect(DISTINCT f.name) AS future
ORDER BY topic
LIMIT $limit";

/// Connection settings for a Neo4j server.
#[derive(Debug, Clone)]
pub struct Neo4jConfig {
    /// HTTP endpoint, e.g. `http://localhost:7474`
    pub uri: String,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl Default for Neo4jConfig {
    fn default() -> Self {
        Self {
            uri: "http://localhost:7474".to_string(),
            user: "neo4j".to_string(),
            password: String::new(),
            database: "neo4j".to_string(),
        }
    }
}

#[derive(Serialize)]
struct Statement {
    statement: &'static str,
    parameters: Value,
    #[serde(rename = "includeStats")]
    include_stats: bool,
}

#[derive(Serialize)]
struct CommitRequest {
    statements: Vec<Statement>,
}

#[derive(Deserialize)]
struct CommitResponse {
    #[serde(default)]
    results: Vec<StatementResult>,
    #[serde(default)]
    errors: Vec<Neo4jError>,
}

#[derive(Deserialize)]
struct StatementResult {
    #[serde(default)]
    data: Vec<Row>,
    #[serde(default)]
    stats: Option<Stats>,
}

#[derive(Deserialize)]
struct Row {
    row: Vec<Value>,
}

#[derive(Deserialize, Default)]
struct Stats {
    #[serde(default)]
    nodes_created: usize,
    #[serde(default)]
    relationships_created: usize,
}

#[derive(Deserialize)]
struct Neo4jError {
    code: String,
    message: String,
}

/// Graph store backed by a Neo4j server.
pub struct Neo4jStore {
    config: Neo4jConfig,
    client: Client,
}

impl Neo4jStore {
    pub fn new(config: Neo4jConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    /// Use a preconfigured HTTP client (timeouts, TLS settings).
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    fn commit_url(&self) -> String {
        format!(
            "{}/db/{}/tx/commit",
            self.config.uri.trim_end_matches('/'),
            self.config.database
        )
    }

    /// Run statements in one transaction and return the per-statement results.
    async fn run(&self, statements: Vec<Statement>) -> Result<Vec<StatementResult>, RunError> {
        let response = self
            .client
            .post(self.commit_url())
            .basic_auth(&self.config.user, Some(&self.config.password))
            .header("Accept", "application/json;charset=UTF-8")
            .json(&CommitRequest { statements })
            .send()
            .await
            .map_err(|e| RunError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RunError::Rejected(format!("HTTP {}: {}", status.as_u16(), body)));
        }

        let parsed: CommitResponse = response
            .json()
            .await
            .map_err(|e| RunError::InvalidResponse(e.to_string()))?;

        if let Some(err) = parsed.errors.first() {
            return Err(RunError::Rejected(format!("{}: {}", err.code, err.message)));
        }
        Ok(parsed.results)
    }
}

enum RunError {
    Network(String),
    Rejected(String),
    InvalidResponse(String),
}

impl RunError {
    fn into_write_error(self) -> GraphError {
        match self {
            RunError::Network(msg) => GraphError::Network(msg),
            RunError::Rejected(msg) => GraphError::WriteFailure(msg),
            RunError::InvalidResponse(msg) => GraphError::InvalidResponse(msg),
        }
    }

    fn into_query_error(self) -> GraphError {
        match self {
            RunError::Network(msg) => GraphError::Network(msg),
            RunError::Rejected(msg) => GraphError::QueryFailure(msg),
            RunError::InvalidResponse(msg) => GraphError::InvalidResponse(msg),
        }
    }
}

fn statement_for(op: &GraphOp) -> Statement {
    let (statement, parameters) = match op {
        GraphOp::MergeSyllabus { name } => (MERGE_SYLLABUS, json!({ "name": name })),
        GraphOp::MergeTopic { name } => (MERGE_TOPIC, json!({ "name": name })),
        GraphOp::MergeCovers { syllabus, topic } => (
            MERGE_COVERS,
            json!({ "syllabus": syllabus, "topic": topic }),
        ),
        GraphOp::MergePrerequisite { prerequisite, topic } => (
            MERGE_PREREQUISITE,
            json!({ "prerequisite": prerequisite, "topic": topic }),
        ),
    };
    Statement {
        statement,
        parameters,
        include_stats: true,
    }
}

fn string_list(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl GraphStore for Neo4jStore {
    async fn apply(&self, write: GraphWrite) -> Result<WriteSummary, GraphError> {
        if write.is_empty() {
            return Ok(WriteSummary::default());
        }

        let statements = write.ops().iter().map(statement_for).collect();
        let results = self.run(statements).await.map_err(RunError::into_write_error)?;

        let summary = results
            .iter()
            .filter_map(|r| r.stats.as_ref())
            .fold(WriteSummary::default(), |mut acc, stats| {
                acc.nodes_created += stats.nodes_created;
                acc.relationships_created += stats.relationships_created;
                acc
            });

        info!(
            ops = write.len(),
            nodes_created = summary.nodes_created,
            relationships_created = summary.relationships_created,
            "Committed graph write to Neo4j"
        );
        Ok(summary)
    }

    async fn neighborhoods(&self, text: &str, limit: usize) -> Result<Vec<TopicNeighborhood>, GraphError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let statement = Statement {
            statement: NEIGHBORHOOD_QUERY,
            parameters: json!({ "text": text, "limit": limit }),
            include_stats: false,
        };
        let results = self
            .run(vec![statement])
            .await
            .map_err(RunError::into_query_error)?;

        let text_lower = text.to_lowercase();
        let mut found = Vec::new();
        for row in results.into_iter().flat_map(|r| r.data) {
            let topic = row
                .row
                .first()
                .and_then(Value::as_str)
                .ok_or_else(|| GraphError::InvalidResponse("row without topic name".to_string()))?
                .to_string();
            if !mentions(&text_lower, &topic) {
                continue;
            }
            found.push(TopicNeighborhood {
                topic,
                prerequisites: row.row.get(1).map(string_list).unwrap_or_default(),
                unlocks: row.row.get(2).map(string_list).unwrap_or_default(),
            });
        }
        found.truncate(limit);

        debug!(matches = found.len(), "Neo4j neighborhood query complete");
        Ok(found)
    }

    fn backend_name(&self) -> &str {
        "neo4j"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn store(server: &MockServer) -> Neo4jStore {
        Neo4jStore::new(Neo4jConfig {
            uri: server.base_url(),
            user: "neo4j".to_string(),
            password: "secret".to_string(),
            database: "neo4j".to_string(),
        })
    }

    #[test]
    fn test_commit_url() {
        let store = Neo4jStore::new(Neo4jConfig {
            uri: "http://db:7474/".to_string(),
            database: "courses".to_string(),
            ..Neo4jConfig::default()
        });
        assert_eq!(store.commit_url(), "http://db:7474/db/courses/tx/commit");
    }

    #[test]
    fn test_statements_only_merge() {
        let mut write = GraphWrite::new();
        write
            .merge_syllabus("s")
            .merge_topic("t")
            .merge_covers("s", "t")
            .merge_prerequisite("p", "t");

        for op in write.ops() {
            let statement = statement_for(op);
            assert!(statement.statement.contains("MERGE"));
            assert!(!statement.statement.contains("CREATE"));
        }
    }

    #[tokio::test]
    async fn test_apply_sends_one_transaction() {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/db/neo4j/tx/commit")
                .header_exists("Authorization")
                .body_includes("MERGE (s:Syllabus {name: $name})")
                .body_includes("PREREQUISITE_TO");
            then.status(200).json_body(json!({
                "results": [
                    { "columns": [], "data": [], "stats": { "nodes_created": 1, "relationships_created": 0 } },
                    { "columns": [], "data": [], "stats": { "nodes_created": 1, "relationships_created": 0 } },
                    { "columns": [], "data": [], "stats": { "nodes_created": 0, "relationships_created": 1 } },
                    { "columns": [], "data": [], "stats": { "nodes_created": 1, "relationships_created": 0 } },
                    { "columns": [], "data": [], "stats": { "nodes_created": 0, "relationships_created": 1 } }
                ],
                "errors": []
            }));
        });

        let mut write = GraphWrite::new();
        write
            .merge_syllabus("cs.pdf")
            .merge_topic("Graphs")
            .merge_covers("cs.pdf", "Graphs")
            .merge_topic("Sets")
            .merge_prerequisite("Sets", "Graphs");

        let summary = store(&server).apply(write).await.unwrap();
        assert_eq!(summary.nodes_created, 3);
        assert_eq!(summary.relationships_created, 2);
        mock.assert_calls(1);
    }

    #[tokio::test]
    async fn test_apply_reports_transaction_errors() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/db/neo4j/tx/commit");
            then.status(200).json_body(json!({
                "results": [],
                "errors": [{ "code": "Neo.ClientError.Statement.SyntaxError", "message": "bad" }]
            }));
        });

        let mut write = GraphWrite::new();
        write.merge_syllabus("cs.pdf");
        let err = store(&server).apply(write).await.unwrap_err();
        assert!(matches!(err, GraphError::WriteFailure(msg) if msg.contains("SyntaxError")));
    }

    #[tokio::test]
    async fn test_neighborhoods_parses_rows() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST)
                .path("/db/neo4j/tx/commit")
                .body_includes("toLower($text)");
            then.status(200).json_body(json!({
                "results": [{
                    "columns": ["topic", "prereqs", "future"],
                    "data": [
                        { "row": ["Graphs", ["Sets"], ["Trees"]] },
                        { "row": ["Heaps", [], []] }
                    ]
                }],
                "errors": []
            }));
        });

        let found = store(&server)
            .neighborhoods("When do we cover graphs?", 3)
            .await
            .unwrap();
        assert_eq!(
            found,
            vec![TopicNeighborhood {
                topic: "Graphs".to_string(),
                prerequisites: vec!["Sets".to_string()],
                unlocks: vec!["Trees".to_string()],
            }]
        );
    }

    #[tokio::test]
    async fn test_unreachable_server_is_network_error() {
        let store = Neo4jStore::new(Neo4jConfig {
            uri: "http://127.0.0.1:1".to_string(),
            ..Neo4jConfig::default()
        });
        let err = store.neighborhoods("anything", 3).await.unwrap_err();
        assert!(matches!(err, GraphError::Network(_)));
    }
}
