//! Tutor service: syllabus ingestion and question answering.
//!
//! Owns the vector index and graph store for the lifetime of the process.
//! Collaborators are injected as trait objects so tests can substitute any
//! of them; [`TutorService::from_config`] wires the Gemini and graph
//! backends for production use.

use std::sync::Arc;

use ace_config::{Config, GraphBackend};
use ace_index::{
    Concept, EmbeddingProvider, GeminiEmbeddings, GraphBuilder, GraphError, GraphQuery, GraphStore,
    MemoryGraphStore, Neo4jConfig, Neo4jStore, SnapshotStore, TextChunker, VectorIndex,
};
use ace_providers::{CompletionRequest, GeminiProvider, LLMProvider, ResilientInvoker, RetryPolicy};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::document::{PlainTextExtractor, TextExtractor};
use crate::extractor::ConceptExtractor;
use crate::prompts::{FALLBACK_ANSWER, TUTOR_INSTRUCTION};
use crate::synthesizer::ContextSynthesizer;

/// Outcome of `process_syllabus`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyllabusResponse {
    pub success: bool,
    pub message: String,
    pub nodes_created: usize,
    /// JSON array of the merged concepts
    pub graph_json: String,
}

impl SyllabusResponse {
    fn failed(message: String) -> Self {
        Self {
            success: false,
            message,
            nodes_created: 0,
            graph_json: "[]".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
}

/// Open the graph backend selected in `config`.
pub fn open_graph_store(config: &Config, client: reqwest::Client) -> Result<Arc<dyn GraphStore>> {
    let graph: Arc<dyn GraphStore> = match config.graph.backend {
        GraphBackend::Memory => Arc::new(MemoryGraphStore::open(&config.graph.path)),
        GraphBackend::Neo4j => {
            let uri = config
                .graph
                .neo4j_uri
                .clone()
                .context("graph.neo4j_uri is required for the neo4j backend")?;
            Arc::new(
                Neo4jStore::new(Neo4jConfig {
                    uri,
                    user: config.graph.neo4j_user.clone(),
                    password: config.graph.neo4j_password.clone(),
                    database: config.graph.neo4j_database.clone(),
                })
                .with_client(client),
            )
        }
    };
    info!(backend = graph.backend_name(), "Graph store ready");
    Ok(graph)
}

/// External capabilities the service is built from.
pub struct Backends {
    pub embeddings: Arc<dyn EmbeddingProvider>,
    pub extraction_model: Arc<dyn LLMProvider>,
    pub answer_model: Arc<dyn LLMProvider>,
    pub graph: Arc<dyn GraphStore>,
    pub text_extractor: Arc<dyn TextExtractor>,
}

pub struct TutorService {
    text_extractor: Arc<dyn TextExtractor>,
    chunker: TextChunker,
    index: Arc<VectorIndex>,
    concepts: ConceptExtractor,
    graph_builder: GraphBuilder,
    synthesizer: ContextSynthesizer,
    answerer: ResilientInvoker,
    permits: Semaphore,
}

impl TutorService {
    /// Assemble the service from `backends` and the tuning in `config`.
    ///
    /// The index starts empty; call [`TutorService::restore`] to load the
    /// last snapshot.
    pub fn new(backends: Backends, config: &Config) -> Result<Self> {
        let policy = RetryPolicy::new(
            config.retry.max_attempts,
            config.retry.initial_delay(),
            config.retry.backoff_factor,
        )
        .context("Invalid retry settings")?;
        let chunker = TextChunker::new(config.index.chunk_size).context("Invalid chunk size")?;

        let index = Arc::new(
            VectorIndex::new(backends.embeddings)
                .with_snapshot_store(SnapshotStore::new(&config.index.snapshot_path)),
        );
        let graph_query = GraphQuery::new(backends.graph.clone()).with_limit(config.graph.context_limit);

        Ok(Self {
            text_extractor: backends.text_extractor,
            chunker,
            index: index.clone(),
            concepts: ConceptExtractor::new(Arc::new(ResilientInvoker::new(
                backends.extraction_model,
                policy.clone(),
            )))
            .with_max_input_chars(config.extraction.max_input_chars)
            .with_temperature(config.extraction.temperature)
            .with_max_output_tokens(config.extraction.max_output_tokens),
            graph_builder: GraphBuilder::new(backends.graph),
            synthesizer: ContextSynthesizer::new(index, graph_query).with_top_k(config.index.top_k),
            answerer: ResilientInvoker::new(backends.answer_model, policy),
            permits: Semaphore::new(config.server.max_concurrent_requests),
        })
    }

    /// Build Gemini clients and the configured graph backend, then restore
    /// the index snapshot.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let api_key = config.gemini.resolved_api_key()?.to_string();
        let client = reqwest::Client::builder()
            .timeout(config.gemini.timeout())
            .build()
            .context("Failed to build HTTP client")?;

        let gemini = &config.gemini;
        let embeddings = GeminiEmbeddings::new(api_key.clone(), Some(gemini.embedding_model.clone()))
            .with_base_url(gemini.base_url.clone())
            .with_client(client.clone());
        let extraction_model = GeminiProvider::new(api_key.clone(), Some(gemini.extraction_model.clone()))
            .with_base_url(gemini.base_url.clone())
            .with_client(client.clone());
        let answer_model = GeminiProvider::new(api_key, Some(gemini.answer_model.clone()))
            .with_base_url(gemini.base_url.clone())
            .with_client(client.clone());
        let graph = open_graph_store(config, client)?;

        let service = Self::new(
            Backends {
                embeddings: Arc::new(embeddings),
                extraction_model: Arc::new(extraction_model),
                answer_model: Arc::new(answer_model),
                graph,
                text_extractor: Arc::new(PlainTextExtractor),
            },
            config,
        )?;
        service.restore().await;
        Ok(service)
    }

    /// Load the persisted index. Returns the number of chunks restored.
    pub async fn restore(&self) -> usize {
        self.index.restore().await
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    /// Ingest a syllabus: index its text and merge its concepts into the graph.
    ///
    /// Only unreadable input fails the call. Embedding, extraction and graph
    /// problems are reported in the message of a successful response.
    pub async fn process_syllabus(&self, file_name: &str, file_bytes: &[u8]) -> SyllabusResponse {
        let Ok(_permit) = self.permits.acquire().await else {
            return SyllabusResponse::failed("Service is shutting down".to_string());
        };
        info!(file = file_name, bytes = file_bytes.len(), "Processing syllabus");

        let text = match self.text_extractor.extract(file_name, file_bytes) {
            Ok(text) => text,
            Err(e) => {
                warn!(file = file_name, error = %e, "Could not read syllabus");
                return SyllabusResponse::failed(format!("Failed to read {}: {}", file_name, e));
            }
        };

        let chunks = self.chunker.chunk(&text);
        let (ingested, extracted) = tokio::join!(self.index.ingest(chunks), self.concepts.extract(&text));

        let mut problems = Vec::new();
        match ingested {
            Ok(stats) => info!(chunks = stats.chunks, persisted = stats.persisted, "Syllabus text indexed"),
            Err(e) => {
                error!(error = %e, "Embedding failed, previous index kept");
                problems.push(format!("text indexing failed ({})", e));
            }
        }

        let concepts: Vec<Concept> = match extracted {
            Ok(concepts) => concepts,
            Err(e) => {
                warn!(error = %e, "Concept extraction failed, continuing without concepts");
                problems.push(format!("concept extraction failed ({})", e));
                Vec::new()
            }
        };

        let merged = if concepts.is_empty() {
            concepts
        } else {
            match self.graph_builder.merge(file_name, &concepts).await {
                Ok(_) => concepts,
                Err(e) => {
                    error!(error = %e, "Graph write failed");
                    problems.push(format!("graph update failed ({})", e));
                    Vec::new()
                }
            }
        };

        let message = if problems.is_empty() {
            format!("Analyzed {} & Memorized Content", file_name)
        } else {
            format!("Analyzed {} with problems: {}", file_name, problems.join("; "))
        };

        SyllabusResponse {
            success: true,
            message,
            nodes_created: merged.len(),
            graph_json: serde_json::to_string(&merged).unwrap_or_else(|_| "[]".to_string()),
        }
    }

    /// Answer a question from the hybrid context.
    ///
    /// Any model failure yields the fixed fallback answer.
    pub async fn answer_question(&self, message: &str) -> ChatResponse {
        let Ok(_permit) = self.permits.acquire().await else {
            warn!("Question refused, service is shutting down");
            return ChatResponse {
                response: FALLBACK_ANSWER.to_string(),
            };
        };
        info!(question_len = message.len(), "Answering question");

        let prompt = self.synthesizer.build(message).await;
        let request = CompletionRequest::prompt(prompt).with_system(TUTOR_INSTRUCTION);
        let response = match self.answerer.invoke(&request).await {
            Ok(completion) => completion.content,
            Err(e) => {
                error!(error = %e, "Answer generation failed");
                FALLBACK_ANSWER.to_string()
            }
        };
        ChatResponse { response }
    }

    /// Stop admitting requests and flush the index snapshot.
    ///
    /// Calls already running finish normally; later ones are refused
    /// without touching any backend.
    pub async fn shutdown(&self) {
        if self.permits.is_closed() {
            return;
        }
        info!("Tutor service shutting down");
        self.permits.close();

        match self.index.snapshot().await {
            Ok(true) => debug!("Vector index snapshot flushed"),
            Ok(false) => {}
            Err(e) => error!(error = %e, "Failed to flush vector index snapshot"),
        }
    }

    /// Graph context lines for `text`.
    pub async fn graph_context(&self, text: &str) -> Result<Vec<String>, GraphError> {
        self.synthesizer.graph().context_for(text).await
    }
}
