//! Concept extraction from syllabus text.
//!
//! The model is asked for `{"concepts": [{"name", "prerequisites"}]}` and
//! the reply is parsed fail-closed: anything that does not match the schema
//! is an [`ExtractionError`], never a partial result.

use std::collections::HashSet;
use std::sync::Arc;

use ace_index::Concept;
use ace_providers::{CompletionRequest, InvokeError, ResilientInvoker};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::prompts::extraction_prompt;

/// Characters of document text sent to the model.
pub const DEFAULT_MAX_INPUT_CHARS: usize = 5000;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Concept extraction call failed: {0}")]
    Invocation(#[from] InvokeError),

    #[error("Model reply is not valid JSON: {0}")]
    Malformed(String),

    #[error("Model reply does not match the concept schema: {0}")]
    Schema(String),
}

#[derive(Deserialize)]
struct ConceptList {
    concepts: Vec<RawConcept>,
}

#[derive(Deserialize)]
struct RawConcept {
    name: String,
    #[serde(default)]
    prerequisites: Option<Vec<String>>,
}

/// Asks the generative model for a document's concepts.
///
/// Requests are sent at temperature 0 unless configured otherwise.
pub struct ConceptExtractor {
    invoker: Arc<ResilientInvoker>,
    max_input_chars: usize,
    temperature: f32,
    max_output_tokens: Option<u32>,
}

impl ConceptExtractor {
    pub fn new(invoker: Arc<ResilientInvoker>) -> Self {
        Self {
            invoker,
            max_input_chars: DEFAULT_MAX_INPUT_CHARS,
            temperature: 0.0,
            max_output_tokens: None,
        }
    }

    pub fn with_max_input_chars(mut self, max_input_chars: usize) -> Self {
        self.max_input_chars = max_input_chars;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = Some(max_output_tokens);
        self
    }

    fn request(&self, prefix: &str) -> CompletionRequest {
        let request = CompletionRequest::prompt(extraction_prompt(prefix))
            .json()
            .with_temperature(self.temperature);
        match self.max_output_tokens {
            Some(limit) => request.with_max_tokens(limit),
            None => request,
        }
    }

    pub async fn extract(&self, text: &str) -> Result<Vec<Concept>, ExtractionError> {
        let prefix = char_prefix(text, self.max_input_chars);
        debug!(
            chars = prefix.chars().count(),
            model = self.invoker.provider().model(),
            "Requesting concept extraction"
        );

        let response = self.invoker.invoke(&self.request(prefix)).await?;
        let concepts = parse_concepts(&response.content)?;

        info!(concepts = concepts.len(), "Extracted concepts");
        Ok(concepts)
    }
}

/// Parse and validate a model reply into concepts.
///
/// Names and prerequisites are trimmed. Blank and self-referencing
/// prerequisites are dropped and duplicates keep their first position.
pub fn parse_concepts(raw: &str) -> Result<Vec<Concept>, ExtractionError> {
    let value: Value =
        serde_json::from_str(strip_code_fence(raw)).map_err(|e| ExtractionError::Malformed(e.to_string()))?;
    let list: ConceptList = serde_json::from_value(value).map_err(|e| ExtractionError::Schema(e.to_string()))?;

    list.concepts
        .into_iter()
        .enumerate()
        .map(|(position, raw)| {
            let name = raw.name.trim();
            if name.is_empty() {
                return Err(ExtractionError::Schema(format!("concept {} has a blank name", position)));
            }

            let mut seen = HashSet::new();
            let prerequisites: Vec<String> = raw
                .prerequisites
                .unwrap_or_default()
                .iter()
                .map(|p| p.trim())
                .filter(|p| !p.is_empty() && *p != name)
                .filter(|p| seen.insert(p.to_string()))
                .map(str::to_string)
                .collect();

            Ok(Concept::new(name).with_prerequisites(prerequisites))
        })
        .collect()
}

/// Remove a surrounding Markdown code fence, if any.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Skip the info string ("json") up to the first newline
    let body = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest,
    };
    body.strip_suffix("```").unwrap_or(body).trim()
}

fn char_prefix(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_pos, _)) => &text[..byte_pos],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ace_providers::{CompletionResponse, LLMProvider, ProviderError, ResponseFormat, RetryPolicy};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records each request and replies with a fixed concept list.
    #[derive(Default)]
    struct RecordingModel {
        requests: Mutex<Vec<CompletionRequest>>,
    }

    #[async_trait]
    impl LLMProvider for RecordingModel {
        async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
            self.requests.lock().unwrap().push(request);
            Ok(CompletionResponse {
                content: r#"{"concepts": [{"name": "Sets", "prerequisites": []}]}"#.to_string(),
                usage: Default::default(),
                model: "recording".to_string(),
            })
        }

        fn name(&self) -> &str {
            "recording"
        }

        fn model(&self) -> &str {
            "recording"
        }
    }

    #[tokio::test]
    async fn test_extract_sends_configured_request() {
        let model = Arc::new(RecordingModel::default());
        let extractor = ConceptExtractor::new(Arc::new(ResilientInvoker::new(model.clone(), RetryPolicy::default())))
            .with_max_input_chars(4)
            .with_temperature(0.2)
            .with_max_output_tokens(1024);

        let concepts = extractor.extract("Sets and relations").await.unwrap();
        assert_eq!(concepts.len(), 1);

        let requests = model.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].response_format, ResponseFormat::Json);
        assert_eq!(requests[0].temperature, Some(0.2));
        assert_eq!(requests[0].max_tokens, Some(1024));
        assert!(requests[0].messages[0].content.ends_with("Text: Sets"));
    }

    #[tokio::test]
    async fn test_extract_defaults_to_zero_temperature() {
        let model = Arc::new(RecordingModel::default());
        let extractor = ConceptExtractor::new(Arc::new(ResilientInvoker::new(model.clone(), RetryPolicy::default())));

        extractor.extract("Week 1").await.unwrap();

        let requests = model.requests.lock().unwrap();
        assert_eq!(requests[0].temperature, Some(0.0));
        assert_eq!(requests[0].max_tokens, None);
    }

    #[test]
    fn test_parse_valid_reply() {
        let concepts = parse_concepts(
            r#"{"concepts": [
                {"name": "Recursion", "prerequisites": ["Functions", "Stacks"]},
                {"name": "Functions"}
            ]}"#,
        )
        .unwrap();

        assert_eq!(
            concepts,
            vec![
                Concept::new("Recursion").with_prerequisites(["Functions", "Stacks"]),
                Concept::new("Functions"),
            ]
        );
    }

    #[test]
    fn test_parse_cleans_prerequisites() {
        let concepts = parse_concepts(
            r#"{"concepts": [{"name": " Trees ", "prerequisites": ["Graphs", " ", "Trees", "Graphs ", "Sets"], "difficulty": 3}]}"#,
        )
        .unwrap();

        assert_eq!(concepts, vec![Concept::new("Trees").with_prerequisites(["Graphs", "Sets"])]);
    }

    #[test]
    fn test_parse_null_prerequisites() {
        let concepts = parse_concepts(r#"{"concepts": [{"name": "Sets", "prerequisites": null}]}"#).unwrap();
        assert!(concepts[0].prerequisites.is_empty());
    }

    #[test]
    fn test_parse_fenced_reply() {
        let raw = "```json\n{\"concepts\": [{\"name\": \"Heaps\"}]}\n```";
        assert_eq!(parse_concepts(raw).unwrap(), vec![Concept::new("Heaps")]);
    }

    #[test]
    fn test_parse_rejects_malformed_json() {
        assert!(matches!(
            parse_concepts("Sure! Here are the concepts:"),
            Err(ExtractionError::Malformed(_))
        ));
    }

    #[test]
    fn test_parse_rejects_schema_mismatch() {
        for raw in [
            r#"{"topics": []}"#,
            r#"[{"name": "Sets"}]"#,
            r#"{"concepts": [{"prerequisites": []}]}"#,
            r#"{"concepts": [{"name": 42}]}"#,
            r#"{"concepts": [{"name": "  "}]}"#,
            r#"{"concepts": [{"name": "Sets", "prerequisites": "Logic"}]}"#,
        ] {
            assert!(
                matches!(parse_concepts(raw), Err(ExtractionError::Schema(_))),
                "accepted: {raw}"
            );
        }
    }

    #[test]
    fn test_empty_concept_list_is_valid() {
        assert!(parse_concepts(r#"{"concepts": []}"#).unwrap().is_empty());
    }

    #[test]
    fn test_char_prefix_respects_utf8() {
        assert_eq!(char_prefix("héllo", 2), "hé");
        assert_eq!(char_prefix("abc", 10), "abc");
        assert_eq!(char_prefix("abc", 0), "");
    }
}
