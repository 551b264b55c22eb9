//! Gemini provider implementation.
//!
//! Talks to the `generateContent` endpoint of the Gemini API. System
//! messages become the `systemInstruction`; user and assistant messages map
//! to the `user` and `model` content roles.
//!
//! # Usage
//!
//! ```rust,no_run
//! use ace_providers::{CompletionRequest, GeminiProvider, LLMProvider};
//!
//! # async fn demo() -> Result<(), ace_providers::ProviderError> {
//! let provider = GeminiProvider::new("your-api-key".to_string(), Some("gemini-2.5-flash".to_string()));
//! let response = provider.complete(CompletionRequest::prompt("Hello!")).await?;
//! println!("Response: {}", response.content);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    CompletionRequest, CompletionResponse, LLMProvider, MessageRole, ProviderError, ResponseFormat,
    Usage,
};

/// Default base URL for the Gemini API
pub const GEMINI_DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default model for Gemini
pub const GEMINI_DEFAULT_MODEL: &str = "gemini-2.5-flash";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    generation_config: GenerationConfig,
}

#[derive(Serialize, Deserialize, Default)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Serialize, Default)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    model_version: Option<String>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Content,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

/// Map a failed HTTP response to a [`ProviderError`].
///
/// 503, or an error body with status `UNAVAILABLE`, is transient overload.
pub fn classify_error(status: u16, body: &str) -> ProviderError {
    let parsed = serde_json::from_str::<ErrorEnvelope>(body).ok();
    let unavailable = status == 503
        || parsed
            .as_ref()
            .is_some_and(|e| e.error.status.eq_ignore_ascii_case("UNAVAILABLE"));
    let message = parsed
        .map(|e| e.error.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| body.to_string());

    if unavailable {
        ProviderError::Unavailable { status, message }
    } else {
        ProviderError::Api { status, message }
    }
}

/// Gemini provider implementation
#[derive(Clone)]
pub struct GeminiProvider {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiProvider {
    pub fn new(api_key: String, model: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model: model.unwrap_or_else(|| GEMINI_DEFAULT_MODEL.to_string()),
            base_url: GEMINI_DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Set a custom base URL (useful for testing or proxies).
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    /// Use a preconfigured HTTP client (timeouts, proxies).
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    fn create_request_body(&self, request: &CompletionRequest) -> GenerateContentRequest {
        let mut system_parts = Vec::new();
        let mut contents = Vec::new();

        for message in &request.messages {
            match message.role {
                MessageRole::System => system_parts.push(Part {
                    text: message.content.clone(),
                }),
                MessageRole::User | MessageRole::Assistant => contents.push(Content {
                    role: Some(
                        if message.role == MessageRole::User { "user" } else { "model" }.to_string(),
                    ),
                    parts: vec![Part {
                        text: message.content.clone(),
                    }],
                }),
            }
        }

        GenerateContentRequest {
            contents,
            system_instruction: (!system_parts.is_empty()).then(|| Content {
                role: None,
                parts: system_parts,
            }),
            generation_config: GenerationConfig {
                max_output_tokens: request.max_tokens,
                temperature: request.temperature,
                response_mime_type: match request.response_format {
                    ResponseFormat::Json => Some("application/json"),
                    ResponseFormat::Text => None,
                },
            },
        }
    }
}

#[async_trait]
impl LLMProvider for GeminiProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        debug!(
            "Processing Gemini completion request with {} messages",
            request.messages.len()
        );

        let body = self.create_request_body(&request);
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(classify_error(status.as_u16(), &error_text));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse Gemini response: {}", e)))?;

        let candidate = parsed
            .candidates
            .first()
            .ok_or_else(|| ProviderError::InvalidResponse("Gemini returned no candidates".to_string()))?;
        let content: String = candidate
            .content
            .parts
            .iter()
            .map(|p| p.text.as_str())
            .collect();

        let usage = parsed
            .usage_metadata
            .map(|u| Usage {
                prompt_tokens: u.prompt_token_count,
                completion_tokens: u.candidates_token_count,
                total_tokens: u.total_token_count,
            })
            .unwrap_or_default();

        debug!(
            "Gemini completion successful: {} tokens generated",
            usage.completion_tokens
        );

        Ok(CompletionResponse {
            content,
            usage,
            model: parsed.model_version.unwrap_or_else(|| self.model.clone()),
        })
    }

    fn name(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }
}
