//! Configuration for Ace.
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! environment variables prefixed with `ACE` (sections separated by `__`,
//! e.g. `ACE__GEMINI__API_KEY`). After loading, `${VAR}`, `$VAR` and a
//! leading `~` are expanded in every string value.

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Config file picked up from the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "ace.toml";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "ACE";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("No Gemini API key configured (set GEMINI_API_KEY or gemini.api_key)")]
    MissingApiKey,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub gemini: GeminiConfig,
    pub graph: GraphConfig,
    pub index: IndexConfig,
    pub extraction: ExtractionConfig,
    pub retry: RetryConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeminiConfig {
    pub api_key: String,
    pub base_url: String,
    pub embedding_model: String,
    pub extraction_model: String,
    pub answer_model: String,
    pub timeout_secs: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: "${GEMINI_API_KEY}".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            embedding_model: "text-embedding-004".to_string(),
            extraction_model: "gemini-2.5-flash".to_string(),
            answer_model: "gemini-2.5-flash-lite".to_string(),
            timeout_secs: 60,
        }
    }
}

impl GeminiConfig {
    /// The API key, or an error if it is empty or names an unset variable.
    pub fn resolved_api_key(&self) -> Result<&str, ConfigError> {
        let key = self.api_key.trim();
        if key.is_empty() || key.starts_with('$') {
            return Err(ConfigError::MissingApiKey);
        }
        Ok(key)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GraphBackend {
    #[default]
    Memory,
    Neo4j,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GraphConfig {
    pub backend: GraphBackend,
    /// Persistence file for the in-memory backend.
    pub path: PathBuf,
    pub neo4j_uri: Option<String>,
    pub neo4j_user: String,
    pub neo4j_password: String,
    pub neo4j_database: String,
    /// Maximum topics returned per question.
    pub context_limit: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            backend: GraphBackend::Memory,
            path: PathBuf::from(".ace/graph.json"),
            neo4j_uri: None,
            neo4j_user: "neo4j".to_string(),
            neo4j_password: "${NEO4J_PASSWORD}".to_string(),
            neo4j_database: "neo4j".to_string(),
            context_limit: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IndexConfig {
    pub snapshot_path: PathBuf,
    /// Chunk length in characters.
    pub chunk_size: usize,
    pub top_k: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            snapshot_path: PathBuf::from(".ace/index.json"),
            chunk_size: 1000,
            top_k: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Characters of document text sent for concept extraction.
    pub max_input_chars: usize,
    /// Sampling temperature for the extraction model.
    pub temperature: f32,
    /// Upper bound on the length of the model's concept list.
    pub max_output_tokens: u32,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_input_chars: 5000,
            temperature: 0.0,
            max_output_tokens: 8192,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 2000,
            backoff_factor: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub max_concurrent_requests: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 10,
        }
    }
}

impl Config {
    /// Load from `path` (or `ace.toml` if present) and `ACE__*` variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env_prefix(path, ENV_PREFIX)
    }

    /// Like [`Config::load`] with a custom environment prefix.
    pub fn load_with_env_prefix(path: Option<&Path>, prefix: &str) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder().add_source(config::Config::try_from(&Config::default())?);

        match path {
            Some(path) => {
                builder = builder.add_source(config::File::from(path).format(config::FileFormat::Toml).required(true));
            }
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                builder = builder.add_source(
                    config::File::with_name(DEFAULT_CONFIG_FILE)
                        .format(config::FileFormat::Toml)
                        .required(false),
                );
            }
            None => {}
        }

        builder = builder.add_source(
            config::Environment::with_prefix(prefix)
                .separator("__")
                .try_parsing(true),
        );

        let mut config: Config = builder.build()?.try_deserialize()?;
        config.expand_vars();
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document over the defaults. No environment overrides.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let mut config: Config =
            toml::from_str(text).map_err(|e| ConfigError::Invalid(format!("Failed to parse TOML: {}", e)))?;
        config.expand_vars();
        config.validate()?;
        Ok(config)
    }

    /// Expand environment references and `~` in string values.
    pub fn expand_vars(&mut self) {
        let gemini = &mut self.gemini;
        for value in [&mut gemini.api_key, &mut gemini.base_url] {
            *value = expand(value);
        }

        let graph = &mut self.graph;
        graph.neo4j_password = expand(&graph.neo4j_password);
        graph.neo4j_user = expand(&graph.neo4j_user);
        if let Some(uri) = graph.neo4j_uri.as_mut() {
            *uri = expand(uri);
        }
        graph.path = expand_path(&graph.path);
        self.index.snapshot_path = expand_path(&self.index.snapshot_path);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be at least 1".into()));
        }
        if !(self.retry.backoff_factor > 1.0) {
            return Err(ConfigError::Invalid(format!(
                "retry.backoff_factor must be greater than 1, got {}",
                self.retry.backoff_factor
            )));
        }
        if !(self.extraction.temperature >= 0.0 && self.extraction.temperature <= 2.0) {
            return Err(ConfigError::Invalid(format!(
                "extraction.temperature must be between 0 and 2, got {}",
                self.extraction.temperature
            )));
        }
        if self.extraction.max_output_tokens == 0 {
            return Err(ConfigError::Invalid("extraction.max_output_tokens must be greater than 0".into()));
        }
        if self.index.chunk_size == 0 {
            return Err(ConfigError::Invalid("index.chunk_size must be greater than 0".into()));
        }
        if self.server.max_concurrent_requests == 0 {
            return Err(ConfigError::Invalid(
                "server.max_concurrent_requests must be greater than 0".into(),
            ));
        }
        if self.graph.backend == GraphBackend::Neo4j
            && self.graph.neo4j_uri.as_deref().map_or(true, |uri| uri.trim().is_empty())
        {
            return Err(ConfigError::Invalid("graph.neo4j_uri is required for the neo4j backend".into()));
        }
        Ok(())
    }
}

/// Expand `~` and environment variables; unset variables are left as written.
fn expand(value: &str) -> String {
    let home = || dirs::home_dir().and_then(|p| p.to_str().map(str::to_owned));
    let expanded: Cow<str> = shellexpand::full_with_context_no_errors(value, home, |var| std::env::var(var).ok());
    expanded.into_owned()
}

fn expand_path(path: &Path) -> PathBuf {
    match path.to_str() {
        Some(s) => PathBuf::from(expand(s)),
        None => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.index.chunk_size, 1000);
        assert_eq!(config.index.top_k, 3);
        assert_eq!(config.extraction.max_input_chars, 5000);
        assert_eq!(config.extraction.temperature, 0.0);
        assert_eq!(config.extraction.max_output_tokens, 8192);
        assert_eq!(config.retry.initial_delay(), Duration::from_secs(2));
        assert_eq!(config.graph.backend, GraphBackend::Memory);
        assert_eq!(config.gemini.answer_model, "gemini-2.5-flash-lite");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            [index]
            chunk_size = 500

            [retry]
            max_attempts = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.index.chunk_size, 500);
        assert_eq!(config.index.top_k, 3);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.backoff_factor, 2.0);
    }

    #[test]
    fn test_load_file_and_env_layers() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [gemini]
            api_key = "from-file"
            answer_model = "file-model"

            [server]
            max_concurrent_requests = 4
            "#
        )
        .unwrap();

        std::env::set_var("ACE_LAYER_TEST__SERVER__MAX_CONCURRENT_REQUESTS", "7");
        let config = Config::load_with_env_prefix(Some(file.path()), "ACE_LAYER_TEST").unwrap();
        std::env::remove_var("ACE_LAYER_TEST__SERVER__MAX_CONCURRENT_REQUESTS");

        assert_eq!(config.gemini.resolved_api_key().unwrap(), "from-file");
        assert_eq!(config.gemini.answer_model, "file-model");
        assert_eq!(config.server.max_concurrent_requests, 7);
        assert_eq!(config.gemini.embedding_model, "text-embedding-004");
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let result = Config::load_with_env_prefix(Some(Path::new("/nonexistent/ace.toml")), "ACE_MISSING_TEST");
        assert!(matches!(result, Err(ConfigError::Load(_))));
    }

    #[test]
    fn test_env_references_are_expanded() {
        std::env::set_var("ACE_EXPAND_TEST_KEY", "secret-123");
        let config = Config::from_toml_str(
            r#"
            [gemini]
            api_key = "${ACE_EXPAND_TEST_KEY}"
            "#,
        )
        .unwrap();
        std::env::remove_var("ACE_EXPAND_TEST_KEY");

        assert_eq!(config.gemini.resolved_api_key().unwrap(), "secret-123");
    }

    #[test]
    fn test_unset_key_is_missing() {
        let config = Config::from_toml_str(
            r#"
            [gemini]
            api_key = "${ACE_DEFINITELY_UNSET_VAR}"
            "#,
        )
        .unwrap();

        assert_eq!(config.gemini.api_key, "${ACE_DEFINITELY_UNSET_VAR}");
        assert!(matches!(config.gemini.resolved_api_key(), Err(ConfigError::MissingApiKey)));
    }

    #[test]
    fn test_tilde_paths_are_expanded() {
        let config = Config::from_toml_str(
            r#"
            [index]
            snapshot_path = "~/ace/index.json"
            "#,
        )
        .unwrap();

        if let Some(home) = dirs::home_dir() {
            assert_eq!(config.index.snapshot_path, home.join("ace/index.json"));
        }
    }

    #[test]
    fn test_validation_rejections() {
        let cases = [
            "[retry]\nmax_attempts = 0",
            "[retry]\nbackoff_factor = 1.0",
            "[index]\nchunk_size = 0",
            "[extraction]\ntemperature = 3.5",
            "[extraction]\nmax_output_tokens = 0",
            "[server]\nmax_concurrent_requests = 0",
            "[graph]\nbackend = \"neo4j\"",
        ];
        for case in cases {
            let result = Config::from_toml_str(case);
            assert!(matches!(result, Err(ConfigError::Invalid(_))), "accepted: {case}");
        }
    }

    #[test]
    fn test_neo4j_backend_with_uri() {
        let config = Config::from_toml_str(
            r#"
            [graph]
            backend = "neo4j"
            neo4j_uri = "http://localhost:7474"
            "#,
        )
        .unwrap();
        assert_eq!(config.graph.backend, GraphBackend::Neo4j);
        assert_eq!(config.graph.neo4j_uri.as_deref(), Some("http://localhost:7474"));
    }

    #[test]
    fn test_config_serializes() {
        let json = serde_json::to_value(Config::default()).unwrap();
        assert_eq!(json["graph"]["backend"], "memory");
        assert_eq!(json["retry"]["max_attempts"], 3);
    }
}
