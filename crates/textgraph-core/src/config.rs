//! textgraph Configuration Management
//!
//! Handles configuration from environment variables and TOML files
//! with sensible defaults for development.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Graph store connection
    pub database: DatabaseConfig,

    /// Generative-model provider configuration
    pub llm: LlmConfig,

    /// Extraction limits and thresholds
    pub extraction: ExtractionConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        self.apply_env()?;
        Ok(self)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        // Graph store
        if let Ok(backend) = std::env::var("GRAPH_BACKEND") {
            self.database.backend = backend.parse()?;
        }
        if let Ok(url) = std::env::var("SURREALDB_URL") {
            self.database.surrealdb_url = url;
        }
        if let Ok(user) = std::env::var("SURREALDB_USER") {
            self.database.surrealdb_user = user;
        }
        if let Ok(pass) = std::env::var("SURREALDB_PASS") {
            self.database.surrealdb_pass = pass;
        }
        if let Ok(ns) = std::env::var("SURREALDB_NAMESPACE") {
            self.database.surrealdb_namespace = ns;
        }
        if let Ok(db) = std::env::var("SURREALDB_DATABASE") {
            self.database.surrealdb_database = db;
        }

        // LLM
        if let Ok(enabled) = std::env::var("LLM_ENABLED") {
            self.llm.enabled = parse_env("LLM_ENABLED", &enabled)?;
        }
        if let Ok(provider) = std::env::var("LLM_PROVIDER") {
            self.llm.provider = provider.parse()?;
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            self.llm.openai_api_key = Some(key);
        }
        if let Ok(url) = std::env::var("OPENAI_BASE_URL") {
            self.llm.openai_base_url = Some(url);
        }
        if let Ok(url) = std::env::var("OLLAMA_URL") {
            self.llm.ollama_url = url;
        }
        if let Ok(model) = std::env::var("LLM_MODEL") {
            self.llm.model = model;
        }
        if let Ok(secs) = std::env::var("LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_env("LLM_TIMEOUT_SECS", &secs)?;
        }

        // Extraction
        if let Ok(max) = std::env::var("MAX_INPUT_BYTES") {
            self.extraction.max_input_bytes = parse_env("MAX_INPUT_BYTES", &max)?;
        }

        // Logging
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(json) = std::env::var("LOG_JSON") {
            self.logging.json_format = parse_env("LOG_JSON", &json)?;
        }

        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// Which graph store backs the reconciler
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphBackend {
    /// Process-local store, lost on exit
    #[default]
    Memory,
    SurrealDb,
}

impl std::str::FromStr for GraphBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" | "mem" => Ok(Self::Memory),
            "surrealdb" | "surreal" => Ok(Self::SurrealDb),
            _ => Err(ConfigError::InvalidValue {
                key: "GRAPH_BACKEND".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Graph store connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Store backend
    pub backend: GraphBackend,

    /// SurrealDB WebSocket URL
    pub surrealdb_url: String,

    /// SurrealDB username
    pub surrealdb_user: String,

    /// SurrealDB password
    pub surrealdb_pass: String,

    /// SurrealDB namespace
    pub surrealdb_namespace: String,

    /// SurrealDB database name
    pub surrealdb_database: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: GraphBackend::Memory,
            surrealdb_url: "ws://localhost:8000".to_string(),
            surrealdb_user: "root".to_string(),
            surrealdb_pass: "root".to_string(),
            surrealdb_namespace: "textgraph".to_string(),
            surrealdb_database: "graph".to_string(),
        }
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Try the model-backed strategy before the rule-based one
    pub enabled: bool,

    /// LLM provider to use
    pub provider: LlmProvider,

    /// OpenAI API key
    pub openai_api_key: Option<String>,

    /// OpenAI API base URL (for Azure or compatible APIs)
    pub openai_base_url: Option<String>,

    /// Ollama server URL
    pub ollama_url: String,

    /// Model name to use
    pub model: String,

    /// Maximum tokens for completion
    pub max_tokens: u32,

    /// Temperature for generation
    pub temperature: f32,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: LlmProvider::OpenAI,
            openai_api_key: None,
            openai_base_url: None,
            ollama_url: "http://localhost:11434".to_string(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: 2048,
            temperature: 0.1,
            timeout_secs: 60,
        }
    }
}

/// Supported LLM providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    OpenAI,
    Ollama,
    Azure,
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            "azure" => Ok(Self::Azure),
            _ => Err(ConfigError::InvalidValue {
                key: "LLM_PROVIDER".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Extraction limits and thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Largest accepted input, in bytes
    pub max_input_bytes: usize,

    /// Largest text slice embedded in the model prompt, in characters
    pub max_prompt_chars: usize,

    /// Model-backed relationships below this are dropped
    pub relationship_confidence_floor: f32,

    /// Confidence stamped on new edges that carry none
    pub default_relationship_confidence: f32,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_input_bytes: 1024 * 1024, // 1MB
            max_prompt_chars: 12_000,
            relationship_confidence_floor: 0.7,
            default_relationship_confidence: 0.8,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,

    /// Include file/line in logs
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            include_location: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.database.backend, GraphBackend::Memory);
        assert!(!config.llm.enabled);
        assert_eq!(config.extraction.relationship_confidence_floor, 0.7);
        assert_eq!(config.extraction.default_relationship_confidence, 0.8);
    }

    #[test]
    fn test_llm_provider_parse() {
        assert_eq!(
            "openai".parse::<LlmProvider>().unwrap(),
            LlmProvider::OpenAI
        );
        assert_eq!(
            "ollama".parse::<LlmProvider>().unwrap(),
            LlmProvider::Ollama
        );
        assert!("invalid".parse::<LlmProvider>().is_err());
    }

    #[test]
    fn test_graph_backend_parse() {
        assert_eq!(
            "SurrealDB".parse::<GraphBackend>().unwrap(),
            GraphBackend::SurrealDb
        );
        assert_eq!("mem".parse::<GraphBackend>().unwrap(), GraphBackend::Memory);
        assert!("neo4j".parse::<GraphBackend>().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [llm]
            enabled = true
            provider = "ollama"
            model = "llama3"

            [extraction]
            max_input_bytes = 2048
            "#,
        )
        .unwrap();

        assert!(config.llm.enabled);
        assert_eq!(config.llm.provider, LlmProvider::Ollama);
        assert_eq!(config.llm.timeout_secs, 60);
        assert_eq!(config.extraction.max_input_bytes, 2048);
        assert_eq!(config.extraction.max_prompt_chars, 12_000);
        assert_eq!(config.database.surrealdb_namespace, "textgraph");
    }

    #[test]
    fn test_from_file_missing() {
        let err = AppConfig::from_file("/nonexistent/textgraph.toml").unwrap_err();
        assert!(matches!(err, ConfigError::FileReadError { .. }));
    }
}
