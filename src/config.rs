use serde::Deserialize;
use std::env;
use std::sync::OnceLock;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the docuchat server.
///
/// API credentials are deliberately absent: they arrive from user input when a
/// session is created, never from the environment.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Base URL of the hosted document parsing service.
    pub parse_service_url: String,
    /// Language hint forwarded to the parsing service.
    pub parse_language: String,
    /// Base URL of the OpenAI-compatible completion/embedding API.
    pub llm_base_url: String,
    /// Chat model used for answer synthesis and summaries.
    pub completion_model: String,
    /// Embedding backend used to vectorize chunks and queries.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Number of chunks retrieved as context for each query.
    pub retrieval_top_k: usize,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Supported embedding backends.
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Hosted OpenAI-compatible embeddings API.
    OpenAI,
    /// Deterministic local byte-folding encoder, useful offline and in tests.
    Hashed,
}

const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_COMPLETION_MODEL: &str = "gpt-3.5-turbo";
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
const DEFAULT_EMBEDDING_DIMENSION: usize = 1536;
const DEFAULT_RETRIEVAL_TOP_K: usize = 4;
const DEFAULT_PARSE_LANGUAGE: &str = "en";

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            parse_service_url: load_env("PARSE_SERVICE_URL")?,
            parse_language: load_env_optional("PARSE_LANGUAGE")
                .unwrap_or_else(|| DEFAULT_PARSE_LANGUAGE.to_string()),
            llm_base_url: load_env_optional("LLM_BASE_URL")
                .unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string()),
            completion_model: load_env_optional("COMPLETION_MODEL")
                .unwrap_or_else(|| DEFAULT_COMPLETION_MODEL.to_string()),
            embedding_provider: load_env_optional("EMBEDDING_PROVIDER")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|()| ConfigError::InvalidValue("EMBEDDING_PROVIDER".to_string()))
                })
                .transpose()?
                .unwrap_or(EmbeddingProvider::OpenAI),
            embedding_model: load_env_optional("EMBEDDING_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            embedding_dimension: load_env_optional("EMBEDDING_DIMENSION")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("EMBEDDING_DIMENSION".to_string()))
                })
                .transpose()?
                .unwrap_or(DEFAULT_EMBEDDING_DIMENSION),
            retrieval_top_k: load_env_optional("RETRIEVAL_TOP_K")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("RETRIEVAL_TOP_K".to_string()))
                })
                .transpose()?
                .unwrap_or(DEFAULT_RETRIEVAL_TOP_K),
            server_port: load_env_optional("SERVER_PORT")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".into()))
                })
                .transpose()?,
        })
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    env::var(key)
        .map_err(|_| ConfigError::MissingVariable(key.to_string()))
        .and_then(|value| {
            if value.trim().is_empty() {
                Err(ConfigError::MissingVariable(key.to_string()))
            } else {
                Ok(value)
            }
        })
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "hashed" => Ok(Self::Hashed),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        parse_service_url = %config.parse_service_url,
        llm_base_url = %config.llm_base_url,
        completion_model = %config.completion_model,
        embedding_provider = ?config.embedding_provider,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}
