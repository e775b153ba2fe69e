use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use thiserror::Error;

const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_LLM_BASE_URL: &str = "https://ollama.com";
const DEFAULT_LLM_MODEL: &str = "gpt-oss:120b";
const DEFAULT_VISION_MODEL: &str = "qwen3-vl:235b-cloud";
const DEFAULT_EXTRACT_COMMAND: &str = "marker_single {input} --output_dir {output_dir}";
const DEFAULT_CHUNK_OVERLAP: usize = 50;
const DEFAULT_TOP_K: usize = 5;
const DEFAULT_UPLOAD_MAX_BYTES: usize = 100 * 1024 * 1024;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
    /// Configuration was already installed for this process.
    #[error("Configuration already initialized")]
    AlreadyInitialized,
}

/// Runtime configuration for the pdfrag server and CLI.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Base URL of the Qdrant instance that stores embeddings.
    pub qdrant_url: String,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// Embedding provider used to generate vector representations.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Base URL of the local Ollama runtime (embeddings and image descriptions).
    pub ollama_url: String,
    /// API key for the OpenAI embeddings endpoint.
    pub openai_api_key: Option<String>,
    /// Base URL of the OpenAI-compatible embeddings API.
    pub openai_base_url: String,
    /// Bearer credential for the hosted generation endpoint.
    pub llm_api_key: String,
    /// Base URL of the hosted generation endpoint.
    pub llm_base_url: String,
    /// Model used to answer chat questions.
    pub llm_model: String,
    /// Sampling temperature for answers.
    pub llm_temperature: f32,
    /// Vision-language model used to describe extracted images.
    pub vision_model: String,
    /// Maximum number of in-flight image descriptions per document.
    pub vision_concurrency: usize,
    /// Command template for the extraction stage.
    pub extract_command: String,
    /// Directory receiving uploaded documents.
    pub upload_dir: PathBuf,
    /// Root directory for per-job pipeline artifacts.
    pub work_dir: PathBuf,
    /// Directory holding `index.html` and `chat.html`.
    pub static_dir: PathBuf,
    /// Optional override for the automatic chunk size selection.
    pub text_splitter_chunk_size: Option<usize>,
    /// Token overlap between adjacent chunks.
    pub text_splitter_chunk_overlap: usize,
    /// Number of chunks retrieved per chat question.
    pub retrieval_top_k: usize,
    /// Upper bound on upload request bodies.
    pub upload_max_bytes: usize,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Supported embedding backends for the indexing stage.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Local Ollama runtime.
    Ollama,
    /// Hosted OpenAI embeddings API.
    OpenAI,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let embedding_provider: EmbeddingProvider = load_env("EMBEDDING_PROVIDER")?
            .parse()
            .map_err(|()| ConfigError::InvalidValue("EMBEDDING_PROVIDER".to_string()))?;
        let openai_api_key = load_env_optional("OPENAI_API_KEY");
        if embedding_provider == EmbeddingProvider::OpenAI && openai_api_key.is_none() {
            return Err(ConfigError::MissingVariable("OPENAI_API_KEY".to_string()));
        }

        Ok(Self {
            qdrant_url: load_env("QDRANT_URL")?,
            qdrant_api_key: load_env_optional("QDRANT_API_KEY"),
            embedding_provider,
            embedding_model: load_env("EMBEDDING_MODEL")?,
            embedding_dimension: parse_env("EMBEDDING_DIMENSION")?
                .ok_or_else(|| ConfigError::MissingVariable("EMBEDDING_DIMENSION".to_string()))?,
            ollama_url: load_env_optional("OLLAMA_URL")
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            openai_api_key,
            openai_base_url: load_env_optional("OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            llm_api_key: load_env_optional("OLLAMA_API_KEY")
                .ok_or_else(|| ConfigError::MissingVariable("OLLAMA_API_KEY".to_string()))?,
            llm_base_url: load_env_optional("LLM_BASE_URL")
                .unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string()),
            llm_model: load_env_optional("LLM_MODEL")
                .unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
            llm_temperature: parse_env("LLM_TEMPERATURE")?.unwrap_or(0.7),
            vision_model: load_env_optional("VISION_MODEL")
                .unwrap_or_else(|| DEFAULT_VISION_MODEL.to_string()),
            vision_concurrency: parse_env::<usize>("VISION_CONCURRENCY")?
                .unwrap_or(1)
                .max(1),
            extract_command: load_env_optional("EXTRACT_COMMAND")
                .unwrap_or_else(|| DEFAULT_EXTRACT_COMMAND.to_string()),
            upload_dir: load_env_optional("UPLOAD_DIR")
                .unwrap_or_else(|| "pdf".to_string())
                .into(),
            work_dir: load_env_optional("WORK_DIR")
                .unwrap_or_else(|| "processed".to_string())
                .into(),
            static_dir: load_env_optional("STATIC_DIR")
                .unwrap_or_else(|| "frontend".to_string())
                .into(),
            text_splitter_chunk_size: parse_env("TEXT_SPLITTER_CHUNK_SIZE")?,
            text_splitter_chunk_overlap: parse_env("TEXT_SPLITTER_CHUNK_OVERLAP")?
                .unwrap_or(DEFAULT_CHUNK_OVERLAP),
            retrieval_top_k: parse_env::<usize>("RETRIEVAL_TOP_K")?
                .unwrap_or(DEFAULT_TOP_K)
                .max(1),
            upload_max_bytes: parse_env("UPLOAD_MAX_BYTES")?.unwrap_or(DEFAULT_UPLOAD_MAX_BYTES),
            server_port: parse_env("SERVER_PORT")?,
        })
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    load_env_optional(key).ok_or_else(|| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
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

/// Load configuration from the environment (and `.env`) and install it in the global cache.
pub fn init_config() -> Result<&'static Config, ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    tracing::debug!(
        qdrant_url = %config.qdrant_url,
        embedding_provider = ?config.embedding_provider,
        embedding_model = %config.embedding_model,
        llm_model = %config.llm_model,
        vision_model = %config.vision_model,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    CONFIG
        .set(config)
        .map_err(|_| ConfigError::AlreadyInitialized)?;
    Ok(get_config())
}
