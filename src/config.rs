//! Application configuration.
//!
//! Settings are layered: built-in defaults, then an optional `paper-vss.toml`
//! (or an explicit file), then environment variables of the form
//! `PAPER_VSS__<SECTION>__<KEY>` (e.g. `PAPER_VSS__REDIS__PASSWORD`).

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::embedding::fastembed::DEFAULT_FASTEMBED_MODEL;
use crate::embedding::openai::OPENAI_EMBEDDINGS_URL;
use crate::{DEFAULT_EMBEDDING_DIMENSION, DEFAULT_INDEX_NAME};

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub redis: RedisConfig,

    #[serde(default)]
    pub embedding: EmbeddingSettings,

    #[serde(default)]
    pub qa: QaSettings,

    #[serde(default)]
    pub server: ServerSettings,
}

impl AppConfig {
    /// Load configuration from an optional file plus the environment.
    ///
    /// Without `path`, `paper-vss.{toml,yaml,json}` in the working directory is
    /// used if present.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name("paper-vss").required(false),
        };

        let config: AppConfig = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix("PAPER_VSS")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings that can never work.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.redis.index_name.trim().is_empty() {
            return Err(ConfigError::Invalid("redis.index_name cannot be empty".into()));
        }
        if self.redis.dimension == Some(0) {
            return Err(ConfigError::Invalid("redis.dimension must be positive".into()));
        }
        if self.embedding.provider == EmbeddingBackendKind::OpenAi && self.embedding.dimension == 0 {
            return Err(ConfigError::Invalid("embedding.dimension must be positive".into()));
        }
        if self.qa.max_answer_len == 0 {
            return Err(ConfigError::Invalid("qa.max_answer_len must be positive".into()));
        }
        if self.qa.doc_stride >= self.qa.max_sequence_len {
            return Err(ConfigError::Invalid(
                "qa.doc_stride must be smaller than qa.max_sequence_len".into(),
            ));
        }
        Ok(())
    }
}

/// Connection settings for the RediSearch backend.
#[derive(Clone, Deserialize, Serialize)]
pub struct RedisConfig {
    /// Full connection URL; overrides host/port/password/db when set
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default = "default_redis_host")]
    pub host: String,

    #[serde(default = "default_redis_port")]
    pub port: u16,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default)]
    pub db: i64,

    /// Name of the search index
    #[serde(default = "default_index_name")]
    pub index_name: String,

    /// Vector attribute in the index schema
    #[serde(default = "default_vector_field")]
    pub vector_field: String,

    /// Index vector dimension, used when it cannot be read from `FT.INFO`
    #[serde(default)]
    pub dimension: Option<usize>,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: default_redis_host(),
            port: default_redis_port(),
            password: None,
            db: 0,
            index_name: default_index_name(),
            vector_field: default_vector_field(),
            dimension: None,
            connect_timeout_ms: default_connect_timeout_ms(),
            query_timeout_ms: default_query_timeout_ms(),
        }
    }
}

impl RedisConfig {
    /// Connection URL in `redis://:<password>@<host>:<port>/<db>` form.
    pub fn connection_url(&self) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }
        match &self.password {
            Some(password) => format!("redis://:{}@{}:{}/{}", password, self.host, self.port, self.db),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }

    /// Connection URL safe for logs.
    pub fn redacted_url(&self) -> String {
        if let Some(url) = &self.url {
            return match (url.find("://"), url.rfind('@')) {
                (Some(scheme), Some(at)) if at > scheme => {
                    format!("{}***{}", &url[..scheme + 3], &url[at..])
                }
                _ => url.clone(),
            };
        }
        match &self.password {
            Some(_) => format!("redis://:***@{}:{}/{}", self.host, self.port, self.db),
            None => self.connection_url(),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}

impl std::fmt::Debug for RedisConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisConfig")
            .field("url", &self.redacted_url())
            .field("index_name", &self.index_name)
            .field("vector_field", &self.vector_field)
            .field("dimension", &self.dimension)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("query_timeout_ms", &self.query_timeout_ms)
            .finish()
    }
}

/// Which embedding implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackendKind {
    /// Local fastembed model
    Fastembed,
    /// OpenAI-compatible HTTP endpoint
    #[serde(rename = "openai")]
    OpenAi,
}

/// Embedding model settings.
#[derive(Clone, Deserialize, Serialize)]
pub struct EmbeddingSettings {
    #[serde(default = "default_embedding_provider")]
    pub provider: EmbeddingBackendKind,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// fastembed model cache directory
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    /// Embeddings endpoint for the openai provider, the hosted OpenAI API if unset
    #[serde(default)]
    pub api_url: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,

    /// Output dimension of the openai provider's model
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    #[serde(default = "default_embedding_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            cache_dir: None,
            api_url: None,
            api_key: None,
            dimension: default_embedding_dimension(),
            timeout_ms: default_embedding_timeout_ms(),
        }
    }
}

impl EmbeddingSettings {
    /// Endpoint the openai provider talks to.
    pub fn endpoint(&self) -> &str {
        self.api_url.as_deref().unwrap_or(OPENAI_EMBEDDINGS_URL)
    }
}

impl std::fmt::Debug for EmbeddingSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingSettings")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("cache_dir", &self.cache_dir)
            .field("api_url", &self.api_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("dimension", &self.dimension)
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

/// Extractive question-answering model settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QaSettings {
    /// ONNX export of a SQuAD-style model
    #[serde(default)]
    pub model_path: Option<PathBuf>,

    /// `tokenizer.json` matching the model
    #[serde(default)]
    pub tokenizer_path: Option<PathBuf>,

    /// Longest answer, in tokens
    #[serde(default = "default_max_answer_len")]
    pub max_answer_len: usize,

    /// Question plus context token budget per window
    #[serde(default = "default_max_sequence_len")]
    pub max_sequence_len: usize,

    /// Tokens shared by consecutive windows over a long context
    #[serde(default = "default_doc_stride")]
    pub doc_stride: usize,
}

impl Default for QaSettings {
    fn default() -> Self {
        Self {
            model_path: None,
            tokenizer_path: None,
            max_answer_len: default_max_answer_len(),
            max_sequence_len: default_max_sequence_len(),
            doc_stride: default_doc_stride(),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerSettings {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_true")]
    pub enable_cors: bool,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Load models and check dimensions before accepting requests
    #[serde(default)]
    pub preload_models: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            port: default_port(),
            timeout_secs: default_timeout_secs(),
            enable_cors: default_true(),
            log_level: default_log_level(),
            preload_models: false,
        }
    }
}

impl ServerSettings {
    /// Socket address to bind to.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.bind_addr, self.port)
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("invalid bind address: {e}")))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_redis_host() -> String {
    "localhost".to_string()
}

fn default_redis_port() -> u16 {
    6379
}

fn default_index_name() -> String {
    DEFAULT_INDEX_NAME.to_string()
}

fn default_vector_field() -> String {
    crate::query::DEFAULT_VECTOR_FIELD.to_string()
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_query_timeout_ms() -> u64 {
    10_000
}

fn default_embedding_provider() -> EmbeddingBackendKind {
    EmbeddingBackendKind::Fastembed
}

fn default_embedding_model() -> String {
    DEFAULT_FASTEMBED_MODEL.to_string()
}

fn default_embedding_dimension() -> usize {
    DEFAULT_EMBEDDING_DIMENSION
}

fn default_embedding_timeout_ms() -> u64 {
    30_000
}

fn default_max_answer_len() -> usize {
    15
}

fn default_max_sequence_len() -> usize {
    384
}

fn default_doc_stride() -> usize {
    128
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}
