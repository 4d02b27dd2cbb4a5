//! SnapSeek Configuration Management
//!
//! Handles configuration from environment variables and TOML files with
//! sensible defaults for development. The resulting [`AppConfig`] is built
//! once at start-up and handed to every component that needs it.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Vector store configuration
    pub store: StoreConfig,

    /// Embedding provider configuration
    pub embedding: EmbeddingConfig,

    /// Captioning provider configuration
    pub captioning: CaptioningConfig,

    /// External image catalog
    pub catalog: CatalogConfig,

    /// Search behaviour
    pub search: SearchConfig,

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
        // Server
        if let Ok(host) = std::env::var("API_HOST") {
            self.server.host = host;
        }
        if let Some(port) = parse_env("API_PORT")? {
            self.server.port = port;
        }

        // CORS origins from environment variable (comma-separated)
        if let Ok(origins) = std::env::var("CORS_ORIGINS") {
            self.server.cors_origins = origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        // Store
        if let Ok(backend) = std::env::var("STORE_BACKEND") {
            self.store.backend = backend.parse()?;
        }
        if let Ok(path) = std::env::var("SQLITE_PATH") {
            self.store.sqlite_path = PathBuf::from(path);
        }
        if let Ok(url) = std::env::var("QDRANT_URL") {
            self.store.qdrant_url = url;
        }

        // Embedding
        if let Ok(provider) = std::env::var("EMBEDDING_PROVIDER") {
            self.embedding.provider = provider.parse()?;
        }
        if let Ok(model) = std::env::var("EMBEDDING_MODEL") {
            self.embedding.model = model;
        }
        if let Some(dimension) = parse_env("EMBEDDING_DIMENSION")? {
            self.embedding.dimension = dimension;
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            self.embedding.openai_api_key = Some(key);
        }
        if let Ok(url) = std::env::var("OLLAMA_URL") {
            self.embedding.ollama_url = url.clone();
            self.captioning.ollama_url = url;
        }
        if let Ok(url) = std::env::var("MULTIMODAL_EMBEDDING_URL") {
            let multimodal = self.embedding.multimodal.get_or_insert_with(Default::default);
            multimodal.url = url;
        }

        // Captioning
        if let Ok(provider) = std::env::var("CAPTION_PROVIDER") {
            self.captioning.provider = provider.parse()?;
        }
        if let Ok(model) = std::env::var("CAPTION_MODEL") {
            self.captioning.model = model;
        }
        if let Ok(key) = std::env::var("GEMINI_API_KEY") {
            self.captioning.gemini_api_key = Some(key);
        }

        // Catalog
        if let Ok(url) = std::env::var("CATALOG_URL") {
            self.catalog.base_url = Some(url);
        }

        // Search
        if let Ok(strategy) = std::env::var("SEARCH_STRATEGY") {
            self.search.strategy = strategy.parse()?;
        }

        // Logging
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(json) = parse_env("LOG_JSON")? {
            self.logging.json_format = json;
        }

        Ok(())
    }

    /// Check that the configuration can serve traffic.
    ///
    /// Missing credentials or endpoints for the selected providers are
    /// reported here, at start-up, rather than on the first request.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.embedding.provider == EmbeddingProvider::OpenAI
            && self.embedding.openai_api_key.is_none()
        {
            return Err(ConfigError::MissingRequired(
                "OPENAI_API_KEY (embedding.provider = openai)".to_string(),
            ));
        }

        if self.embedding.provider == EmbeddingProvider::Http && self.embedding.multimodal.is_none()
        {
            return Err(ConfigError::MissingRequired(
                "embedding.multimodal (embedding.provider = http)".to_string(),
            ));
        }

        if self.captioning.provider == CaptionProvider::Gemini
            && self.captioning.gemini_api_key.is_none()
        {
            return Err(ConfigError::MissingRequired(
                "GEMINI_API_KEY (captioning.provider = gemini)".to_string(),
            ));
        }

        if self.embedding.dimension == 0 {
            return Err(ConfigError::InvalidValue {
                key: "embedding.dimension".to_string(),
                value: "0".to_string(),
            });
        }

        if let Some(multimodal) = &self.embedding.multimodal {
            if multimodal.url.trim().is_empty() {
                return Err(ConfigError::MissingRequired(
                    "embedding.multimodal.url".to_string(),
                ));
            }
            if multimodal.dimension == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "embedding.multimodal.dimension".to_string(),
                    value: "0".to_string(),
                });
            }
        }

        for (key, value) in [
            ("search.caption_threshold", self.search.caption_threshold),
            ("search.multimodal_threshold", self.search.multimodal_threshold),
        ] {
            if !(-1.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: value.to_string(),
                });
            }
        }

        if self.search.default_top_k == 0 {
            return Err(ConfigError::InvalidValue {
                key: "search.default_top_k".to_string(),
                value: "0".to_string(),
            });
        }

        if self.search.strategy == SearchStrategy::Live && self.catalog.base_url.is_none() {
            return Err(ConfigError::MissingRequired(
                "CATALOG_URL (search.strategy = live)".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(key) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,

    /// Maximum request body size in bytes
    pub max_body_size: usize,

    /// Enable CORS
    pub cors_enabled: bool,

    /// Allowed origins for CORS
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5001,
            request_timeout_secs: 120,
            max_body_size: 20 * 1024 * 1024, // 20MB, images travel base64-encoded
            cors_enabled: true,
            cors_origins: vec![],
        }
    }
}

/// Vector store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Storage backend
    pub backend: StoreBackend,

    /// SQLite database file
    pub sqlite_path: PathBuf,

    /// Qdrant gRPC URL
    pub qdrant_url: String,

    /// Collection holding caption embeddings
    pub caption_collection: String,

    /// Collection holding image embeddings
    pub image_collection: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Sqlite,
            sqlite_path: PathBuf::from("snapseek.db"),
            qdrant_url: "http://localhost:6334".to_string(),
            caption_collection: "image_captions".to_string(),
            image_collection: "image_embeddings".to_string(),
        }
    }
}

/// Supported vector store backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Sqlite,
    Qdrant,
}

impl std::str::FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "sqlite" => Ok(Self::Sqlite),
            "qdrant" => Ok(Self::Qdrant),
            _ => Err(ConfigError::InvalidValue {
                key: "STORE_BACKEND".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Embedding provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Text embedding provider
    pub provider: EmbeddingProvider,

    /// Embedding model name
    pub model: String,

    /// Output dimension of the text embedding model
    pub dimension: usize,

    /// OpenAI API key
    pub openai_api_key: Option<String>,

    /// OpenAI API base URL (for compatible APIs)
    pub openai_base_url: Option<String>,

    /// Ollama server URL
    pub ollama_url: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Joint image/text embedding service (CLIP-style)
    pub multimodal: Option<MultimodalConfig>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Ollama,
            model: "all-minilm".to_string(),
            dimension: 384,
            openai_api_key: None,
            openai_base_url: None,
            ollama_url: "http://localhost:11434".to_string(),
            timeout_secs: 30,
            multimodal: None,
        }
    }
}

impl EmbeddingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Joint image/text embedding service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MultimodalConfig {
    /// Base URL of the embedding service
    pub url: String,

    /// Model name passed to the service
    pub model: String,

    /// Output dimension
    pub dimension: usize,
}

impl Default for MultimodalConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:5003".to_string(),
            model: "openai/clip-vit-base-patch32".to_string(),
            dimension: 512,
        }
    }
}

/// Supported text embedding providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    OpenAI,
    Ollama,
    /// Joint embedding service shared with image search
    Http,
    /// Offline feature-hashing embedder
    Hashing,
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            "http" => Ok(Self::Http),
            "hashing" => Ok(Self::Hashing),
            _ => Err(ConfigError::InvalidValue {
                key: "EMBEDDING_PROVIDER".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Captioning provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptioningConfig {
    /// Vision-language model provider
    pub provider: CaptionProvider,

    /// Model name
    pub model: String,

    /// Gemini API key
    pub gemini_api_key: Option<String>,

    /// Gemini API base URL
    pub gemini_base_url: String,

    /// Ollama server URL
    pub ollama_url: String,

    /// Prompt used when the caller supplies none
    pub default_prompt: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for CaptioningConfig {
    fn default() -> Self {
        Self {
            provider: CaptionProvider::Ollama,
            model: "llava".to_string(),
            gemini_api_key: None,
            gemini_base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            ollama_url: "http://localhost:11434".to_string(),
            default_prompt: DEFAULT_CAPTION_PROMPT.to_string(),
            timeout_secs: 60,
        }
    }
}

impl CaptioningConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

const DEFAULT_CAPTION_PROMPT: &str = "Generate a detailed descriptive caption for this image. \
Include information about: the main subjects and their attributes (colors, actions, positions), \
background elements and setting, mood or atmosphere of the image, and any notable objects or features. \
Provide a comprehensive description in 2-3 sentences.";

/// Supported captioning providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptionProvider {
    Gemini,
    Ollama,
}

impl std::str::FromStr for CaptionProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            "ollama" => Ok(Self::Ollama),
            _ => Err(ConfigError::InvalidValue {
                key: "CAPTION_PROVIDER".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// External image catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Base URL of the catalog service (serves `/images` and `/uploads/<file>`)
    pub base_url: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_secs: 10,
        }
    }
}

impl CatalogConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Where caption search candidates come from
    pub strategy: SearchStrategy,

    /// Result cap for caption search
    pub default_top_k: usize,

    /// Minimum similarity for caption-text search (exclusive)
    pub caption_threshold: f32,

    /// Minimum similarity for merged multimodal search (exclusive)
    pub multimodal_threshold: f32,

    /// Maximum number of cached caption embeddings
    pub cache_max_capacity: u64,

    /// Time-to-live for cached caption embeddings (in seconds)
    pub cache_ttl_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            strategy: SearchStrategy::Indexed,
            default_top_k: 20,
            caption_threshold: 0.3,
            // image embeddings populate a lower similarity range
            multimodal_threshold: 0.2,
            cache_max_capacity: 10_000,
            cache_ttl_secs: 3600,
        }
    }
}

/// Candidate source used for caption search
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchStrategy {
    /// Query the persistent caption index
    Indexed,
    /// Fetch the catalog and embed captions per query
    Live,
}

impl std::str::FromStr for SearchStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "indexed" => Ok(Self::Indexed),
            "live" => Ok(Self::Live),
            _ => Err(ConfigError::InvalidValue {
                key: "SEARCH_STRATEGY".to_string(),
                value: s.to_string(),
            }),
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
