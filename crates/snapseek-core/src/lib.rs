//! SnapSeek Core - Domain models, traits, and shared types
//!
//! This crate defines the core abstractions used throughout SnapSeek:
//! - Image identity and embedding vectors
//! - Stored records and query results
//! - Common error types
//! - Collaborator traits (embedder, captioner, catalog)
//! - Configuration management
//!
//! Author: hephaex@gmail.com

pub mod config;
pub mod vector;

pub use config::{
    AppConfig, CaptionProvider, CaptioningConfig, CatalogConfig, ConfigError, EmbeddingConfig,
    EmbeddingProvider, LoggingConfig, MultimodalConfig, SearchConfig, SearchStrategy,
    ServerConfig, StoreBackend, StoreConfig,
};
pub use vector::EmbeddingVector;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for SnapSeek operations
#[derive(Error, Debug)]
pub enum SnapError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Captioning failed: {0}")]
    Captioning(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<ConfigError> for SnapError {
    fn from(err: ConfigError) -> Self {
        SnapError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SnapError>;

// ============================================================================
// Image Identity
// ============================================================================

/// Identifier of an image, assigned by the external catalog.
///
/// Catalogs hand out integer ids, but callers may send them as strings.
/// Both forms are coerced to one canonical textual form: integral values
/// lose leading zeros and a `+` sign, so `"007"`, `"+7"` and `7` are the
/// same id. Non-numeric ids are kept verbatim (trimmed).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageId(String);

impl ImageId {
    /// Parse and canonicalize an id
    pub fn parse(raw: impl AsRef<str>) -> Result<Self> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(SnapError::Validation("image id must not be empty".to_string()));
        }

        let looks_numeric = trimmed
            .trim_start_matches(['+', '-'])
            .chars()
            .all(|c| c.is_ascii_digit());

        match trimmed.parse::<i64>() {
            Ok(n) if looks_numeric => Ok(Self(n.to_string())),
            _ => Ok(Self(trimmed.to_string())),
        }
    }

    /// Textual form
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Integer form, when the id is numeric
    pub fn as_integer(&self) -> Option<i64> {
        self.0.parse().ok()
    }
}

impl From<i64> for ImageId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<u32> for ImageId {
    fn from(id: u32) -> Self {
        Self(id.to_string())
    }
}

impl FromStr for ImageId {
    type Err = SnapError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for ImageId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self.as_integer() {
            Some(n) => serializer.serialize_i64(n),
            None => serializer.serialize_str(&self.0),
        }
    }
}

impl<'de> Deserialize<'de> for ImageId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Int(i64),
            Text(String),
        }

        let raw = RawId::deserialize(deserializer)?;
        let parsed = match raw {
            RawId::Int(n) => Ok(ImageId::from(n)),
            RawId::Text(s) => ImageId::parse(s),
        };
        parsed.map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Records and Results
// ============================================================================

/// Metadata stored alongside an embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    /// Image caption, if one was generated
    pub caption: Option<String>,

    /// Original filename in the catalog
    pub filename: String,
}

impl RecordMetadata {
    /// Create metadata with a caption
    pub fn new(caption: Option<String>, filename: impl Into<String>) -> Self {
        Self {
            caption,
            filename: filename.into(),
        }
    }
}

/// A persisted embedding, keyed by image id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: ImageId,
    pub embedding: EmbeddingVector,
    pub metadata: RecordMetadata,
}

impl Record {
    /// Create a new record
    pub fn new(id: ImageId, embedding: EmbeddingVector, metadata: RecordMetadata) -> Self {
        Self {
            id,
            embedding,
            metadata,
        }
    }

    /// Project this record into a query result with the given similarity
    pub fn to_result(&self, similarity: f32) -> QueryResult {
        QueryResult {
            id: self.id.clone(),
            caption: self.metadata.caption.clone(),
            filename: self.metadata.filename.clone(),
            similarity,
        }
    }
}

/// A ranked search hit. Similarity is recomputed per query and never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub id: ImageId,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,

    pub filename: String,

    pub similarity: f32,
}

/// Collection statistics used for health and initialization checks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub count: u64,
    pub name: String,
}

/// An image row as listed by the external catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogImage {
    pub id: ImageId,
    pub filename: String,
    pub caption: Option<String>,
}

impl CatalogImage {
    /// Caption usable for text search, if any
    pub fn searchable_caption(&self) -> Option<&str> {
        self.caption
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }
}

// ============================================================================
// Collaborator Traits
// ============================================================================

/// Produces unit-normalized embeddings for text and, optionally, images.
///
/// Implementations must be deterministic for a fixed model version and
/// must not share mutable state between concurrent calls.
#[async_trait::async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a piece of text
    async fn embed_text(&self, text: &str) -> Result<EmbeddingVector>;

    /// Embed raw image bytes
    async fn embed_image(&self, _image: &[u8]) -> Result<EmbeddingVector> {
        Err(SnapError::Unsupported(format!(
            "embedder '{}' does not accept image input",
            self.name()
        )))
    }

    /// Output dimension
    fn dimension(&self) -> usize;

    /// Name for logging
    fn name(&self) -> &str;
}

/// Generates a textual description of an image
#[async_trait::async_trait]
pub trait Captioner: Send + Sync {
    /// Caption an image. A failed model call is a `Captioning` error,
    /// which is distinct from a successful empty caption.
    async fn caption(&self, image: &[u8], prompt: Option<&str>) -> Result<String>;

    /// Name for logging
    fn name(&self) -> &str;
}

/// Read-only access to the external image catalog
#[async_trait::async_trait]
pub trait CatalogClient: Send + Sync {
    /// List every image known to the catalog
    async fn list_images(&self) -> Result<Vec<CatalogImage>>;

    /// Download the bytes of a catalog image
    async fn fetch_image(&self, image: &CatalogImage) -> Result<Vec<u8>>;
}

// ============================================================================
// Tests
// ============================================================================
