//! Embedding clients for generating vector representations
//!
//! Supports OpenAI and Ollama text embedding APIs, a CLIP-style HTTP
//! service that embeds both images and text into one space, and an
//! offline feature-hashing embedder.
//!
//! Every client returns unit-normalized vectors of its configured
//! dimension.
//!
//! Author: hephaex@gmail.com

use async_trait::async_trait;
use base64::Engine as _;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use snapseek_core::{
    Embedder, EmbeddingConfig, EmbeddingProvider, EmbeddingVector, MultimodalConfig, Result,
    SnapError,
};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Shared helpers
// ============================================================================

fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| SnapError::Config(format!("Failed to build HTTP client: {e}")))
}

fn ensure_text(text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(SnapError::Validation(
            "cannot embed empty text".to_string(),
        ));
    }
    Ok(())
}

/// Check the raw output of a remote model and normalize it
fn finish(provider: &str, raw: Vec<f32>, dimension: usize) -> Result<EmbeddingVector> {
    if raw.len() != dimension {
        return Err(SnapError::UpstreamUnavailable(format!(
            "{provider} returned a {}-dimensional embedding, expected {dimension}",
            raw.len()
        )));
    }
    EmbeddingVector::normalized(raw).map_err(|e| {
        SnapError::UpstreamUnavailable(format!("{provider} returned an unusable embedding: {e}"))
    })
}

async fn read_json<T: for<'de> Deserialize<'de>>(
    provider: &str,
    response: reqwest::Response,
) -> Result<T> {
    if !response.status().is_success() {
        let status = response.status();
        let error_text = response.text().await.unwrap_or_default();
        return Err(SnapError::UpstreamUnavailable(format!(
            "{provider} embedding error ({status}): {error_text}"
        )));
    }

    response.json().await.map_err(|e| {
        SnapError::UpstreamUnavailable(format!(
            "Failed to parse {provider} embedding response: {e}"
        ))
    })
}

// ============================================================================
// OpenAI Embedding Client
// ============================================================================

/// OpenAI embedding API client
pub struct OpenAiEmbedder {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    dimension: usize,
}

#[derive(Debug, Serialize)]
struct OpenAiEmbeddingRequest<'a> {
    input: Vec<&'a str>,
    model: &'a str,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl OpenAiEmbedder {
    /// Create from config
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = config
            .openai_api_key
            .as_ref()
            .ok_or_else(|| SnapError::Config("OpenAI API key required".to_string()))?;

        Ok(Self {
            client: http_client(config.timeout())?,
            api_key: api_key.clone(),
            base_url: config
                .openai_base_url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            model: config.model.clone(),
            dimension: config.dimension,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed_text(&self, text: &str) -> Result<EmbeddingVector> {
        ensure_text(text)?;

        let request = OpenAiEmbeddingRequest {
            input: vec![text],
            model: &self.model,
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                SnapError::UpstreamUnavailable(format!("Embedding request failed: {e}"))
            })?;

        let result: OpenAiEmbeddingResponse = read_json("OpenAI", response).await?;
        let raw = result
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| {
                SnapError::UpstreamUnavailable("No embedding returned".to_string())
            })?;

        finish("OpenAI", raw, self.dimension)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Ollama Embedding Client
// ============================================================================

/// Ollama embedding API client
pub struct OllamaEmbedder {
    client: Client,
    base_url: String,
    model: String,
    dimension: usize,
}

#[derive(Debug, Serialize)]
struct OllamaEmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbeddingResponse {
    embedding: Vec<f32>,
}

impl OllamaEmbedder {
    /// Create from config
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(config.timeout())?,
            base_url: config.ollama_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            dimension: config.dimension,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed_text(&self, text: &str) -> Result<EmbeddingVector> {
        ensure_text(text)?;

        let request = OllamaEmbeddingRequest {
            model: &self.model,
            prompt: text,
        };

        let response = self
            .client
            .post(format!("{}/api/embeddings", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                SnapError::UpstreamUnavailable(format!("Ollama embedding request failed: {e}"))
            })?;

        let result: OllamaEmbeddingResponse = read_json("Ollama", response).await?;
        finish("Ollama", result.embedding, self.dimension)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Multimodal HTTP Embedding Client
// ============================================================================

/// Client for a joint image/text embedding service.
///
/// `POST {url}/embed/text` takes `{model, text}` and `POST {url}/embed/image`
/// takes `{model, image}` with base64 image bytes; both answer
/// `{embedding: [f32]}`.
pub struct HttpEmbedder {
    client: Client,
    base_url: String,
    model: String,
    dimension: usize,
}

#[derive(Debug, Serialize)]
struct TextEmbeddingRequest<'a> {
    model: &'a str,
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct ImageEmbeddingRequest<'a> {
    model: &'a str,
    image: String,
}

#[derive(Debug, Deserialize)]
struct HttpEmbeddingResponse {
    embedding: Vec<f32>,
}

impl HttpEmbedder {
    /// Create a new client for the service at `config.url`
    pub fn new(config: &MultimodalConfig, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            base_url: config.url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            dimension: config.dimension,
        })
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<EmbeddingVector> {
        let response = self
            .client
            .post(format!("{}{path}", self.base_url))
            .json(body)
            .send()
            .await
            .map_err(|e| {
                SnapError::UpstreamUnavailable(format!("Embedding service request failed: {e}"))
            })?;

        let result: HttpEmbeddingResponse = read_json("embedding service", response).await?;
        finish("embedding service", result.embedding, self.dimension)
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed_text(&self, text: &str) -> Result<EmbeddingVector> {
        ensure_text(text)?;
        self.post(
            "/embed/text",
            &TextEmbeddingRequest {
                model: &self.model,
                text,
            },
        )
        .await
    }

    async fn embed_image(&self, image: &[u8]) -> Result<EmbeddingVector> {
        if image.is_empty() {
            return Err(SnapError::Validation("image is empty".to_string()));
        }
        self.post(
            "/embed/image",
            &ImageEmbeddingRequest {
                model: &self.model,
                image: base64::engine::general_purpose::STANDARD.encode(image),
            },
        )
        .await
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Feature-hashing Embedder
// ============================================================================

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0100_0000_01b3;

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |hash, b| {
        (hash ^ u64::from(*b)).wrapping_mul(FNV_PRIME)
    })
}

/// Deterministic bag-of-words embedder that needs no model server.
///
/// Each lowercase alphanumeric token is hashed into one bucket with a
/// hash-derived sign. Texts sharing words land close together, which is
/// enough for development setups and tests.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn hash_tokens(&self, text: &str) -> Vec<f32> {
        let mut values = vec![0.0f32; self.dimension];
        let lowered = text.to_lowercase();
        for token in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let hash = fnv1a(token.as_bytes());
            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            values[bucket] += sign;
        }
        values
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed_text(&self, text: &str) -> Result<EmbeddingVector> {
        ensure_text(text)?;
        EmbeddingVector::normalized(self.hash_tokens(text)).map_err(|_| {
            SnapError::Validation(format!("text has no embeddable tokens: {text:?}"))
        })
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "hashing"
    }
}

// ============================================================================
// Factory functions
// ============================================================================

/// Create the text embedder selected by config
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    let embedder: Arc<dyn Embedder> = match config.provider {
        EmbeddingProvider::OpenAI => Arc::new(OpenAiEmbedder::from_config(config)?),
        EmbeddingProvider::Ollama => Arc::new(OllamaEmbedder::from_config(config)?),
        EmbeddingProvider::Http => {
            let multimodal = config.multimodal.as_ref().ok_or_else(|| {
                SnapError::Config("embedding.multimodal is required for the http provider".to_string())
            })?;
            Arc::new(HttpEmbedder::new(multimodal, config.timeout())?)
        }
        EmbeddingProvider::Hashing => Arc::new(HashingEmbedder::new(config.dimension)),
    };

    tracing::info!(
        provider = ?config.provider,
        model = embedder.name(),
        dimension = embedder.dimension(),
        "text embedder ready"
    );
    Ok(embedder)
}

/// Create the image/text embedder, if one is configured
pub fn create_multimodal_embedder(config: &EmbeddingConfig) -> Result<Option<Arc<dyn Embedder>>> {
    config
        .multimodal
        .as_ref()
        .map(|multimodal| {
            let embedder: Arc<dyn Embedder> =
                Arc::new(HttpEmbedder::new(multimodal, config.timeout())?);
            Ok(embedder)
        })
        .transpose()
}

// ============================================================================
// Tests
// ============================================================================
