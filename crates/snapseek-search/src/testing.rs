//! Deterministic collaborators for tests
//!
//! Fixture embedders map known inputs to explicit vectors so rankings can
//! be asserted exactly; the fixture catalog can be emptied, slowed down or
//! taken offline.

use async_trait::async_trait;
use snapseek_core::{
    Captioner, CatalogClient, CatalogImage, Embedder, EmbeddingVector, Result, SnapError,
};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

/// Embedder answering from a fixed table
#[derive(Debug, Clone)]
pub struct FixtureEmbedder {
    name: String,
    dimension: usize,
    texts: HashMap<String, Vec<f32>>,
    images: HashMap<Vec<u8>, Vec<f32>>,
}

impl FixtureEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            name: "fixture".to_string(),
            dimension,
            texts: HashMap::new(),
            images: HashMap::new(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Map `text` to `values` (normalized on lookup)
    pub fn with(mut self, text: impl Into<String>, values: Vec<f32>) -> Self {
        self.texts.insert(text.into(), values);
        self
    }

    /// Map image bytes to `values`
    pub fn with_image(mut self, image: impl Into<Vec<u8>>, values: Vec<f32>) -> Self {
        self.images.insert(image.into(), values);
        self
    }
}

#[async_trait]
impl Embedder for FixtureEmbedder {
    async fn embed_text(&self, text: &str) -> Result<EmbeddingVector> {
        match self.texts.get(text) {
            Some(values) => EmbeddingVector::normalized(values.clone()),
            None => Err(SnapError::Validation(format!("no fixture for {text:?}"))),
        }
    }

    async fn embed_image(&self, image: &[u8]) -> Result<EmbeddingVector> {
        match self.images.get(image) {
            Some(values) => EmbeddingVector::normalized(values.clone()),
            None => Err(SnapError::UpstreamUnavailable(
                "image not recognised by fixture".to_string(),
            )),
        }
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// In-process catalog
#[derive(Debug, Default)]
pub struct FixtureCatalog {
    images: RwLock<Vec<CatalogImage>>,
    files: HashMap<String, Vec<u8>>,
    available: bool,
    delay: Option<Duration>,
}

impl FixtureCatalog {
    pub fn new(images: Vec<CatalogImage>) -> Self {
        Self {
            images: RwLock::new(images),
            files: HashMap::new(),
            available: true,
            delay: None,
        }
    }

    /// A catalog whose every call fails
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::default()
        }
    }

    /// Serve `bytes` for `filename`
    pub fn with_file(mut self, filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.files.insert(filename.into(), bytes.into());
        self
    }

    /// Delay every listing
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Replace the listing, as the owning service would after edits
    pub fn set_images(&self, images: Vec<CatalogImage>) {
        if let Ok(mut guard) = self.images.write() {
            *guard = images;
        }
    }
}

#[async_trait]
impl CatalogClient for FixtureCatalog {
    async fn list_images(&self) -> Result<Vec<CatalogImage>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if !self.available {
            return Err(SnapError::UpstreamUnavailable("catalog offline".to_string()));
        }
        self.images
            .read()
            .map(|images| images.clone())
            .map_err(|_| SnapError::UpstreamUnavailable("catalog poisoned".to_string()))
    }

    async fn fetch_image(&self, image: &CatalogImage) -> Result<Vec<u8>> {
        if !self.available {
            return Err(SnapError::UpstreamUnavailable("catalog offline".to_string()));
        }
        self.files.get(&image.filename).cloned().ok_or_else(|| {
            SnapError::UpstreamUnavailable(format!("no file {}", image.filename))
        })
    }
}

/// Captioner returning a canned caption, or failing
#[derive(Debug, Clone)]
pub struct FixtureCaptioner {
    caption: Option<String>,
}

impl FixtureCaptioner {
    pub fn new(caption: impl Into<String>) -> Self {
        Self {
            caption: Some(caption.into()),
        }
    }

    pub fn failing() -> Self {
        Self { caption: None }
    }
}

#[async_trait]
impl Captioner for FixtureCaptioner {
    async fn caption(&self, image: &[u8], prompt: Option<&str>) -> Result<String> {
        if image.is_empty() {
            return Err(SnapError::Validation("image is empty".to_string()));
        }
        match &self.caption {
            Some(caption) => Ok(match prompt {
                Some(prompt) => format!("{caption} ({prompt})"),
                None => caption.clone(),
            }),
            None => Err(SnapError::Captioning("model unavailable".to_string())),
        }
    }

    fn name(&self) -> &str {
        "fixture"
    }
}
