//! HTTP client for the external image catalog
//!
//! The catalog service owns image ids, filenames, captions and bytes. It
//! lists images at `GET {base}/images` as `{"images": [...]}` and serves
//! files at `GET {base}/uploads/{filename}`.
//!
//! Author: hephaex@gmail.com

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use snapseek_core::{CatalogClient, CatalogConfig, CatalogImage, ImageId, Result, SnapError};
use std::time::Duration;

/// Read-only catalog client over HTTP
pub struct HttpCatalogClient {
    client: Client,
    base_url: Url,
}

/// Rows stay raw so one malformed entry does not sink the listing
#[derive(Debug, Deserialize)]
struct ImagesResponse {
    images: Vec<serde_json::Value>,
}

impl ImagesResponse {
    fn into_images(self) -> Vec<CatalogImage> {
        self.images
            .into_iter()
            .enumerate()
            .filter_map(|(index, row)| match serde_json::from_value::<CatalogRow>(row) {
                Ok(row) => Some(CatalogImage::from(row)),
                Err(e) => {
                    tracing::warn!(index, error = %e, "skipping malformed catalog row");
                    None
                }
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct CatalogRow {
    id: ImageId,
    filename: String,
    #[serde(default)]
    caption: Option<String>,
    #[serde(default)]
    gemini_caption: Option<String>,
}

impl From<CatalogRow> for CatalogImage {
    fn from(row: CatalogRow) -> Self {
        // Vision-model captions are richer than the legacy ones when present
        let caption = row
            .gemini_caption
            .filter(|c| !c.trim().is_empty())
            .or(row.caption);

        CatalogImage {
            id: row.id,
            filename: row.filename,
            caption,
        }
    }
}

fn upstream(context: &str) -> impl Fn(reqwest::Error) -> SnapError + '_ {
    move |e| SnapError::UpstreamUnavailable(format!("{context}: {e}"))
}

impl HttpCatalogClient {
    /// Create a client for the catalog at `base_url`
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| SnapError::Config(format!("invalid catalog URL '{base_url}': {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(SnapError::Config(format!(
                "catalog URL '{base_url}' cannot be used as a base"
            )));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SnapError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self { client, base_url })
    }

    /// Create from config. The catalog URL is required.
    pub fn from_config(config: &CatalogConfig) -> Result<Self> {
        let base_url = config
            .base_url
            .as_deref()
            .ok_or_else(|| SnapError::Config("catalog.base_url is not set".to_string()))?;
        Self::new(base_url, config.timeout())
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| SnapError::Config("catalog URL cannot be used as a base".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get(&self, url: Url) -> Result<reqwest::Response> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(upstream("Catalog request failed"))?;

        if !response.status().is_success() {
            return Err(SnapError::UpstreamUnavailable(format!(
                "Catalog returned {} for {url}",
                response.status()
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl CatalogClient for HttpCatalogClient {
    async fn list_images(&self) -> Result<Vec<CatalogImage>> {
        let response = self.get(self.endpoint(&["images"])?).await?;
        let body: ImagesResponse = response
            .json()
            .await
            .map_err(upstream("Failed to parse catalog listing"))?;

        let listed = body.images.len();
        let images = body.into_images();
        tracing::debug!(listed, usable = images.len(), "catalog listed");
        Ok(images)
    }

    async fn fetch_image(&self, image: &CatalogImage) -> Result<Vec<u8>> {
        let url = self.endpoint(&["uploads", &image.filename])?;
        let bytes = self
            .get(url)
            .await?
            .bytes()
            .await
            .map_err(upstream("Failed to download image"))?;

        Ok(bytes.to_vec())
    }
}
