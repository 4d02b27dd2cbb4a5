//! Candidate sources for text search
//!
//! A [`CandidateSource`] turns a query string into ranked results. The
//! indexed source asks a [`VectorStore`]; the live source lists the catalog
//! and embeds captions on the fly. Both share one ranking contract.
//!
//! Author: hephaex@gmail.com

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use snapseek_core::{
    CatalogClient, CatalogImage, Embedder, QueryResult, Result, SnapError,
};
use snapseek_vector::{Candidate, SimilarityRanker, VectorStore};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::EmbeddingCache;

/// Caption embeddings computed concurrently per live query
const LIVE_EMBED_CONCURRENCY: usize = 8;

/// Produces ranked results for a text query
#[async_trait]
pub trait CandidateSource: Send + Sync {
    /// Results with similarity strictly above `threshold`, best first,
    /// capped at `top_k` when given
    async fn fetch_candidates(
        &self,
        query: &str,
        threshold: f32,
        top_k: Option<usize>,
    ) -> Result<Vec<QueryResult>>;

    /// Source name for logging
    fn name(&self) -> &str;
}

// ============================================================================
// Indexed Source
// ============================================================================

/// Candidates from a persistent embedding index
pub struct IndexedSource {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
}

impl IndexedSource {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }
}

#[async_trait]
impl CandidateSource for IndexedSource {
    async fn fetch_candidates(
        &self,
        query: &str,
        threshold: f32,
        top_k: Option<usize>,
    ) -> Result<Vec<QueryResult>> {
        if top_k == Some(0) {
            return Ok(Vec::new());
        }
        let embedding = self.embedder.embed_text(query).await?;

        self.store
            .query_by_embedding(&embedding, top_k, threshold)
            .await
    }

    fn name(&self) -> &str {
        self.store.name()
    }
}

// ============================================================================
// Live Source
// ============================================================================

/// Candidates from the catalog, captions embedded per query.
///
/// Images without a caption are skipped, as are captions the embedder
/// rejects as unembeddable. A catalog or model outage fails the query.
pub struct LiveSource {
    catalog: Arc<dyn CatalogClient>,
    embedder: Arc<dyn Embedder>,
    cache: EmbeddingCache,
    timeout: Duration,
}

impl LiveSource {
    pub fn new(
        catalog: Arc<dyn CatalogClient>,
        embedder: Arc<dyn Embedder>,
        cache: EmbeddingCache,
        timeout: Duration,
    ) -> Self {
        Self {
            catalog,
            embedder,
            cache,
            timeout,
        }
    }

    async fn list_catalog(&self) -> Result<Vec<CatalogImage>> {
        tokio::time::timeout(self.timeout, self.catalog.list_images())
            .await
            .map_err(|_| {
                SnapError::UpstreamUnavailable(format!(
                    "catalog listing timed out after {:?}",
                    self.timeout
                ))
            })?
    }

    async fn to_candidate(&self, image: CatalogImage) -> Result<Candidate> {
        let embedding = match image.searchable_caption() {
            None => None,
            Some(caption) => match self.cache.get_or_embed(self.embedder.as_ref(), caption).await {
                Ok(embedding) => Some(embedding),
                Err(SnapError::Validation(reason)) => {
                    tracing::debug!(id = %image.id, %reason, "caption not embeddable");
                    None
                }
                Err(e) => return Err(e),
            },
        };

        Ok(Candidate {
            id: image.id,
            filename: image.filename,
            caption: image.caption,
            embedding,
        })
    }
}

#[async_trait]
impl CandidateSource for LiveSource {
    async fn fetch_candidates(
        &self,
        query: &str,
        threshold: f32,
        top_k: Option<usize>,
    ) -> Result<Vec<QueryResult>> {
        let query_embedding = self.embedder.embed_text(query).await?;
        let images = self.list_catalog().await?;
        let total = images.len();

        let candidates: Vec<Candidate> = stream::iter(images)
            .map(|image| self.to_candidate(image))
            .buffered(LIVE_EMBED_CONCURRENCY)
            .try_collect()
            .await?;

        let mut ranker = SimilarityRanker::new(threshold);
        if let Some(k) = top_k {
            ranker = ranker.with_limit(k);
        }
        let results = ranker.rank(&query_embedding, candidates);

        tracing::debug!(catalog = total, matched = results.len(), "live ranking done");
        Ok(results)
    }

    fn name(&self) -> &str {
        "live_catalog"
    }
}
