//! SnapSeek Search - Semantic image search orchestrator
//!
//! This crate ties the collaborators together:
//! - Caption indexing into the persistent caption collection
//! - Text search over the index or the live catalog
//! - Multimodal search, merging image-space and caption-space results
//! - Catalog reconciliation (status and backfill)
//! - Caption generation
//!
//! Author: hephaex@gmail.com

use serde::{Deserialize, Serialize};
use snapseek_core::{
    AppConfig, Captioner, CatalogClient, CatalogImage, Embedder, EmbeddingVector, ImageId,
    QueryResult, Record, RecordMetadata, Result, SearchConfig, SearchStrategy, SnapError,
    StoreStats,
};
use snapseek_vector::{create_embedder, create_multimodal_embedder, open_store, VectorStore};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub mod cache;
pub mod caption;
pub mod catalog;
pub mod merger;
pub mod source;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use cache::{CacheStatsReport, EmbeddingCache};
pub use caption::{create_captioner, GeminiCaptioner, OllamaCaptioner};
pub use catalog::HttpCatalogClient;
pub use merger::ResultMerger;
pub use source::{CandidateSource, IndexedSource, LiveSource};

// ============================================================================
// Reports
// ============================================================================

/// How far the indexes lag behind the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingStatus {
    /// Every catalog image has the embeddings this deployment maintains
    pub initialized: bool,
    pub total_images: u64,
    pub caption_embeddings: u64,
    /// `None` when no image index is configured
    pub image_embeddings: Option<u64>,
}

/// Outcome of a backfill run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackfillReport {
    /// Images whose embeddings were written
    pub processed: u64,
    /// Images where at least one step failed
    pub failed: u64,
    /// Images with nothing to embed
    pub skipped: u64,
    pub total: u64,
}

// ============================================================================
// Search Engine
// ============================================================================

/// Image search orchestrator.
///
/// Built once at start-up and shared by reference; every operation is a
/// single request with no background work.
pub struct SearchEngine {
    /// Text embedder for captions and queries
    embedder: Arc<dyn Embedder>,

    /// Caption collection
    caption_store: Arc<dyn VectorStore>,

    /// Joint image/text embedder and its collection
    image_index: Option<(Arc<dyn Embedder>, Arc<dyn VectorStore>)>,

    captioner: Option<Arc<dyn Captioner>>,

    catalog: Option<Arc<dyn CatalogClient>>,

    indexed: IndexedSource,

    live: Option<LiveSource>,

    cache: EmbeddingCache,

    catalog_timeout: Duration,

    config: SearchConfig,
}

impl SearchEngine {
    /// Create an engine over a caption collection
    pub fn new(
        embedder: Arc<dyn Embedder>,
        caption_store: Arc<dyn VectorStore>,
        config: SearchConfig,
    ) -> Self {
        Self {
            indexed: IndexedSource::new(embedder.clone(), caption_store.clone()),
            cache: EmbeddingCache::from_config(&config),
            embedder,
            caption_store,
            image_index: None,
            captioner: None,
            catalog: None,
            live: None,
            catalog_timeout: Duration::from_secs(10),
            config,
        }
    }

    /// Enable image embeddings and multimodal search
    pub fn with_image_index(
        mut self,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        self.image_index = Some((embedder, store));
        self
    }

    /// Enable caption generation
    pub fn with_captioner(mut self, captioner: Arc<dyn Captioner>) -> Self {
        self.captioner = Some(captioner);
        self
    }

    /// Attach the external catalog, enabling the live source, status and backfill
    pub fn with_catalog(mut self, catalog: Arc<dyn CatalogClient>, timeout: Duration) -> Self {
        self.live = Some(LiveSource::new(
            catalog.clone(),
            self.embedder.clone(),
            self.cache.clone(),
            timeout,
        ));
        self.catalog = Some(catalog);
        self.catalog_timeout = timeout;
        self
    }

    /// Build every component from configuration
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let embedder = create_embedder(&config.embedding)?;
        let caption_store = open_store(
            &config.store,
            &config.store.caption_collection,
            embedder.dimension(),
        )
        .await?;

        let mut engine = Self::new(embedder, caption_store, config.search.clone())
            .with_captioner(create_captioner(&config.captioning)?);

        if let Some(image_embedder) = create_multimodal_embedder(&config.embedding)? {
            let image_store = open_store(
                &config.store,
                &config.store.image_collection,
                image_embedder.dimension(),
            )
            .await?;
            engine = engine.with_image_index(image_embedder, image_store);
        }

        if config.catalog.base_url.is_some() {
            let catalog = HttpCatalogClient::from_config(&config.catalog)?;
            engine = engine.with_catalog(Arc::new(catalog), config.catalog.timeout());
        }

        if config.search.strategy == SearchStrategy::Live && engine.live.is_none() {
            return Err(SnapError::Config(
                "live search strategy requires catalog.base_url".to_string(),
            ));
        }

        tracing::info!(
            strategy = ?config.search.strategy,
            image_index = engine.image_index.is_some(),
            catalog = engine.catalog.is_some(),
            "search engine ready"
        );
        Ok(engine)
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn has_image_index(&self) -> bool {
        self.image_index.is_some()
    }

    pub fn has_catalog(&self) -> bool {
        self.catalog.is_some()
    }

    /// Caption embedding cache statistics
    pub async fn cache_stats(&self) -> CacheStatsReport {
        self.cache.report().await
    }

    // ------------------------------------------------------------------------
    // Indexing
    // ------------------------------------------------------------------------

    /// Store a precomputed caption embedding, replacing any previous record
    pub async fn upsert_embedding(
        &self,
        id: ImageId,
        caption: Option<String>,
        embedding: EmbeddingVector,
        filename: impl Into<String>,
    ) -> Result<()> {
        let embedding = EmbeddingVector::normalized(embedding.into_inner())?;
        let record = Record::new(id, embedding, RecordMetadata::new(caption, filename));

        self.caption_store.upsert(record).await?;
        Ok(())
    }

    /// Embed a caption and store it
    pub async fn index_caption(
        &self,
        id: ImageId,
        caption: &str,
        filename: impl Into<String>,
    ) -> Result<()> {
        let caption = caption.trim();
        if caption.is_empty() {
            return Err(SnapError::Validation("caption must not be empty".to_string()));
        }

        let embedding = self.embedder.embed_text(caption).await?;
        self.upsert_embedding(id.clone(), Some(caption.to_string()), embedding, filename)
            .await?;

        tracing::info!(%id, "caption embedding saved");
        Ok(())
    }

    /// Embed image bytes and store them in the image collection
    pub async fn index_image(
        &self,
        id: ImageId,
        filename: impl Into<String>,
        image: &[u8],
    ) -> Result<()> {
        let (embedder, store) = self.image_index()?;
        if image.is_empty() {
            return Err(SnapError::Validation("image is empty".to_string()));
        }

        let embedding = embedder.embed_image(image).await?;
        store
            .upsert(Record::new(
                id.clone(),
                embedding,
                RecordMetadata::new(None, filename),
            ))
            .await?;

        tracing::info!(%id, "image embedding saved");
        Ok(())
    }

    /// Remove an image from every index. Unknown ids are fine.
    pub async fn delete_embedding(&self, id: &ImageId) -> Result<()> {
        self.caption_store.delete(id).await?;
        if let Some((_, store)) = &self.image_index {
            store.delete(id).await?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Search
    // ------------------------------------------------------------------------

    /// Caption search. Defaults come from configuration (top 20, above 0.3).
    pub async fn search(
        &self,
        query: &str,
        top_k: Option<usize>,
        threshold: Option<f32>,
    ) -> Result<Vec<QueryResult>> {
        let start = Instant::now();
        let query = validate_query_text(query)?;
        let top_k = top_k.unwrap_or(self.config.default_top_k);
        let threshold = validate_threshold(threshold.unwrap_or(self.config.caption_threshold))?;

        if top_k == 0 {
            return Ok(Vec::new());
        }

        let source = self.caption_source();
        let results = source.fetch_candidates(query, threshold, Some(top_k)).await?;

        tracing::debug!(
            source = source.name(),
            results = results.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "search finished"
        );
        Ok(results)
    }

    /// Image-space search merged with caption search.
    ///
    /// Both lists are uncapped; an image matched by both keeps its better
    /// score. Defaults to the multimodal threshold (0.2).
    pub async fn multimodal_search(
        &self,
        query: &str,
        threshold: Option<f32>,
    ) -> Result<Vec<QueryResult>> {
        let query = validate_query_text(query)?;
        let threshold =
            validate_threshold(threshold.unwrap_or(self.config.multimodal_threshold))?;
        let (embedder, store) = self.image_index()?;
        let image_source = IndexedSource::new(embedder.clone(), store.clone());

        let (image_results, caption_results) = tokio::try_join!(
            image_source.fetch_candidates(query, threshold, None),
            self.caption_source().fetch_candidates(query, threshold, None),
        )?;

        tracing::debug!(
            image = image_results.len(),
            caption = caption_results.len(),
            "multimodal candidates"
        );

        Ok(ResultMerger::new(threshold).merge([image_results, caption_results]))
    }

    /// Caption collection statistics
    pub async fn stats(&self) -> Result<StoreStats> {
        self.caption_store.stats().await
    }

    /// Image collection statistics, if configured
    pub async fn image_stats(&self) -> Result<Option<StoreStats>> {
        match &self.image_index {
            Some((_, store)) => Ok(Some(store.stats().await?)),
            None => Ok(None),
        }
    }

    // ------------------------------------------------------------------------
    // Catalog reconciliation
    // ------------------------------------------------------------------------

    /// Compare stored embedding counts against the catalog size
    pub async fn embedding_status(&self) -> Result<EmbeddingStatus> {
        let images = self.list_catalog().await?;
        let total_images = images.len() as u64;
        let caption_embeddings = self.stats().await?.count;
        let image_embeddings = self.image_stats().await?.map(|s| s.count);

        Ok(EmbeddingStatus {
            initialized: caption_embeddings >= total_images
                && image_embeddings.map_or(true, |n| n >= total_images),
            total_images,
            caption_embeddings,
            image_embeddings,
        })
    }

    /// Embed every catalog image. Per-image failures are logged and counted.
    pub async fn backfill(&self) -> Result<BackfillReport> {
        let images = self.list_catalog().await?;
        let mut report = BackfillReport {
            total: images.len() as u64,
            ..Default::default()
        };

        tracing::info!(total = report.total, "backfill started");

        for image in images {
            let has_caption = image.searchable_caption().is_some();
            if !has_caption && self.image_index.is_none() {
                report.skipped += 1;
                continue;
            }

            match self.backfill_one(&image).await {
                Ok(()) => report.processed += 1,
                Err(e) => {
                    tracing::warn!(id = %image.id, error = %e, "backfill failed for image");
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            processed = report.processed,
            failed = report.failed,
            skipped = report.skipped,
            "backfill finished"
        );
        Ok(report)
    }

    async fn backfill_one(&self, image: &CatalogImage) -> Result<()> {
        if let Some(caption) = image.searchable_caption() {
            self.index_caption(image.id.clone(), caption, image.filename.clone())
                .await?;
        }

        if self.image_index.is_some() {
            let catalog = self.catalog()?;
            let bytes = self
                .bounded("image download", catalog.fetch_image(image))
                .await?;
            self.index_image(image.id.clone(), image.filename.clone(), &bytes)
                .await?;
        }

        Ok(())
    }

    // ------------------------------------------------------------------------
    // Captioning
    // ------------------------------------------------------------------------

    /// Describe an image; the configured default prompt applies when none
    /// is given
    pub async fn generate_caption(&self, image: &[u8], prompt: Option<&str>) -> Result<String> {
        let captioner = self
            .captioner
            .as_ref()
            .ok_or_else(|| SnapError::Unsupported("no captioner configured".to_string()))?;

        if image.is_empty() {
            return Err(SnapError::Validation("image is empty".to_string()));
        }

        let prompt = prompt.map(str::trim).filter(|p| !p.is_empty());
        let caption = captioner.caption(image, prompt).await?;

        tracing::debug!(captioner = captioner.name(), chars = caption.len(), "caption generated");
        Ok(caption)
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    fn caption_source(&self) -> &dyn CandidateSource {
        match (self.config.strategy, &self.live) {
            (SearchStrategy::Live, Some(live)) => live,
            _ => &self.indexed,
        }
    }

    fn image_index(&self) -> Result<(&Arc<dyn Embedder>, &Arc<dyn VectorStore>)> {
        self.image_index
            .as_ref()
            .map(|(embedder, store)| (embedder, store))
            .ok_or_else(|| SnapError::Unsupported("no image embedding index configured".to_string()))
    }

    fn catalog(&self) -> Result<&Arc<dyn CatalogClient>> {
        self.catalog
            .as_ref()
            .ok_or_else(|| SnapError::Unsupported("no catalog configured".to_string()))
    }

    async fn list_catalog(&self) -> Result<Vec<CatalogImage>> {
        let catalog = self.catalog()?;
        self.bounded("catalog listing", catalog.list_images()).await
    }

    async fn bounded<T>(&self, what: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.catalog_timeout, fut)
            .await
            .map_err(|_| {
                SnapError::UpstreamUnavailable(format!(
                    "{what} timed out after {:?}",
                    self.catalog_timeout
                ))
            })?
    }
}

fn validate_query_text(query: &str) -> Result<&str> {
    let query = query.trim();
    if query.is_empty() {
        return Err(SnapError::Validation("No search query provided".to_string()));
    }
    Ok(query)
}

fn validate_threshold(threshold: f32) -> Result<f32> {
    if !(-1.0..=1.0).contains(&threshold) {
        return Err(SnapError::Validation(format!(
            "threshold must be within [-1, 1], got {threshold}"
        )));
    }
    Ok(threshold)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FixtureCaptioner, FixtureCatalog, FixtureEmbedder};
    use snapseek_vector::InMemoryStore;

    fn emb(values: &[f32]) -> EmbeddingVector {
        EmbeddingVector::new(values.to_vec())
    }

    fn text_embedder() -> Arc<FixtureEmbedder> {
        Arc::new(
            FixtureEmbedder::new(3)
                .named("minilm")
                .with("red car", vec![1.0, 0.1, 0.0])
                .with("a red car", vec![1.0, 0.0, 0.0])
                .with("a blue boat", vec![0.0, 1.0, 0.0])
                .with("a red car on a street", vec![0.9, 0.0, 0.3])
                .with("boat", vec![0.0, 1.0, 0.05]),
        )
    }

    fn clip_embedder() -> Arc<FixtureEmbedder> {
        Arc::new(
            FixtureEmbedder::new(2)
                .named("clip")
                .with("red car", vec![1.0, 0.0])
                .with("boat", vec![0.0, 1.0])
                .with_image(b"car-pixels".to_vec(), vec![0.8, 0.6])
                .with_image(b"boat-pixels".to_vec(), vec![0.1, 1.0])
                .with_image(b"street-pixels".to_vec(), vec![1.0, 0.0]),
        )
    }

    fn image(id: i64, caption: Option<&str>) -> CatalogImage {
        CatalogImage {
            id: ImageId::from(id),
            filename: format!("{id}.jpg"),
            caption: caption.map(str::to_string),
        }
    }

    fn catalog() -> FixtureCatalog {
        FixtureCatalog::new(vec![
            image(1, Some("a red car")),
            image(2, Some("a blue boat")),
            image(3, Some("a red car on a street")),
        ])
        .with_file("1.jpg", b"car-pixels".to_vec())
        .with_file("2.jpg", b"boat-pixels".to_vec())
        .with_file("3.jpg", b"street-pixels".to_vec())
    }

    fn engine() -> SearchEngine {
        SearchEngine::new(
            text_embedder(),
            Arc::new(InMemoryStore::new("image_captions", 3)),
            SearchConfig::default(),
        )
    }

    fn full_engine(strategy: SearchStrategy) -> SearchEngine {
        SearchEngine::new(
            text_embedder(),
            Arc::new(InMemoryStore::new("image_captions", 3)),
            SearchConfig {
                strategy,
                ..Default::default()
            },
        )
        .with_image_index(
            clip_embedder(),
            Arc::new(InMemoryStore::new("image_embeddings", 2)),
        )
        .with_catalog(Arc::new(catalog()), Duration::from_secs(5))
        .with_captioner(Arc::new(FixtureCaptioner::new("a photo")))
    }

    async fn seed(engine: &SearchEngine) {
        engine
            .upsert_embedding(ImageId::from(1i64), Some("a red car".into()), emb(&[1.0, 0.0, 0.0]), "1.jpg")
            .await
            .unwrap();
        engine
            .upsert_embedding(ImageId::from(2i64), Some("a blue boat".into()), emb(&[0.0, 1.0, 0.0]), "2.jpg")
            .await
            .unwrap();
        engine
            .upsert_embedding(
                ImageId::from(3i64),
                Some("a red car on a street".into()),
                emb(&[0.9, 0.0, 0.3]),
                "3.jpg",
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_search_returns_fixture_ranking() {
        let engine = engine();
        seed(&engine).await;

        let results = engine.search("red car", Some(2), Some(0.3)).await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, ImageId::from(1i64));
        assert_eq!(results[0].caption.as_deref(), Some("a red car"));
        assert_eq!(results[0].filename, "1.jpg");
        assert!((results[0].similarity - 0.995_037).abs() < 1e-4);
        assert_eq!(results[1].id, ImageId::from(3i64));
        assert!((results[1].similarity - 0.943_858).abs() < 1e-4);
    }

    #[tokio::test]
    async fn test_search_empty_store() {
        let results = engine().search("red car", None, None).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_threshold_above_every_score() {
        let engine = engine();
        seed(&engine).await;
        assert!(engine
            .search("red car", None, Some(0.999))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_search_rejects_bad_input() {
        let engine = engine();
        for (query, threshold) in [("", None), ("   ", None), ("red car", Some(1.5))] {
            let err = engine.search(query, None, threshold).await.unwrap_err();
            assert!(matches!(err, SnapError::Validation(_)));
        }
        assert!(engine.search("red car", Some(0), None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upsert_normalizes_and_validates() {
        let engine = engine();
        engine
            .upsert_embedding(ImageId::from(9i64), None, emb(&[10.0, 0.0, 0.0]), "9.jpg")
            .await
            .unwrap();
        let results = engine.search("a red car", None, Some(0.99)).await.unwrap();
        assert!((results[0].similarity - 1.0).abs() < 1e-6);

        let err = engine
            .upsert_embedding(ImageId::from(10i64), None, emb(&[1.0, 0.0]), "10.jpg")
            .await
            .unwrap_err();
        assert!(matches!(err, SnapError::Validation(_)));
        assert_eq!(engine.stats().await.unwrap().count, 1);
    }

    #[tokio::test]
    async fn test_deleted_id_never_returned() {
        let engine = engine();
        seed(&engine).await;
        engine.delete_embedding(&ImageId::from(1i64)).await.unwrap();
        engine.delete_embedding(&ImageId::from(1i64)).await.unwrap();
        engine.delete_embedding(&ImageId::from(404i64)).await.unwrap();

        let results = engine.search("a red car", None, Some(-1.0)).await.unwrap();
        assert!(results.iter().all(|r| r.id != ImageId::from(1i64)));
        assert_eq!(engine.stats().await.unwrap().count, 2);
    }

    #[tokio::test]
    async fn test_index_caption() {
        let engine = engine();
        engine
            .index_caption(ImageId::from(2i64), " a blue boat ", "2.jpg")
            .await
            .unwrap();

        let results = engine.search("boat", None, None).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].caption.as_deref(), Some("a blue boat"));

        let err = engine
            .index_caption(ImageId::from(3i64), "  ", "3.jpg")
            .await
            .unwrap_err();
        assert!(matches!(err, SnapError::Validation(_)));
    }

    #[tokio::test]
    async fn test_live_strategy_matches_indexed_ranking() {
        let live = full_engine(SearchStrategy::Live);
        let indexed = full_engine(SearchStrategy::Indexed);
        seed(&indexed).await;

        let from_catalog = live.search("red car", Some(2), Some(0.3)).await.unwrap();
        let from_index = indexed.search("red car", Some(2), Some(0.3)).await.unwrap();

        assert_eq!(from_catalog, from_index);
        assert!(live.cache_stats().await.writes >= 3);
    }

    #[tokio::test]
    async fn test_multimodal_merges_best_scores() {
        let engine = full_engine(SearchStrategy::Indexed);
        seed(&engine).await;
        engine
            .index_image(ImageId::from(1i64), "1.jpg", b"car-pixels")
            .await
            .unwrap();
        engine
            .index_image(ImageId::from(3i64), "3.jpg", b"street-pixels")
            .await
            .unwrap();

        let results = engine.multimodal_search("red car", None).await.unwrap();
        let ids: Vec<_> = results.iter().map(|r| r.id.clone()).collect();

        // Image 3: image score 1.0 beats caption score 0.94
        assert_eq!(ids, vec![ImageId::from(3i64), ImageId::from(1i64)]);
        assert!((results[0].similarity - 1.0).abs() < 1e-6);
        assert_eq!(results[0].caption, None);
        assert!((results[1].similarity - 0.995_037).abs() < 1e-4);
        assert_eq!(results[1].caption.as_deref(), Some("a red car"));
    }

    #[tokio::test]
    async fn test_multimodal_requires_image_index() {
        let err = engine().multimodal_search("red car", None).await.unwrap_err();
        assert!(matches!(err, SnapError::Unsupported(_)));
    }

    #[tokio::test]
    async fn test_backfill_and_status() {
        let engine = full_engine(SearchStrategy::Indexed);

        let before = engine.embedding_status().await.unwrap();
        assert!(!before.initialized);
        assert_eq!(before.total_images, 3);
        assert_eq!(before.caption_embeddings, 0);
        assert_eq!(before.image_embeddings, Some(0));

        let report = engine.backfill().await.unwrap();
        assert_eq!(
            report,
            BackfillReport {
                processed: 3,
                failed: 0,
                skipped: 0,
                total: 3
            }
        );

        let after = engine.embedding_status().await.unwrap();
        assert!(after.initialized);
        assert_eq!(after.caption_embeddings, 3);
        assert_eq!(after.image_embeddings, Some(3));

        // Rerunning overwrites rather than duplicating
        engine.backfill().await.unwrap();
        assert_eq!(engine.stats().await.unwrap().count, 3);
    }

    #[tokio::test]
    async fn test_backfill_counts_failures() {
        let catalog = FixtureCatalog::new(vec![
            image(1, Some("a red car")),
            image(2, Some("unknown caption")),
            image(3, None),
        ]);
        let engine = engine().with_catalog(Arc::new(catalog), Duration::from_secs(5));

        let report = engine.backfill().await.unwrap();
        assert_eq!(report.processed, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.total, 3);
    }

    #[tokio::test]
    async fn test_catalog_outage() {
        let engine = engine().with_catalog(
            Arc::new(FixtureCatalog::unavailable()),
            Duration::from_secs(5),
        );
        assert!(matches!(
            engine.embedding_status().await.unwrap_err(),
            SnapError::UpstreamUnavailable(_)
        ));
        assert!(matches!(
            engine.backfill().await.unwrap_err(),
            SnapError::UpstreamUnavailable(_)
        ));
        assert!(matches!(
            self::engine().embedding_status().await.unwrap_err(),
            SnapError::Unsupported(_)
        ));
    }

    #[tokio::test]
    async fn test_stale_entries_per_strategy() {
        let catalog = Arc::new(catalog());
        let store: Arc<dyn VectorStore> = Arc::new(InMemoryStore::new("image_captions", 3));
        let indexed = SearchEngine::new(text_embedder(), store.clone(), SearchConfig::default())
            .with_catalog(catalog.clone(), Duration::from_secs(5));
        let live = SearchEngine::new(
            text_embedder(),
            store,
            SearchConfig {
                strategy: SearchStrategy::Live,
                ..Default::default()
            },
        )
        .with_catalog(catalog.clone(), Duration::from_secs(5));
        seed(&indexed).await;

        // The catalog forgets image 1 without telling the index
        catalog.set_images(vec![image(2, Some("a blue boat")), image(3, Some("a red car on a street"))]);

        let from_index = indexed.search("red car", None, None).await.unwrap();
        assert_eq!(from_index[0].id, ImageId::from(1i64));

        let from_catalog = live.search("red car", None, None).await.unwrap();
        let ids: Vec<_> = from_catalog.iter().map(|r| r.id.clone()).collect();
        assert_eq!(ids, vec![ImageId::from(3i64)]);
    }

    #[tokio::test]
    async fn test_generate_caption() {
        let engine = full_engine(SearchStrategy::Indexed);
        assert_eq!(engine.generate_caption(b"img", None).await.unwrap(), "a photo");
        assert_eq!(
            engine.generate_caption(b"img", Some("  ")).await.unwrap(),
            "a photo"
        );
        assert_eq!(
            engine.generate_caption(b"img", Some("short")).await.unwrap(),
            "a photo (short)"
        );

        let failing = self::engine().with_captioner(Arc::new(FixtureCaptioner::failing()));
        assert!(matches!(
            failing.generate_caption(b"img", None).await.unwrap_err(),
            SnapError::Captioning(_)
        ));
        assert!(matches!(
            self::engine().generate_caption(b"img", None).await.unwrap_err(),
            SnapError::Unsupported(_)
        ));
    }

    #[tokio::test]
    async fn test_from_config_with_memory_store() {
        let mut config = AppConfig::default();
        config.store.backend = snapseek_core::StoreBackend::Memory;
        config.embedding.provider = snapseek_core::EmbeddingProvider::Hashing;
        config.embedding.dimension = 64;

        let engine = SearchEngine::from_config(&config).await.unwrap();
        engine
            .index_caption(ImageId::from(1i64), "a red car", "1.jpg")
            .await
            .unwrap();
        let results = engine.search("red car", None, None).await.unwrap();
        assert_eq!(results[0].id, ImageId::from(1i64));
        assert!(!engine.has_image_index());
        assert!(!engine.has_catalog());
    }
}
