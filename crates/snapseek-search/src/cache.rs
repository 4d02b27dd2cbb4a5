//! Caching layer for live search
//!
//! Caption embeddings are the expensive part of ranking catalog images on
//! the fly. This cache keeps them keyed by embedder and caption text so
//! repeated queries only pay for captions they have not seen.
//!
//! Uses the moka crate for thread-safe, async-compatible LRU caching
//! with TTL support.
//!
//! Author: hephaex@gmail.com

use moka::future::Cache;
use serde::{Deserialize, Serialize};
use snapseek_core::{Embedder, EmbeddingVector, Result, SearchConfig};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Embedding Cache
// ============================================================================

/// Cache key: the same caption embeds differently per model
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct EmbeddingKey {
    embedder: String,
    text: String,
}

/// Cache for caption embeddings
///
/// Thread-safe and suitable for async contexts. Cloning shares the
/// underlying cache.
#[derive(Clone)]
pub struct EmbeddingCache {
    cache: Cache<EmbeddingKey, EmbeddingVector>,
    stats: Arc<CacheStats>,
}

impl EmbeddingCache {
    /// Create a new embedding cache
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .build();

        Self {
            cache,
            stats: Arc::new(CacheStats::new("caption_embedding")),
        }
    }

    /// Create from search configuration
    pub fn from_config(config: &SearchConfig) -> Self {
        Self::new(
            config.cache_max_capacity,
            Duration::from_secs(config.cache_ttl_secs),
        )
    }

    /// Get an embedding from cache
    pub async fn get(&self, embedder: &str, text: &str) -> Option<EmbeddingVector> {
        let key = EmbeddingKey {
            embedder: embedder.to_string(),
            text: text.to_string(),
        };
        let result = self.cache.get(&key).await;

        if result.is_some() {
            self.stats.record_hit();
        } else {
            self.stats.record_miss();
        }

        result
    }

    /// Store an embedding in cache
    pub async fn put(&self, embedder: &str, text: &str, embedding: EmbeddingVector) {
        let key = EmbeddingKey {
            embedder: embedder.to_string(),
            text: text.to_string(),
        };
        self.cache.insert(key, embedding).await;
        self.stats.record_write();
    }

    /// Return the cached embedding of `text`, computing it on a miss.
    ///
    /// Errors are not cached, so a failed call is retried by the next query.
    pub async fn get_or_embed(&self, embedder: &dyn Embedder, text: &str) -> Result<EmbeddingVector> {
        if let Some(embedding) = self.get(embedder.name(), text).await {
            return Ok(embedding);
        }

        let embedding = embedder.embed_text(text).await?;
        self.put(embedder.name(), text, embedding.clone()).await;
        Ok(embedding)
    }

    /// Get cache statistics
    pub fn stats(&self) -> Arc<CacheStats> {
        Arc::clone(&self.stats)
    }

    /// Counters plus the current number of cached embeddings
    pub async fn report(&self) -> CacheStatsReport {
        self.cache.run_pending_tasks().await;
        self.stats.report(self.cache.entry_count())
    }
}

// ============================================================================
// Cache Statistics
// ============================================================================

/// Statistics for cache performance monitoring
#[derive(Debug)]
pub struct CacheStats {
    /// Cache name for identification
    name: String,
    /// Total number of cache hits
    hits: AtomicU64,
    /// Total number of cache misses
    misses: AtomicU64,
    /// Total number of cache writes
    writes: AtomicU64,
}

impl CacheStats {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    /// Get total hits
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Get total misses
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Get total writes
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Get total requests (hits + misses)
    pub fn total_requests(&self) -> u64 {
        self.hits() + self.misses()
    }

    /// Calculate hit rate (0.0 - 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            0.0
        } else {
            self.hits() as f64 / total as f64
        }
    }

    /// Get a summary report
    pub fn report(&self, entries: u64) -> CacheStatsReport {
        CacheStatsReport {
            name: self.name.clone(),
            entries,
            hits: self.hits(),
            misses: self.misses(),
            writes: self.writes(),
            total_requests: self.total_requests(),
            hit_rate: self.hit_rate(),
        }
    }
}

/// Serializable cache statistics report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStatsReport {
    pub name: String,
    /// Embeddings currently held
    pub entries: u64,
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub total_requests: u64,
    /// Hit rate (0.0 - 1.0)
    pub hit_rate: f64,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use snapseek_core::SnapError;
    use std::sync::atomic::AtomicUsize;

    struct CountingEmbedder {
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Embedder for CountingEmbedder {
        async fn embed_text(&self, text: &str) -> Result<EmbeddingVector> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if text == "fail" {
                return Err(SnapError::UpstreamUnavailable("model down".to_string()));
            }
            EmbeddingVector::normalized(vec![text.len() as f32, 1.0])
        }

        fn dimension(&self) -> usize {
            2
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    fn cache() -> EmbeddingCache {
        EmbeddingCache::new(100, Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_embedding_cache_basic() {
        let cache = cache();
        assert!(cache.get("m", "a red car").await.is_none());

        let embedding = EmbeddingVector::new(vec![1.0, 0.0]);
        cache.put("m", "a red car", embedding.clone()).await;

        assert_eq!(cache.get("m", "a red car").await, Some(embedding));
        assert!(cache.get("other-model", "a red car").await.is_none());
    }

    #[tokio::test]
    async fn test_get_or_embed_computes_once() {
        let cache = cache();
        let embedder = CountingEmbedder {
            calls: AtomicUsize::new(0),
        };

        let first = cache.get_or_embed(&embedder, "boat").await.unwrap();
        let second = cache.get_or_embed(&embedder, "boat").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let cache = cache();
        let embedder = CountingEmbedder {
            calls: AtomicUsize::new(0),
        };

        assert!(cache.get_or_embed(&embedder, "fail").await.is_err());
        assert!(cache.get_or_embed(&embedder, "fail").await.is_err());
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cache_stats() {
        let cache = cache();

        cache.get("m", "miss").await;
        cache.put("m", "hit", EmbeddingVector::new(vec![1.0])).await;
        cache.get("m", "hit").await;
        cache.get("m", "hit").await;

        let report = cache.report().await;
        assert_eq!(report.name, "caption_embedding");
        assert_eq!(report.entries, 1);
        assert_eq!(report.hits, 2);
        assert_eq!(report.misses, 1);
        assert_eq!(report.writes, 1);
        assert!((report.hit_rate - 2.0 / 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_report_counts_entries_per_model() {
        let cache = cache();
        cache.put("m", "x", EmbeddingVector::new(vec![1.0])).await;
        cache.put("m", "x", EmbeddingVector::new(vec![1.0])).await;
        cache.put("other", "x", EmbeddingVector::new(vec![1.0])).await;

        let report = cache.report().await;
        assert_eq!(report.entries, 2);
        assert_eq!(report.writes, 3);
    }
}
