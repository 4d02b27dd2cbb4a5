//! Application state management
//!
//! Author: hephaex@gmail.com

use serde::Serialize;
use snapseek_core::AppConfig;
use snapseek_search::SearchEngine;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

/// Per-endpoint request statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct EndpointMetrics {
    /// Responses by HTTP status code
    pub status_counts: BTreeMap<u16, u64>,
    pub latency_count: u64,
    pub total_latency_us: u64,
    pub min_latency_us: u64,
    pub max_latency_us: u64,
}

impl EndpointMetrics {
    fn record(&mut self, status: u16, latency_us: u64) {
        *self.status_counts.entry(status).or_insert(0) += 1;

        if self.latency_count == 0 || latency_us < self.min_latency_us {
            self.min_latency_us = latency_us;
        }
        self.max_latency_us = self.max_latency_us.max(latency_us);
        self.latency_count += 1;
        self.total_latency_us += latency_us;
    }

    /// Mean latency in milliseconds
    pub fn avg_latency_ms(&self) -> f64 {
        if self.latency_count == 0 {
            return 0.0;
        }
        self.total_latency_us as f64 / self.latency_count as f64 / 1000.0
    }
}

/// Application state shared across handlers
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Search orchestrator
    pub engine: Arc<SearchEngine>,
    /// Server start time
    pub start_time: Instant,
    /// Request counter
    pub request_count: AtomicU64,
    /// Ready status
    pub is_ready: AtomicBool,
    /// Request statistics keyed by normalized endpoint
    pub metrics: RwLock<HashMap<String, EndpointMetrics>>,
}

impl AppState {
    /// Create new application state with config and a built engine
    pub fn new(config: AppConfig, engine: Arc<SearchEngine>) -> Self {
        Self {
            config,
            engine,
            start_time: Instant::now(),
            request_count: AtomicU64::new(0),
            is_ready: AtomicBool::new(true),
            metrics: RwLock::new(HashMap::new()),
        }
    }

    /// Increment request counter
    pub fn increment_requests(&self) -> u64 {
        self.request_count.fetch_add(1, Ordering::SeqCst)
    }

    /// Get total request count
    pub fn get_request_count(&self) -> u64 {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Check if service is ready
    pub fn is_ready(&self) -> bool {
        self.is_ready.load(Ordering::SeqCst)
    }

    /// Set ready status
    pub fn set_ready(&self, ready: bool) {
        self.is_ready.store(ready, Ordering::SeqCst);
    }

    /// Record one finished request
    pub async fn record_request(&self, endpoint: String, status: u16, latency_us: u64) {
        self.metrics
            .write()
            .await
            .entry(endpoint)
            .or_default()
            .record(status, latency_us);
    }

    /// Snapshot of the per-endpoint statistics
    pub async fn endpoint_metrics(&self) -> BTreeMap<String, EndpointMetrics> {
        self.metrics
            .read()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snapseek_core::SearchConfig;
    use snapseek_search::testing::FixtureEmbedder;
    use snapseek_vector::InMemoryStore;

    fn state() -> AppState {
        let engine = SearchEngine::new(
            Arc::new(FixtureEmbedder::new(3)),
            Arc::new(InMemoryStore::new("image_captions", 3)),
            SearchConfig::default(),
        );
        AppState::new(AppConfig::default(), Arc::new(engine))
    }

    #[test]
    fn test_request_counter() {
        let state = state();
        assert_eq!(state.increment_requests(), 0);
        assert_eq!(state.increment_requests(), 1);
        assert_eq!(state.get_request_count(), 2);
    }

    #[test]
    fn test_ready_flag() {
        let state = state();
        assert!(state.is_ready());
        state.set_ready(false);
        assert!(!state.is_ready());
    }

    #[tokio::test]
    async fn test_record_request() {
        let state = state();
        state.record_request("/api/v1/search".to_string(), 200, 3_000).await;
        state.record_request("/api/v1/search".to_string(), 200, 1_000).await;
        state.record_request("/api/v1/search".to_string(), 400, 2_000).await;

        let metrics = state.endpoint_metrics().await;
        let search = &metrics["/api/v1/search"];
        assert_eq!(search.status_counts[&200], 2);
        assert_eq!(search.status_counts[&400], 1);
        assert_eq!(search.min_latency_us, 1_000);
        assert_eq!(search.max_latency_us, 3_000);
        assert!((search.avg_latency_ms() - 2.0).abs() < 1e-9);
    }
}
