//! Health check handlers
//!
//! Author: hephaex@gmail.com

use crate::state::{AppState, EndpointMetrics};
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use snapseek_search::CacheStatsReport;
use std::collections::BTreeMap;
use std::sync::Arc;
use utoipa::ToSchema;

/// Health check response
#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub build_info: BuildInfo,
}

#[derive(Serialize, ToSchema)]
pub struct BuildInfo {
    pub name: String,
    pub rust_version: String,
}

/// Liveness probe - basic health check
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is alive", body = HealthResponse)
    )
)]
pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        build_info: BuildInfo {
            name: env!("CARGO_PKG_NAME").to_string(),
            rust_version: "1.75+".to_string(),
        },
    })
}

/// Readiness response
#[derive(Serialize, ToSchema)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub checks: ReadinessChecks,
}

#[derive(Serialize, ToSchema)]
pub struct ReadinessChecks {
    /// Caption collection answered a stats call
    pub caption_store: bool,
    /// `None` when no image index is configured
    pub image_store: Option<bool>,
    pub catalog_configured: bool,
}

/// Readiness probe - checks the embedding stores
#[utoipa::path(
    get,
    path = "/ready",
    tag = "health",
    responses(
        (status = 200, description = "Service is ready", body = ReadinessResponse),
        (status = 503, description = "Service not ready", body = ReadinessResponse)
    )
)]
pub async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let engine = &state.engine;

    let caption_store = engine.stats().await.is_ok();
    let image_store = if engine.has_image_index() {
        Some(matches!(engine.image_stats().await, Ok(Some(_))))
    } else {
        None
    };

    let checks = ReadinessChecks {
        caption_store,
        image_store,
        catalog_configured: engine.has_catalog(),
    };
    let ready = state.is_ready() && caption_store && image_store.unwrap_or(true);

    let response = ReadinessResponse { ready, checks };

    if ready {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

/// JSON metrics response
#[derive(Serialize)]
pub struct MetricsResponse {
    pub uptime_seconds: u64,
    pub total_requests: u64,
    pub requests_per_second: f64,
    pub caption_cache: CacheStatsReport,
    pub endpoints: BTreeMap<String, EndpointMetrics>,
}

/// Request and cache counters
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let uptime = state.uptime_secs();
    let total_requests = state.get_request_count();
    let rps = if uptime > 0 {
        total_requests as f64 / uptime as f64
    } else {
        0.0
    };

    Json(MetricsResponse {
        uptime_seconds: uptime,
        total_requests,
        requests_per_second: rps,
        caption_cache: state.engine.cache_stats().await,
        endpoints: state.endpoint_metrics().await,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use snapseek_core::{AppConfig, SearchConfig};
    use snapseek_search::testing::FixtureEmbedder;
    use snapseek_search::SearchEngine;
    use snapseek_vector::InMemoryStore;

    fn state() -> Arc<AppState> {
        let engine = SearchEngine::new(
            Arc::new(FixtureEmbedder::new(3)),
            Arc::new(InMemoryStore::new("image_captions", 3)),
            SearchConfig::default(),
        );
        Arc::new(AppState::new(AppConfig::default(), Arc::new(engine)))
    }

    #[tokio::test]
    async fn test_draining_server_is_not_ready() {
        let state = state();
        let response = readiness_check(State(state.clone())).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);

        state.set_ready(false);
        let response = readiness_check(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
