//! Per-route request metrics
//!
//! Every finished request is recorded under the route template it matched,
//! so deletes of different images share `/api/v1/embeddings/:id`. The
//! write happens before the response leaves the middleware, so a sample
//! is never lost to shutdown.
//!
//! Author: hephaex@gmail.com

use crate::state::AppState;
use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use std::time::Instant;

/// Label for requests no route matched
pub const UNMATCHED_ROUTE: &str = "unmatched";

/// Record status and latency for each request
pub async fn metrics_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| UNMATCHED_ROUTE.to_string());

    let start = Instant::now();
    let response = next.run(request).await;
    let latency_us = start.elapsed().as_micros() as u64;

    state
        .record_request(route, response.status().as_u16(), latency_us)
        .await;

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        routing::{delete, get},
        Router,
    };
    use snapseek_core::{AppConfig, SearchConfig};
    use snapseek_search::testing::FixtureEmbedder;
    use snapseek_search::SearchEngine;
    use snapseek_vector::InMemoryStore;
    use tower::ServiceExt;

    fn state() -> Arc<AppState> {
        let engine = SearchEngine::new(
            Arc::new(FixtureEmbedder::new(3)),
            Arc::new(InMemoryStore::new("image_captions", 3)),
            SearchConfig::default(),
        );
        Arc::new(AppState::new(AppConfig::default(), Arc::new(engine)))
    }

    fn app(state: Arc<AppState>) -> Router {
        let api = Router::new()
            .route("/embeddings/stats", get(|| async { "stats" }))
            .route(
                "/embeddings/:id",
                delete(|| async { StatusCode::NO_CONTENT }),
            );

        Router::new()
            .nest("/api/v1", api)
            .layer(axum::middleware::from_fn_with_state(
                state.clone(),
                metrics_middleware,
            ))
            .with_state(state)
    }

    async fn call(app: &Router, method: &str, uri: &str) -> StatusCode {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        app.clone().oneshot(request).await.unwrap().status()
    }

    #[tokio::test]
    async fn test_records_route_template() {
        let state = state();
        let app = app(state.clone());

        call(&app, "DELETE", "/api/v1/embeddings/1").await;
        call(&app, "DELETE", "/api/v1/embeddings/holiday-01").await;
        call(&app, "GET", "/api/v1/embeddings/stats").await;

        let metrics = state.endpoint_metrics().await;
        assert_eq!(metrics["/api/v1/embeddings/:id"].status_counts[&204], 2);
        assert_eq!(metrics["/api/v1/embeddings/stats"].status_counts[&200], 1);
        assert_eq!(metrics.len(), 2);
    }

    #[tokio::test]
    async fn test_records_before_response_returns() {
        let state = state();
        let app = app(state.clone());

        assert_eq!(call(&app, "GET", "/nowhere").await, StatusCode::NOT_FOUND);

        let metrics = state.endpoint_metrics().await;
        let unmatched = &metrics[UNMATCHED_ROUTE];
        assert_eq!(unmatched.status_counts[&404], 1);
        assert_eq!(unmatched.latency_count, 1);
    }
}
