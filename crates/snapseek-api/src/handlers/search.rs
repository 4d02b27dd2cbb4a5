//! Search handlers
//!
//! Author: hephaex@gmail.com

use crate::error::AppError;
use crate::state::AppState;
use axum::{extract::State, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use snapseek_core::{ImageId, QueryResult};
use std::sync::Arc;
use std::time::Instant;
use utoipa::ToSchema;

/// Caption search request
#[derive(Debug, Deserialize, ToSchema)]
pub struct SearchRequest {
    /// Free-text query
    #[serde(default)]
    #[schema(example = "red car")]
    pub query: String,

    /// Maximum number of results (defaults to 20)
    #[schema(example = 20)]
    pub top_k: Option<usize>,

    /// Minimum similarity, exclusive (defaults to 0.3)
    #[schema(example = 0.3)]
    pub threshold: Option<f32>,
}

/// Multimodal search request
#[derive(Debug, Deserialize, ToSchema)]
pub struct MultimodalSearchRequest {
    #[serde(default)]
    #[schema(example = "red car")]
    pub query: String,

    /// Minimum similarity, exclusive (defaults to 0.2)
    #[schema(example = 0.2)]
    pub threshold: Option<f32>,
}

/// One ranked image
#[derive(Debug, Serialize, ToSchema)]
pub struct SearchHit {
    #[schema(value_type = String, example = "42")]
    pub id: ImageId,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = "A red car parked on a quiet street")]
    pub caption: Option<String>,

    #[schema(example = "20240501_red_car.jpg")]
    pub filename: String,

    #[schema(example = 0.87)]
    pub similarity: f32,
}

impl From<QueryResult> for SearchHit {
    fn from(result: QueryResult) -> Self {
        Self {
            id: result.id,
            caption: result.caption,
            filename: result.filename,
            similarity: result.similarity,
        }
    }
}

/// Search response body
#[derive(Debug, Serialize, ToSchema)]
pub struct SearchResponse {
    /// Best match first
    pub results: Vec<SearchHit>,

    #[schema(example = 12)]
    pub processing_time_ms: u64,
}

impl SearchResponse {
    fn new(results: Vec<QueryResult>, start: Instant) -> Self {
        Self {
            results: results.into_iter().map(SearchHit::from).collect(),
            processing_time_ms: start.elapsed().as_millis() as u64,
        }
    }
}

/// Rank images by caption similarity
#[utoipa::path(
    post,
    path = "/api/v1/search",
    tag = "search",
    request_body = SearchRequest,
    responses(
        (status = 200, description = "Ranked results", body = SearchResponse),
        (status = 400, description = "Empty query or invalid threshold", body = crate::error::ApiError),
        (status = 502, description = "Catalog or embedding model unavailable", body = crate::error::ApiError)
    )
)]
pub async fn search_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SearchRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.increment_requests();
    let start = Instant::now();

    let results = state
        .engine
        .search(&req.query, req.top_k, req.threshold)
        .await?;

    tracing::info!(results = results.len(), "search served");
    Ok(Json(SearchResponse::new(results, start)))
}

/// Rank images by image and caption similarity together
#[utoipa::path(
    post,
    path = "/api/v1/search/multimodal",
    tag = "search",
    request_body = MultimodalSearchRequest,
    responses(
        (status = 200, description = "Merged ranked results", body = SearchResponse),
        (status = 400, description = "Empty query or invalid threshold", body = crate::error::ApiError),
        (status = 501, description = "No image index configured", body = crate::error::ApiError)
    )
)]
pub async fn multimodal_search_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<MultimodalSearchRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.increment_requests();
    let start = Instant::now();

    let results = state
        .engine
        .multimodal_search(&req.query, req.threshold)
        .await?;

    tracing::info!(results = results.len(), "multimodal search served");
    Ok(Json(SearchResponse::new(results, start)))
}
