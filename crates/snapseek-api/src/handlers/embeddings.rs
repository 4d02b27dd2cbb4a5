//! Embedding index handlers
//!
//! Writing, deleting and inspecting caption and image embeddings, plus
//! reconciliation against the catalog.
//!
//! Author: hephaex@gmail.com

use crate::error::AppError;
use crate::handlers::decode_image;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use snapseek_core::{ImageId, StoreStats};
use snapseek_search::{BackfillReport, EmbeddingStatus};
use std::sync::Arc;
use utoipa::ToSchema;

/// Caption embedding request
#[derive(Debug, Deserialize, ToSchema)]
pub struct SaveEmbeddingRequest {
    /// Catalog image id (integer or string)
    #[schema(value_type = Option<String>, example = "42")]
    pub image_id: Option<ImageId>,

    /// Caption to embed
    #[schema(example = "A red car parked on a quiet street")]
    pub caption: Option<String>,

    /// Catalog filename
    #[schema(example = "20240501_red_car.jpg")]
    pub filename: Option<String>,
}

/// Image embedding request
#[derive(Debug, Deserialize, ToSchema)]
pub struct SaveImageEmbeddingRequest {
    #[schema(value_type = Option<String>, example = "42")]
    pub image_id: Option<ImageId>,

    #[schema(example = "20240501_red_car.jpg")]
    pub filename: Option<String>,

    /// Base64-encoded image bytes
    pub image: Option<String>,
}

/// Acknowledgement for write operations
#[derive(Debug, Serialize, ToSchema)]
pub struct WriteResponse {
    pub success: bool,
    #[schema(example = "Embedding saved for image 42")]
    pub message: String,
}

/// Collection statistics
#[derive(Debug, Serialize, ToSchema)]
pub struct StatsResponse {
    #[schema(example = 128)]
    pub count: u64,
    #[schema(example = "image_captions")]
    pub name: String,
}

impl From<StoreStats> for StatsResponse {
    fn from(stats: StoreStats) -> Self {
        Self {
            count: stats.count,
            name: stats.name,
        }
    }
}

/// Index coverage relative to the catalog
#[derive(Debug, Serialize, ToSchema)]
pub struct StatusResponse {
    pub initialized: bool,
    pub total_images: u64,
    pub caption_embeddings: u64,
    /// Absent when no image index is configured
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_embeddings: Option<u64>,
}

impl From<EmbeddingStatus> for StatusResponse {
    fn from(status: EmbeddingStatus) -> Self {
        Self {
            initialized: status.initialized,
            total_images: status.total_images,
            caption_embeddings: status.caption_embeddings,
            image_embeddings: status.image_embeddings,
        }
    }
}

/// Backfill outcome
#[derive(Debug, Serialize, ToSchema)]
pub struct BackfillResponse {
    pub success: bool,
    pub processed: u64,
    pub failed: u64,
    pub skipped: u64,
    pub total: u64,
}

impl From<BackfillReport> for BackfillResponse {
    fn from(report: BackfillReport) -> Self {
        Self {
            success: report.failed == 0,
            processed: report.processed,
            failed: report.failed,
            skipped: report.skipped,
            total: report.total,
        }
    }
}

fn required<T>(value: Option<T>) -> Result<T, AppError> {
    value.ok_or_else(|| AppError::BadRequest("Missing required fields".to_string()))
}

/// Embed a caption and store it
#[utoipa::path(
    post,
    path = "/api/v1/embeddings",
    tag = "embeddings",
    request_body = SaveEmbeddingRequest,
    responses(
        (status = 200, description = "Embedding saved", body = WriteResponse),
        (status = 400, description = "Missing or invalid fields", body = crate::error::ApiError),
        (status = 502, description = "Embedding model unavailable", body = crate::error::ApiError)
    )
)]
pub async fn save_embedding(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SaveEmbeddingRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.increment_requests();

    let id = required(req.image_id)?;
    let caption = required(req.caption)?;
    let filename = required(req.filename)?;

    state
        .engine
        .index_caption(id.clone(), &caption, filename)
        .await?;

    Ok(Json(WriteResponse {
        success: true,
        message: format!("Embedding saved for image {id}"),
    }))
}

/// Remove an image from every index. Unknown ids succeed.
#[utoipa::path(
    delete,
    path = "/api/v1/embeddings/{id}",
    tag = "embeddings",
    params(("id" = String, Path, description = "Image id")),
    responses(
        (status = 200, description = "Embedding removed", body = WriteResponse),
        (status = 400, description = "Invalid id", body = crate::error::ApiError)
    )
)]
pub async fn delete_embedding(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    state.increment_requests();

    let id = ImageId::parse(&id)?;
    state.engine.delete_embedding(&id).await?;

    Ok(Json(WriteResponse {
        success: true,
        message: format!("Embedding deleted for image {id}"),
    }))
}

/// Caption collection statistics
#[utoipa::path(
    get,
    path = "/api/v1/embeddings/stats",
    tag = "embeddings",
    responses(
        (status = 200, description = "Collection statistics", body = StatsResponse)
    )
)]
pub async fn embedding_stats(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    state.increment_requests();

    let stats = state.engine.stats().await?;
    Ok(Json(StatsResponse::from(stats)))
}

/// Compare stored embeddings with the catalog
#[utoipa::path(
    get,
    path = "/api/v1/embeddings/status",
    tag = "embeddings",
    responses(
        (status = 200, description = "Index coverage", body = StatusResponse),
        (status = 501, description = "No catalog configured", body = crate::error::ApiError),
        (status = 502, description = "Catalog unavailable", body = crate::error::ApiError)
    )
)]
pub async fn embedding_status(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    state.increment_requests();

    let status = state.engine.embedding_status().await?;
    Ok(Json(StatusResponse::from(status)))
}

/// Embed image bytes into the image collection
#[utoipa::path(
    post,
    path = "/api/v1/images/embeddings",
    tag = "embeddings",
    request_body = SaveImageEmbeddingRequest,
    responses(
        (status = 200, description = "Image embedding saved", body = WriteResponse),
        (status = 400, description = "Missing or invalid fields", body = crate::error::ApiError),
        (status = 501, description = "No image index configured", body = crate::error::ApiError)
    )
)]
pub async fn save_image_embedding(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SaveImageEmbeddingRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.increment_requests();

    let id = required(req.image_id)?;
    let filename = required(req.filename)?;
    let image = decode_image(&required(req.image)?)?;

    state
        .engine
        .index_image(id.clone(), filename, &image)
        .await?;

    Ok(Json(WriteResponse {
        success: true,
        message: format!("Image embedding saved for image {id}"),
    }))
}

/// Embed every catalog image
#[utoipa::path(
    post,
    path = "/api/v1/backfill",
    tag = "embeddings",
    responses(
        (status = 200, description = "Backfill finished", body = BackfillResponse),
        (status = 501, description = "No catalog configured", body = crate::error::ApiError),
        (status = 502, description = "Catalog unavailable", body = crate::error::ApiError)
    )
)]
pub async fn backfill(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    state.increment_requests();

    let report = state.engine.backfill().await?;
    Ok(Json(BackfillResponse::from(report)))
}
