//! Caption generation handler
//!
//! Author: hephaex@gmail.com

use crate::error::AppError;
use crate::handlers::decode_image;
use crate::state::AppState;
use axum::{extract::State, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

/// Caption request body
#[derive(Debug, Deserialize, ToSchema)]
pub struct CaptionRequest {
    /// Base64-encoded image, optionally as a `data:` URL
    pub image: Option<String>,

    /// Instruction for the vision model; a descriptive default applies
    #[schema(example = "Describe this photo in one sentence.")]
    pub prompt: Option<String>,
}

/// Caption response body
#[derive(Debug, Serialize, ToSchema)]
pub struct CaptionResponse {
    #[schema(example = "A red car parked on a quiet street.")]
    pub caption: String,
}

/// Describe an image with the configured vision model
#[utoipa::path(
    post,
    path = "/api/v1/captions",
    tag = "captions",
    request_body = CaptionRequest,
    responses(
        (status = 200, description = "Caption generated", body = CaptionResponse),
        (status = 400, description = "Missing or undecodable image", body = crate::error::ApiError),
        (status = 502, description = "Vision model failed", body = crate::error::ApiError)
    )
)]
pub async fn caption_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CaptionRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.increment_requests();

    let encoded = req
        .image
        .ok_or_else(|| AppError::BadRequest("No image provided".to_string()))?;
    let image = decode_image(&encoded)?;

    let caption = state
        .engine
        .generate_caption(&image, req.prompt.as_deref())
        .await?;

    Ok(Json(CaptionResponse { caption }))
}
