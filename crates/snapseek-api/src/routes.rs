//! API route definitions
//!
//! Author: hephaex@gmail.com

use crate::handlers::{captions, embeddings, search};
use crate::state::AppState;
use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;

/// Create API v1 routes
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        // Search endpoints
        .route("/search", post(search::search_handler))
        .route("/search/multimodal", post(search::multimodal_search_handler))
        // Caption endpoints
        .route("/captions", post(captions::caption_handler))
        // Embedding endpoints
        .route("/embeddings", post(embeddings::save_embedding))
        .route("/embeddings/stats", get(embeddings::embedding_stats))
        .route("/embeddings/status", get(embeddings::embedding_status))
        .route("/embeddings/:id", delete(embeddings::delete_embedding))
        .route("/images/embeddings", post(embeddings::save_image_embedding))
        .route("/backfill", post(embeddings::backfill))
}
