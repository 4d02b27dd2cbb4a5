//! SnapSeek API - HTTP server
//!
//! Exposes caption generation, embedding indexing and semantic image
//! search over a JSON API, with an OpenAPI document served by Swagger UI.
//!
//! Author: hephaex@gmail.com

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    routing::get,
    Router,
};
use snapseek_core::ServerConfig;
use state::AppState;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use handlers::{captions, embeddings, health, search};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        health::readiness_check,
        search::search_handler,
        search::multimodal_search_handler,
        captions::caption_handler,
        embeddings::save_embedding,
        embeddings::delete_embedding,
        embeddings::embedding_stats,
        embeddings::embedding_status,
        embeddings::save_image_embedding,
        embeddings::backfill,
    ),
    components(schemas(
        error::ApiError,
        health::HealthResponse,
        health::BuildInfo,
        health::ReadinessResponse,
        health::ReadinessChecks,
        search::SearchRequest,
        search::MultimodalSearchRequest,
        search::SearchHit,
        search::SearchResponse,
        captions::CaptionRequest,
        captions::CaptionResponse,
        embeddings::SaveEmbeddingRequest,
        embeddings::SaveImageEmbeddingRequest,
        embeddings::WriteResponse,
        embeddings::StatsResponse,
        embeddings::StatusResponse,
        embeddings::BackfillResponse,
    )),
    tags(
        (name = "health", description = "Liveness and readiness probes"),
        (name = "search", description = "Semantic image search"),
        (name = "captions", description = "Caption generation"),
        (name = "embeddings", description = "Embedding index maintenance")
    )
)]
pub struct ApiDoc;

/// Build the full application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let server = &state.config.server;

    let mut app = Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(health::metrics))
        .nest("/api/v1", routes::api_routes())
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(DefaultBodyLimit::max(server.max_body_size))
        .layer(TimeoutLayer::new(Duration::from_secs(
            server.request_timeout_secs,
        )))
        // Outside the timeout so timed-out requests are counted too
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::metrics_middleware,
        ))
        .layer(TraceLayer::new_for_http());

    if server.cors_enabled {
        app = app.layer(cors_layer(server));
    }

    app.with_state(state)
}

fn cors_layer(server: &ServerConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE]);

    if server.cors_origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = server
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

/// Router over in-memory stores and deterministic collaborators.
///
/// Text fixtures: `red car`, `a red car`, `a blue boat`,
/// `a red car on a street`, `boat`. Image fixtures (base64 of
/// `car-pixels`, `boat-pixels`, `street-pixels`) back catalog images 1-3.
#[cfg(feature = "test-utils")]
pub fn create_router_for_testing() -> Router {
    use snapseek_core::{AppConfig, CatalogImage, ImageId};
    use snapseek_search::testing::{FixtureCaptioner, FixtureCatalog, FixtureEmbedder};
    use snapseek_search::SearchEngine;
    use snapseek_vector::InMemoryStore;

    let config = AppConfig::default();

    let text = FixtureEmbedder::new(3)
        .named("fixture-text")
        .with("red car", vec![1.0, 0.1, 0.0])
        .with("a red car", vec![1.0, 0.0, 0.0])
        .with("a blue boat", vec![0.0, 1.0, 0.0])
        .with("a red car on a street", vec![0.9, 0.0, 0.3])
        .with("boat", vec![0.0, 1.0, 0.05]);
    let clip = FixtureEmbedder::new(2)
        .named("fixture-clip")
        .with("red car", vec![1.0, 0.0])
        .with("boat", vec![0.0, 1.0])
        .with_image(b"car-pixels".to_vec(), vec![0.8, 0.6])
        .with_image(b"boat-pixels".to_vec(), vec![0.1, 1.0])
        .with_image(b"street-pixels".to_vec(), vec![1.0, 0.0]);

    let image = |id: i64, caption: &str| CatalogImage {
        id: ImageId::from(id),
        filename: format!("{id}.jpg"),
        caption: Some(caption.to_string()),
    };
    let catalog = FixtureCatalog::new(vec![
        image(1, "a red car"),
        image(2, "a blue boat"),
        image(3, "a red car on a street"),
    ])
    .with_file("1.jpg", b"car-pixels".to_vec())
    .with_file("2.jpg", b"boat-pixels".to_vec())
    .with_file("3.jpg", b"street-pixels".to_vec());

    let engine = SearchEngine::new(
        Arc::new(text),
        Arc::new(InMemoryStore::new(&config.store.caption_collection, 3)),
        config.search.clone(),
    )
    .with_image_index(
        Arc::new(clip),
        Arc::new(InMemoryStore::new(&config.store.image_collection, 2)),
    )
    .with_captioner(Arc::new(FixtureCaptioner::new("A red car parked on a street")))
    .with_catalog(Arc::new(catalog), config.catalog.timeout());

    create_router(Arc::new(AppState::new(config, Arc::new(engine))))
}
