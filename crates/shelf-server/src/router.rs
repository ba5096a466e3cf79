use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use axum::Router;
use shelf_store::StorageService;
use tower_http::trace::TraceLayer;

use crate::config::body_limit;
use crate::handler;

/// Build the axum router with all Shelf endpoints.
pub fn build_router(storage: Arc<StorageService>) -> Router {
    let limit = match body_limit(storage.config().max_file_size) {
        Some(limit) => DefaultBodyLimit::max(limit),
        None => DefaultBodyLimit::disable(),
    };

    Router::new()
        .route("/", get(handler::index_handler))
        .route("/v1/health", get(handler::health_handler))
        .route("/files", get(handler::list_handler))
        .route("/upload", post(handler::upload_handler))
        .route("/download/:id", get(handler::download_handler))
        .route("/delete/:id", delete(handler::delete_handler))
        .layer(limit)
        .layer(TraceLayer::new_for_http())
        .with_state(storage)
}
