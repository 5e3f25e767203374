//! Router configuration for the web server.

use axum::{extract::DefaultBodyLimit, routing::get, Router};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use super::handlers;
use super::AppState;

/// Create the main router with all routes.
pub fn create_router(state: AppState) -> Router {
    let uploads = ServeDir::new(&state.uploads_dir);
    let charts = ServeDir::new(&state.analysis_images_dir);

    Router::new()
        .route(
            "/",
            get(handlers::list_receipts).post(handlers::upload_receipt),
        )
        .route("/analysis", get(handlers::expense_analysis))
        // Stored images and rendered charts
        .nest_service("/uploads", uploads)
        .nest_service("/analysis_images", charts)
        .layer(DefaultBodyLimit::max(state.max_upload_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
