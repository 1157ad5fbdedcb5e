use crate::handlers::{
    auth::{login, logout, register},
    entries::{admin_dashboard, delete_entry, list_entries, mark_viewed, upload_image},
    files::serve_annotated,
    health::health_check,
};
use crate::schemas::{ApiDoc, AppState};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Largest accepted upload body (10MB)
const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Create application router with all routes and middleware
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Account routes
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", get(logout))
        // Gallery routes
        .route("/", get(list_entries))
        .route("/admin_dashboard", get(admin_dashboard))
        .route("/upload", post(upload_image))
        .route("/mark_viewed/:image_id", post(mark_viewed))
        .route("/delete/:image_id", post(delete_entry))
        // Annotated image serving
        .route("/uploads/:filename", get(serve_annotated))
        // Swagger UI
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Add middleware
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(TimeoutLayer::new(Duration::from_secs(30)))
                .layer(CorsLayer::permissive()),
        )
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}
