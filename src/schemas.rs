use moka::future::Cache;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{OpenApi, ToSchema};

use crate::auth::SessionKeys;
use crate::config::AppConfig;
use crate::jobs::DetectionQueue;

/// Application state shared across handlers. Constructed once at startup and
/// cloned into every handler; there are no ambient globals.
#[derive(Clone)]
pub struct AppState {
    /// Database connection
    pub db: DatabaseConnection,
    /// Runtime configuration (directories, detection policy)
    pub config: Arc<AppConfig>,
    /// Session token signing/verification keys
    pub sessions: SessionKeys,
    /// Token ids revoked by logout; entries expire with the token lifetime
    pub revoked_sessions: Cache<String, ()>,
    /// Queue feeding the detection worker pool
    pub jobs: DetectionQueue,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("db", &self.db)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// API response wrapper
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ApiResponse<T> {
    /// Response data
    pub data: T,
    /// Response message
    pub message: String,
    /// Success status
    pub success: bool,
}

/// Error response
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,
    /// Error code
    pub code: String,
    /// Success status (always false for errors)
    pub success: bool,
}

/// Health check response
#[derive(Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Service status
    pub status: String,
    /// Service version
    pub version: String,
    /// Database connection status
    pub database: String,
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::health::health_check,
        crate::handlers::auth::register,
        crate::handlers::auth::login,
        crate::handlers::auth::logout,
        crate::handlers::entries::list_entries,
        crate::handlers::entries::admin_dashboard,
        crate::handlers::entries::upload_image,
        crate::handlers::entries::mark_viewed,
        crate::handlers::entries::delete_entry,
        crate::handlers::files::serve_annotated,
    ),
    components(
        schemas(
            ApiResponse<crate::handlers::auth::UserResponse>,
            ApiResponse<crate::handlers::auth::LoginResponse>,
            ApiResponse<crate::handlers::entries::EntryResponse>,
            ApiResponse<Vec<crate::handlers::entries::EntryResponse>>,
            ApiResponse<crate::handlers::entries::AdminDashboardResponse>,
            ApiResponse<String>,
            ErrorResponse,
            HealthResponse,
            crate::handlers::auth::RegisterRequest,
            crate::handlers::auth::LoginRequest,
            crate::handlers::auth::UserResponse,
            crate::handlers::auth::LoginResponse,
            crate::handlers::entries::EntryResponse,
            crate::handlers::entries::AdminDashboardResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "auth", description = "Registration, login, and logout"),
        (name = "entries", description = "Image entry upload and review endpoints"),
        (name = "files", description = "Annotated image serving"),
    ),
    info(
        title = "Carscope API",
        description = "Vehicle detection gallery - uploads images, counts vehicles asynchronously, and lets admins review the results",
        version = "0.1.0",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    )
)]
pub struct ApiDoc;
