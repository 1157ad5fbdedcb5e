use anyhow::Result;
use moka::future::Cache;
use sea_orm::Database;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use detector::{FixedDetector, SidecarDetector, VehicleDetector};

use crate::auth::SessionKeys;
use crate::jobs::DetectionQueue;
use crate::schemas::AppState;

/// Runtime configuration for the workflow, read from the environment.
/// Secrets (the session signing key) are consumed during startup and are not
/// kept here.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Directory original uploads are stored under
    pub upload_dir: PathBuf,
    /// Directory annotated images are written to
    pub detection_dir: PathBuf,
    /// Model sidecar endpoint; when unset the fixed backend is used
    pub detector_endpoint: Option<String>,
    /// Vehicle count reported by the fixed backend
    pub detector_fixed_count: u32,
    /// Number of detection workers
    pub detection_workers: usize,
    /// Attempts per detection job before it is marked failed
    pub detection_attempts: u32,
    /// Upper bound on a single detection attempt
    pub detection_timeout: Duration,
    /// Session token lifetime
    pub session_ttl_minutes: i64,
}

impl AppConfig {
    /// Read configuration from the environment, falling back to development
    /// defaults.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            upload_dir: PathBuf::from(
                std::env::var("UPLOAD_DIR").unwrap_or_else(|_| "uploads".to_string()),
            ),
            detection_dir: PathBuf::from(
                std::env::var("DETECTION_DIR").unwrap_or_else(|_| "detections".to_string()),
            ),
            detector_endpoint: std::env::var("DETECTOR_ENDPOINT").ok(),
            detector_fixed_count: std::env::var("DETECTOR_FIXED_COUNT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
            detection_workers: std::env::var("DETECTION_WORKERS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
            detection_attempts: std::env::var("DETECTION_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3),
            detection_timeout: Duration::from_secs(
                std::env::var("DETECTION_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            ),
            session_ttl_minutes: std::env::var("SESSION_TTL_MINUTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1440),
        }
    }

    /// Build the detection backend this deployment is configured for.
    pub fn build_detector(&self) -> Result<Arc<dyn VehicleDetector>> {
        match &self.detector_endpoint {
            Some(endpoint) => {
                let sidecar = SidecarDetector::new(endpoint, self.detection_timeout)?;
                Ok(Arc::new(sidecar))
            }
            None => {
                tracing::warn!(
                    "DETECTOR_ENDPOINT is not set; using the fixed backend with count {}",
                    self.detector_fixed_count
                );
                Ok(Arc::new(FixedDetector::new(self.detector_fixed_count)))
            }
        }
    }
}

fn session_secret_from_env() -> String {
    std::env::var("SESSION_SECRET").unwrap_or_else(|_| {
        tracing::warn!("SESSION_SECRET is not set; using an insecure development key");
        "carscope-development-secret".to_string()
    })
}

/// Initialize application configuration and state
pub async fn initialize_app_state_with_url(database_url: &str) -> Result<AppState> {
    let config = Arc::new(AppConfig::from_env());

    // Connect to database
    tracing::info!("Connecting to database: {}", database_url);
    let db = Database::connect(database_url).await?;

    // Ensure the upload and detection directories exist
    std::fs::create_dir_all(&config.upload_dir)?;
    std::fs::create_dir_all(&config.detection_dir)?;

    let detector = config.build_detector()?;
    let jobs = DetectionQueue::start(db.clone(), detector, config.clone());

    let sessions = SessionKeys::new(&session_secret_from_env(), config.session_ttl_minutes);

    // Revoked token ids only need to outlive the tokens themselves
    let revoked_sessions = Cache::builder()
        .max_capacity(10_000)
        .time_to_live(Duration::from_secs(config.session_ttl_minutes as u64 * 60))
        .build();

    Ok(AppState {
        db,
        config,
        sessions,
        revoked_sessions,
        jobs,
    })
}
