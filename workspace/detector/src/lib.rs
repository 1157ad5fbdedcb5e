//! Vehicle detection behind a single trait.
//!
//! The pretrained model itself is an external collaborator: the production
//! backend ships every image to a model sidecar over HTTP and only renders
//! the returned boxes locally. The fixed backend exists for development and
//! tests, where a deterministic count matters more than a real model.

pub mod annotate;
pub mod fixed;
pub mod sidecar;

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use fixed::FixedDetector;
pub use sidecar::SidecarDetector;

/// Errors a detection backend can surface.
#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Detection model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("I/O error during detection: {0}")]
    Io(#[from] std::io::Error),
}

/// One detected vehicle in image pixel coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub confidence: f32,
}

/// The result of running detection over one image. The annotated image has
/// already been written when this is returned.
#[derive(Debug, Clone)]
pub struct Detection {
    pub vehicle_count: u32,
}

/// A detection backend. Given the original image it writes the annotated
/// image to `annotated` and reports how many vehicles it found.
///
/// Implementations must write the annotated file atomically; a partially
/// written image must never be observable at the final path. The annotated
/// path is chosen by the caller and is never the input path.
#[async_trait]
pub trait VehicleDetector: Send + Sync {
    async fn detect(&self, original: &Path, annotated: &Path) -> Result<Detection, DetectorError>;
}
