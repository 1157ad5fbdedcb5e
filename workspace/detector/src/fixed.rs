//! Deterministic detection backend for development and tests.

use std::path::Path;

use async_trait::async_trait;

use crate::annotate::{decode_image, draw_boxes, write_annotated};
use crate::{Detection, DetectorError, VehicleDetector};

/// A backend that reports a fixed vehicle count without calling any model.
///
/// The input image is still decoded (corrupt uploads fail exactly as with
/// the real backend) and re-encoded to the annotated path, so the rest of
/// the workflow behaves identically.
pub struct FixedDetector {
    vehicle_count: u32,
}

impl FixedDetector {
    pub fn new(vehicle_count: u32) -> Self {
        Self { vehicle_count }
    }
}

#[async_trait]
impl VehicleDetector for FixedDetector {
    async fn detect(&self, original: &Path, annotated: &Path) -> Result<Detection, DetectorError> {
        let bytes = tokio::fs::read(original).await?;
        let image = decode_image(&bytes)?;

        let canvas = draw_boxes(&image, &[]);
        write_annotated(&canvas, annotated).await?;

        Ok(Detection {
            vehicle_count: self.vehicle_count,
        })
    }
}
