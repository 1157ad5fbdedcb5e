//! Client for a pretrained detection model served as an HTTP sidecar.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use tracing::{debug, info};

use crate::annotate::{decode_image, draw_boxes, write_annotated};
use crate::{BoundingBox, Detection, DetectorError, VehicleDetector};

/// Object class the sidecar is asked to detect.
const TARGET_CLASS: &str = "car";

#[derive(serde::Serialize)]
struct DetectRequest {
    /// Base64-encoded image bytes.
    image: String,
    /// Class name to filter detections to.
    target_class: String,
}

#[derive(serde::Deserialize)]
struct DetectResponse {
    detections: Vec<BoundingBox>,
}

/// Delegates detection to a model sidecar over HTTP.
///
/// The sidecar owns the pretrained weights; this client only ships the image
/// out, collects the returned boxes, and renders the annotated copy locally.
pub struct SidecarDetector {
    client: Client,
    endpoint: String,
}

impl SidecarDetector {
    /// Create a new sidecar client.
    pub fn new(endpoint: &str, request_timeout: Duration) -> Result<Self, DetectorError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| DetectorError::ModelUnavailable(e.to_string()))?;

        let endpoint = endpoint.trim_end_matches('/').to_string();
        info!("Detection sidecar configured: endpoint={}", endpoint);

        Ok(Self { client, endpoint })
    }

    /// Check whether the sidecar answers its health endpoint.
    pub async fn health_check(&self) -> bool {
        match self
            .client
            .get(format!("{}/health", self.endpoint))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!("Detection sidecar health check failed: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl VehicleDetector for SidecarDetector {
    async fn detect(&self, original: &Path, annotated: &Path) -> Result<Detection, DetectorError> {
        let bytes = tokio::fs::read(original).await?;
        // Decode before shipping anything out; corrupt uploads fail fast and
        // never reach the model.
        let image = decode_image(&bytes)?;

        let request = DetectRequest {
            image: STANDARD.encode(&bytes),
            target_class: TARGET_CLASS.to_string(),
        };

        let response = self
            .client
            .post(format!("{}/detect", self.endpoint))
            .json(&request)
            .send()
            .await
            .map_err(|e| DetectorError::ModelUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(DetectorError::ModelUnavailable(format!(
                "sidecar returned {}",
                response.status()
            )));
        }

        let result: DetectResponse = response
            .json()
            .await
            .map_err(|e| DetectorError::ModelUnavailable(e.to_string()))?;

        debug!(
            boxes = result.detections.len(),
            input = %original.display(),
            "Sidecar returned detections"
        );

        let canvas = draw_boxes(&image, &result.detections);
        write_annotated(&canvas, annotated).await?;

        Ok(Detection {
            vehicle_count: result.detections.len() as u32,
        })
    }
}
