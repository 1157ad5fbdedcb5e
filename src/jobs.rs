use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use detector::{DetectorError, VehicleDetector};
use model::entities::image_entry::{self, DetectionStatus};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::helpers::files::remove_file_if_exists;

/// Queue capacity; uploads briefly await space when all workers are busy and
/// the backlog is full, but never wait on inference itself.
const QUEUE_CAPACITY: usize = 256;

/// First retry delay; doubles per attempt.
const BACKOFF_BASE_MS: u64 = 500;

/// One detection job: run the model over an entry's original image and
/// deliver the count.
#[derive(Debug, Clone)]
pub struct DetectionJob {
    pub entry_id: i32,
    pub original_filename: String,
}

/// Handle for submitting detection jobs to the worker pool.
#[derive(Debug, Clone)]
pub struct DetectionQueue {
    tx: mpsc::Sender<DetectionJob>,
}

impl DetectionQueue {
    /// Spawn the worker pool and return the submission handle.
    pub fn start(
        db: DatabaseConnection,
        detector: Arc<dyn VehicleDetector>,
        config: Arc<AppConfig>,
    ) -> Self {
        let (tx, rx) = mpsc::channel::<DetectionJob>(QUEUE_CAPACITY);
        let rx = Arc::new(Mutex::new(rx));

        for worker_id in 0..config.detection_workers.max(1) {
            let rx = Arc::clone(&rx);
            let db = db.clone();
            let detector = Arc::clone(&detector);
            let config = Arc::clone(&config);

            tokio::spawn(async move {
                info!("Detection worker {} started", worker_id);
                loop {
                    // Hold the lock only while waiting for the next job
                    let job = rx.lock().await.recv().await;
                    match job {
                        Some(job) => process_job(&db, detector.as_ref(), &config, job).await,
                        None => break,
                    }
                }
                info!("Detection queue closed, worker {} stopping", worker_id);
            });
        }

        Self { tx }
    }

    /// Submit a job for an entry. Returns as soon as the job is queued; the
    /// caller never waits on inference.
    pub async fn enqueue(
        &self,
        entry_id: i32,
        original_filename: String,
    ) -> Result<(), mpsc::error::SendError<DetectionJob>> {
        debug!("Enqueueing detection job for entry {}", entry_id);
        self.tx
            .send(DetectionJob {
                entry_id,
                original_filename,
            })
            .await
    }
}

/// Annotated images are always JPEG; reuse the stored name with the
/// extension normalized.
pub fn annotated_filename(original_filename: &str) -> String {
    match Path::new(original_filename).file_stem().and_then(|s| s.to_str()) {
        Some(stem) => format!("{}.jpg", stem),
        None => format!("{}.jpg", original_filename),
    }
}

async fn process_job(
    db: &DatabaseConnection,
    detector: &dyn VehicleDetector,
    config: &AppConfig,
    job: DetectionJob,
) {
    let original = config.upload_dir.join(&job.original_filename);
    let annotated_name = annotated_filename(&job.original_filename);
    let annotated = config.detection_dir.join(&annotated_name);

    let mut backoff = Duration::from_millis(BACKOFF_BASE_MS);
    let attempts = config.detection_attempts.max(1);

    for attempt in 1..=attempts {
        match timeout(config.detection_timeout, detector.detect(&original, &annotated)).await {
            Ok(Ok(detection)) => {
                deliver_result(db, config, job.entry_id, detection.vehicle_count, &annotated_name)
                    .await;
                return;
            }
            Ok(Err(e @ DetectorError::Decode(_))) => {
                // A corrupt image will not get better on retry
                warn!("Detection for entry {} failed to decode: {}", job.entry_id, e);
                break;
            }
            Ok(Err(e)) => {
                warn!(
                    "Detection attempt {}/{} for entry {} failed: {}",
                    attempt, attempts, job.entry_id, e
                );
            }
            Err(_) => {
                warn!(
                    "Detection attempt {}/{} for entry {} timed out after {:?}",
                    attempt, attempts, job.entry_id, config.detection_timeout
                );
            }
        }

        if attempt < attempts {
            sleep(backoff).await;
            backoff *= 2;
        }
    }

    mark_failed(db, job.entry_id).await;
}

/// Write the final count, annotated filename, and completed status in one
/// conditional update. The pending-status guard makes the delivery happen at
/// most once and turns it into a no-op when the entry was deleted while the
/// job was running.
async fn deliver_result(
    db: &DatabaseConnection,
    config: &AppConfig,
    entry_id: i32,
    vehicle_count: u32,
    annotated_name: &str,
) {
    let update = image_entry::Entity::update_many()
        .set(image_entry::ActiveModel {
            vehicle_count: Set(vehicle_count as i32),
            annotated_filename: Set(Some(annotated_name.to_string())),
            detection_status: Set(DetectionStatus::Completed),
            ..Default::default()
        })
        .filter(image_entry::Column::Id.eq(entry_id))
        .filter(image_entry::Column::DetectionStatus.eq(DetectionStatus::Pending))
        .exec(db)
        .await;

    match update {
        Ok(result) if result.rows_affected > 0 => {
            info!(
                "Entry {} completed detection with {} vehicle(s)",
                entry_id, vehicle_count
            );
        }
        Ok(_) => {
            // Entry deleted while the job ran; drop the result and the file
            info!(
                "Entry {} no longer exists, discarding detection result",
                entry_id
            );
            remove_file_if_exists(&config.detection_dir.join(annotated_name)).await;
        }
        Err(e) => {
            error!("Failed to record detection result for entry {}: {}", entry_id, e);
        }
    }
}

async fn mark_failed(db: &DatabaseConnection, entry_id: i32) {
    let update = image_entry::Entity::update_many()
        .set(image_entry::ActiveModel {
            detection_status: Set(DetectionStatus::Failed),
            ..Default::default()
        })
        .filter(image_entry::Column::Id.eq(entry_id))
        .filter(image_entry::Column::DetectionStatus.eq(DetectionStatus::Pending))
        .exec(db)
        .await;

    match update {
        Ok(result) if result.rows_affected > 0 => {
            warn!("Entry {} marked as failed after exhausting retries", entry_id);
        }
        Ok(_) => {
            debug!("Entry {} already gone, skipping failure mark", entry_id);
        }
        Err(e) => {
            error!("Failed to mark entry {} as failed: {}", entry_id, e);
        }
    }
}
