use std::collections::HashSet;

use crate::auth::{require_admin, CurrentUser};
use crate::helpers::files::{remove_file_if_exists, sanitize_filename};
use crate::jobs::annotated_filename;
use crate::schemas::{ApiResponse, AppState, ErrorResponse};
use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, Utc};
use model::entities::image_entry::{self, DetectionStatus};
use model::entities::viewed_image;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DbErr, EntityTrait, ModelTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, trace, warn};
use utoipa::ToSchema;
use uuid::Uuid;

/// Image entry response model
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct EntryResponse {
    pub id: i32,
    /// Stored filename of the original upload
    pub original_filename: String,
    /// Stored filename of the annotated image, absent until detection completes
    pub annotated_filename: Option<String>,
    /// URL the annotated image is served under, once it exists
    pub annotated_url: Option<String>,
    pub description: String,
    /// Vehicle count; meaningful once detection_status is "completed"
    pub vehicle_count: i32,
    /// Workflow state: "pending", "completed", or "failed"
    pub detection_status: String,
    pub created_at: DateTime<Utc>,
}

fn status_label(status: &DetectionStatus) -> &'static str {
    match status {
        DetectionStatus::Pending => "pending",
        DetectionStatus::Completed => "completed",
        DetectionStatus::Failed => "failed",
    }
}

impl From<image_entry::Model> for EntryResponse {
    fn from(model: image_entry::Model) -> Self {
        let annotated_url = model
            .annotated_filename
            .as_ref()
            .map(|name| format!("/uploads/{}", name));
        Self {
            id: model.id,
            annotated_url,
            detection_status: status_label(&model.detection_status).to_string(),
            original_filename: model.original_filename,
            annotated_filename: model.annotated_filename,
            description: model.description,
            vehicle_count: model.vehicle_count,
            created_at: model.created_at,
        }
    }
}

/// Admin dashboard payload: entries split by whether this admin has
/// acknowledged them.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AdminDashboardResponse {
    pub unviewed: Vec<EntryResponse>,
    pub viewed: Vec<EntryResponse>,
}

fn not_found(what: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: format!("{} not found", what),
            code: "NOT_FOUND".to_string(),
            success: false,
        }),
    )
}

fn internal_error(context: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: format!("Internal server error while {}", context),
            code: "DATABASE_ERROR".to_string(),
            success: false,
        }),
    )
}

/// List all image entries in creation order
#[utoipa::path(
    get,
    path = "/",
    tag = "entries",
    responses(
        (status = 200, description = "Entries retrieved successfully", body = ApiResponse<Vec<EntryResponse>>),
        (status = 401, description = "Not logged in", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
)]
#[instrument(skip(state))]
pub async fn list_entries(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<ApiResponse<Vec<EntryResponse>>>, (StatusCode, Json<ErrorResponse>)> {
    trace!("Entering list_entries function");

    match image_entry::Entity::find()
        .order_by_asc(image_entry::Column::Id)
        .all(&state.db)
        .await
    {
        Ok(entries) => {
            debug!("Retrieved {} entries from database", entries.len());
            let responses: Vec<EntryResponse> =
                entries.into_iter().map(EntryResponse::from).collect();
            Ok(Json(ApiResponse {
                data: responses,
                message: "Entries retrieved successfully".to_string(),
                success: true,
            }))
        }
        Err(db_error) => {
            error!("Failed to retrieve entries: {}", db_error);
            Err(internal_error("listing entries"))
        }
    }
}

/// Admin review dashboard: entries partitioned into viewed and unviewed
#[utoipa::path(
    get,
    path = "/admin_dashboard",
    tag = "entries",
    responses(
        (status = 200, description = "Dashboard retrieved successfully", body = ApiResponse<AdminDashboardResponse>),
        (status = 401, description = "Not logged in", body = ErrorResponse),
        (status = 403, description = "Admin role required", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
)]
#[instrument(skip(state))]
pub async fn admin_dashboard(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<ApiResponse<AdminDashboardResponse>>, (StatusCode, Json<ErrorResponse>)> {
    trace!("Entering admin_dashboard function");
    require_admin(&user)?;

    let entries = image_entry::Entity::find()
        .order_by_asc(image_entry::Column::Id)
        .all(&state.db)
        .await
        .map_err(|db_error| {
            error!("Failed to retrieve entries for dashboard: {}", db_error);
            internal_error("listing entries")
        })?;

    let viewed_ids: HashSet<i32> = viewed_image::Entity::find()
        .filter(viewed_image::Column::UserId.eq(user.id))
        .all(&state.db)
        .await
        .map_err(|db_error| {
            error!("Failed to retrieve viewed relations: {}", db_error);
            internal_error("listing viewed entries")
        })?
        .into_iter()
        .map(|v| v.image_id)
        .collect();

    let (viewed, unviewed): (Vec<_>, Vec<_>) = entries
        .into_iter()
        .partition(|entry| viewed_ids.contains(&entry.id));

    debug!(
        "Dashboard for '{}': {} viewed, {} unviewed",
        user.username,
        viewed.len(),
        unviewed.len()
    );

    Ok(Json(ApiResponse {
        data: AdminDashboardResponse {
            unviewed: unviewed.into_iter().map(EntryResponse::from).collect(),
            viewed: viewed.into_iter().map(EntryResponse::from).collect(),
        },
        message: "Dashboard retrieved successfully".to_string(),
        success: true,
    }))
}

/// Upload an image and queue it for detection
#[utoipa::path(
    post,
    path = "/upload",
    tag = "entries",
    responses(
        (status = 201, description = "Entry created, detection queued", body = ApiResponse<EntryResponse>),
        (status = 401, description = "Not logged in", body = ErrorResponse),
        (status = 422, description = "Image file or description missing", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
)]
#[instrument(skip(state, multipart))]
pub async fn upload_image(
    State(state): State<AppState>,
    user: CurrentUser,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ApiResponse<EntryResponse>>), (StatusCode, Json<ErrorResponse>)> {
    trace!("Entering upload_image function");

    let mut image_bytes: Option<(String, Vec<u8>)> = None;
    let mut description: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        warn!("Malformed multipart upload: {}", e);
        (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ErrorResponse {
                error: "Malformed multipart request".to_string(),
                code: "UPLOAD_MISSING_FIELD".to_string(),
                success: false,
            }),
        )
    })? {
        let field_name = field.name().map(str::to_string);
        match field_name.as_deref() {
            Some("image") => {
                let file_name = field
                    .file_name()
                    .map(sanitize_filename)
                    .unwrap_or_else(|| "upload.jpg".to_string());
                let bytes = field.bytes().await.map_err(|e| {
                    warn!("Failed to read uploaded image: {}", e);
                    (
                        StatusCode::UNPROCESSABLE_ENTITY,
                        Json(ErrorResponse {
                            error: "Failed to read uploaded image".to_string(),
                            code: "UPLOAD_MISSING_FIELD".to_string(),
                            success: false,
                        }),
                    )
                })?;
                image_bytes = Some((file_name, bytes.to_vec()));
            }
            Some("description") => {
                description = field.text().await.ok();
            }
            other => {
                debug!("Ignoring unexpected multipart field: {:?}", other);
            }
        }
    }

    let (file_name, bytes) = match image_bytes {
        Some((name, bytes)) if !bytes.is_empty() => (name, bytes),
        _ => {
            warn!("Upload from '{}' missing the image field", user.username);
            return Err((
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(ErrorResponse {
                    error: "An image file is required".to_string(),
                    code: "UPLOAD_MISSING_FIELD".to_string(),
                    success: false,
                }),
            ));
        }
    };

    let description = match description {
        Some(d) if !d.trim().is_empty() => d,
        _ => {
            warn!("Upload from '{}' missing the description field", user.username);
            return Err((
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(ErrorResponse {
                    error: "A description is required".to_string(),
                    code: "UPLOAD_MISSING_FIELD".to_string(),
                    success: false,
                }),
            ));
        }
    };

    // A per-upload UUID prefix keeps concurrent uploads of the same filename
    // from ever colliding
    let stored_name = format!("{}_{}", Uuid::new_v4(), file_name);
    let original_path = state.config.upload_dir.join(&stored_name);

    tokio::fs::write(&original_path, &bytes).await.map_err(|e| {
        error!("Failed to persist upload {}: {}", original_path.display(), e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: "Failed to store uploaded image".to_string(),
                code: "STORAGE_ERROR".to_string(),
                success: false,
            }),
        )
    })?;

    let new_entry = image_entry::ActiveModel {
        original_filename: Set(stored_name.clone()),
        annotated_filename: Set(None),
        description: Set(description),
        vehicle_count: Set(0),
        detection_status: Set(DetectionStatus::Pending),
        created_at: Set(Utc::now()),
        ..Default::default()
    };

    let entry = new_entry.insert(&state.db).await.map_err(|db_error| {
        error!("Failed to insert image entry: {}", db_error);
        internal_error("creating the entry")
    })?;

    state
        .jobs
        .enqueue(entry.id, stored_name)
        .await
        .map_err(|e| {
            error!("Failed to enqueue detection for entry {}: {}", entry.id, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Failed to queue detection".to_string(),
                    code: "QUEUE_ERROR".to_string(),
                    success: false,
                }),
            )
        })?;

    info!(
        "User '{}' uploaded entry {} ({})",
        user.username, entry.id, entry.original_filename
    );
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse {
            data: EntryResponse::from(entry),
            message: "Image uploaded, detection queued".to_string(),
            success: true,
        }),
    ))
}

/// Mark an entry as viewed by the current admin (idempotent)
#[utoipa::path(
    post,
    path = "/mark_viewed/{image_id}",
    tag = "entries",
    params(
        ("image_id" = i32, Path, description = "Image entry ID"),
    ),
    responses(
        (status = 200, description = "Entry marked as viewed", body = ApiResponse<String>),
        (status = 401, description = "Not logged in", body = ErrorResponse),
        (status = 403, description = "Admin role required", body = ErrorResponse),
        (status = 404, description = "Entry not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
)]
#[instrument(skip(state))]
pub async fn mark_viewed(
    Path(image_id): Path<i32>,
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<ApiResponse<String>>, (StatusCode, Json<ErrorResponse>)> {
    trace!("Entering mark_viewed function for image_id: {}", image_id);
    require_admin(&user)?;

    let entry = image_entry::Entity::find_by_id(image_id)
        .one(&state.db)
        .await
        .map_err(|db_error| {
            error!("Failed to look up entry {}: {}", image_id, db_error);
            internal_error("marking the entry as viewed")
        })?;

    if entry.is_none() {
        warn!("Entry {} not found for mark_viewed", image_id);
        return Err(not_found("Image"));
    }

    let relation = viewed_image::ActiveModel {
        user_id: Set(user.id),
        image_id: Set(image_id),
    };

    let insert = viewed_image::Entity::insert(relation)
        .on_conflict(
            OnConflict::columns([
                viewed_image::Column::UserId,
                viewed_image::Column::ImageId,
            ])
            .do_nothing()
            .to_owned(),
        )
        .exec(&state.db)
        .await;

    match insert {
        Ok(_) => {
            info!("Admin '{}' marked entry {} as viewed", user.username, image_id);
        }
        // Conflict means the pair already exists; marking twice is a no-op
        Err(DbErr::RecordNotInserted) => {
            debug!(
                "Entry {} was already viewed by '{}'",
                image_id, user.username
            );
        }
        Err(db_error) => {
            error!(
                "Failed to insert viewed relation ({}, {}): {}",
                user.id, image_id, db_error
            );
            return Err(internal_error("marking the entry as viewed"));
        }
    }

    Ok(Json(ApiResponse {
        data: format!("Image {} marked as viewed", image_id),
        message: "Image marked as viewed".to_string(),
        success: true,
    }))
}

/// Delete an entry together with both backing files
#[utoipa::path(
    post,
    path = "/delete/{image_id}",
    tag = "entries",
    params(
        ("image_id" = i32, Path, description = "Image entry ID"),
    ),
    responses(
        (status = 200, description = "Entry deleted", body = ApiResponse<String>),
        (status = 401, description = "Not logged in", body = ErrorResponse),
        (status = 404, description = "Entry not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
)]
#[instrument(skip(state))]
pub async fn delete_entry(
    Path(image_id): Path<i32>,
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<ApiResponse<String>>, (StatusCode, Json<ErrorResponse>)> {
    trace!("Entering delete_entry function for image_id: {}", image_id);
    // Deletion deliberately requires a session but not the admin role,
    // matching the original access policy for this operation.

    let entry = image_entry::Entity::find_by_id(image_id)
        .one(&state.db)
        .await
        .map_err(|db_error| {
            error!("Failed to look up entry {}: {}", image_id, db_error);
            internal_error("deleting the entry")
        })?;

    let entry = match entry {
        Some(e) => e,
        None => {
            warn!("Entry {} not found for deletion", image_id);
            return Err(not_found("Image"));
        }
    };

    let original_path = state.config.upload_dir.join(&entry.original_filename);
    // A pending entry has no annotated file yet, but the job may still be
    // running; its late write is cleaned up by the dispatcher.
    let annotated_path = entry
        .annotated_filename
        .clone()
        .map(|name| state.config.detection_dir.join(name));
    let annotated_guess = state
        .config
        .detection_dir
        .join(annotated_filename(&entry.original_filename));

    entry.delete(&state.db).await.map_err(|db_error| {
        error!("Failed to delete entry {}: {}", image_id, db_error);
        internal_error("deleting the entry")
    })?;

    // Viewed relations are removed by the FK cascade; the physical files are
    // our responsibility. Missing files only warrant a warning.
    remove_file_if_exists(&original_path).await;
    match annotated_path {
        Some(path) => remove_file_if_exists(&path).await,
        None => remove_file_if_exists(&annotated_guess).await,
    }

    info!("User '{}' deleted entry {}", user.username, image_id);
    Ok(Json(ApiResponse {
        data: format!("Image {} deleted", image_id),
        message: "Image deleted successfully".to_string(),
        success: true,
    }))
}
