use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::{debug, instrument, warn};

use crate::helpers::files::sanitize_filename;
use crate::schemas::AppState;

/// Serve an annotated image from the detection directory
#[utoipa::path(
    get,
    path = "/uploads/{filename}",
    tag = "files",
    params(
        ("filename" = String, Path, description = "Annotated image filename"),
    ),
    responses(
        (status = 200, description = "Annotated image bytes"),
        (status = 404, description = "File not found")
    )
)]
#[instrument(skip(state))]
pub async fn serve_annotated(
    Path(filename): Path<String>,
    State(state): State<AppState>,
) -> Result<Response, StatusCode> {
    // Anything that does not survive sanitization is a traversal attempt
    if filename != sanitize_filename(&filename) {
        warn!("Rejected suspicious file request: {}", filename);
        return Err(StatusCode::NOT_FOUND);
    }

    let path = state.config.detection_dir.join(&filename);
    let bytes = tokio::fs::read(&path).await.map_err(|e| {
        debug!("Annotated file {} not readable: {}", path.display(), e);
        StatusCode::NOT_FOUND
    })?;

    let mime = mime_guess::from_path(&path).first_or_octet_stream();
    Ok(([(header::CONTENT_TYPE, mime.to_string())], bytes).into_response())
}
