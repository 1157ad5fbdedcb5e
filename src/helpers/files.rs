//! Filename hygiene and best-effort file removal for the upload workflow.

use std::path::Path;

use tracing::{debug, warn};

/// Reduce a client-supplied filename to a safe basename: path components are
/// stripped and anything outside `[A-Za-z0-9._-]` is replaced.
pub fn sanitize_filename(raw: &str) -> String {
    let base = raw
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(raw);

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();

    // Dot-only names would vanish into extensions; fall back to a stub
    if cleaned.trim_matches(['.', '_']).is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

/// Remove a file if it is present. A missing file is only worth a warning;
/// entry deletion must not fail because a backing file is already gone.
pub async fn remove_file_if_exists(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed file {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("File {} was already missing", path.display());
        }
        Err(e) => {
            warn!("Failed to remove file {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_path_components() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\photos\\car.jpg"), "car.jpg");
    }

    #[test]
    fn replaces_unexpected_characters() {
        assert_eq!(sanitize_filename("street view!.jpg"), "street_view_.jpg");
        assert_eq!(sanitize_filename("köln.png"), "k_ln.png");
    }

    #[test]
    fn degenerate_names_get_a_stub() {
        assert_eq!(sanitize_filename("..."), "upload");
        assert_eq!(sanitize_filename(""), "upload");
    }

    #[tokio::test]
    async fn removing_a_missing_file_does_not_panic() {
        remove_file_if_exists(Path::new("/definitely/not/here.jpg")).await;
    }
}
