//! Profile-photo upload
//!
//! Stored files are served back under `/uploads/<name>`.

use axum::{
    extract::{Multipart, State},
    Json,
};
use serde_json::{json, Value};
use std::path::Path;
use tracing::info;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Largest accepted photo
pub const MAX_PHOTO_BYTES: usize = 5 * 1024 * 1024;
/// Request body cap for the upload route (photo plus multipart framing)
pub const BODY_LIMIT_BYTES: usize = MAX_PHOTO_BYTES + 64 * 1024;

pub const ALLOWED_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "gif", "webp"];

/// Form fields that may carry the photo
const PHOTO_FIELDS: [&str; 2] = ["photo", "file"];

/// Lower-cased extension of `file_name` when it is an accepted image type
pub fn photo_extension(file_name: &str) -> Option<String> {
    let ext = Path::new(file_name)
        .extension()?
        .to_str()?
        .to_ascii_lowercase();
    ALLOWED_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

/// POST /api/uploads/profile-photo
pub async fn upload_profile_photo(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<Value>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Invalid upload: {}", e)))?
    {
        if !PHOTO_FIELDS.contains(&field.name().unwrap_or_default()) {
            continue;
        }

        let original_name = field.file_name().unwrap_or_default().to_string();
        let ext = photo_extension(&original_name).ok_or_else(|| {
            ApiError::BadRequest(format!(
                "Unsupported file type. Allowed: {}",
                ALLOWED_EXTENSIONS.join(", ")
            ))
        })?;

        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Invalid upload: {}", e)))?;
        if data.is_empty() {
            return Err(ApiError::BadRequest("Uploaded file is empty".to_string()));
        }
        if data.len() > MAX_PHOTO_BYTES {
            return Err(ApiError::BadRequest("File exceeds the 5 MiB limit".to_string()));
        }

        let filename = format!("{}.{}", Uuid::new_v4(), ext);
        let dir = state.config.storage.uploads_dir();
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join(&filename), &data).await?;

        info!(filename = %filename, bytes = data.len(), "Stored profile photo");

        return Ok(Json(json!({
            "success": true,
            "filename": filename,
            "url": format!("/uploads/{}", filename),
        })));
    }

    Err(ApiError::BadRequest("No file provided".to_string()))
}
