//! Administrative image handlers: list, upload, delete.

use super::AppState;
use crate::api::errors::CdnError;
use crate::api::extractors::AdminSession;
use crate::storage::PutRequest;
use crate::types::Category;
use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Serialize)]
pub struct ImageListResponse {
    pub public: Vec<String>,
    pub private: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub filename: String,
    pub category: Category,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    ok: bool,
}

fn multipart_error(err: MultipartError) -> CdnError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        CdnError::PayloadTooLarge
    } else {
        CdnError::BadRequest("Malformed upload form".to_string())
    }
}

/// GET /api/images: names of all images in both categories.
pub async fn list_images(
    AdminSession(_session): AdminSession,
    State(state): State<Arc<AppState>>,
) -> Result<Json<ImageListResponse>, CdnError> {
    Ok(Json(ImageListResponse {
        public: state.store.list(Category::Public).await?,
        private: state.store.list(Category::Private).await?,
    }))
}

/// POST /api/upload: multipart `file`, `category`, optional `new_filename`.
pub async fn upload_image(
    AdminSession(_session): AdminSession,
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, CdnError> {
    let mut category: Option<String> = None;
    let mut requested_name: Option<String> = None;
    let mut file: Option<(Option<String>, Option<String>, Bytes)> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "category" => category = Some(field.text().await.map_err(multipart_error)?),
            "new_filename" => requested_name = Some(field.text().await.map_err(multipart_error)?),
            "file" => {
                let original_name = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let data = field.bytes().await.map_err(multipart_error)?;
                file = Some((original_name, content_type, data));
            }
            _ => {}
        }
    }

    let category: Category = category
        .as_deref()
        .map(str::trim)
        .ok_or_else(|| CdnError::BadRequest("category required".to_string()))?
        .parse()
        .map_err(|_| CdnError::BadRequest("category must be public or private".to_string()))?;
    let (original_name, content_type, data) =
        file.ok_or_else(|| CdnError::BadRequest("file required".to_string()))?;

    let size = data.len();
    let filename = state
        .store
        .put(
            category,
            PutRequest {
                original_name,
                content_type,
                requested_name,
                data,
            },
        )
        .await?;

    info!("Uploaded {}/{} ({} bytes)", category, filename, size);
    Ok(Json(UploadResponse { filename, category }))
}

/// DELETE /api/images/:category/:filename
pub async fn delete_image(
    AdminSession(_session): AdminSession,
    State(state): State<Arc<AppState>>,
    Path((category, filename)): Path<(String, String)>,
) -> Result<Json<DeleteResponse>, CdnError> {
    let category: Category = category.parse().map_err(|_| CdnError::NotFound)?;
    state.store.delete(category, &filename).await?;
    info!("Deleted {}/{}", category, filename);
    Ok(Json(DeleteResponse { ok: true }))
}
