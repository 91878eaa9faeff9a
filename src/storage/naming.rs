//! Stored-name selection for uploads.

use super::traits::{FilenamePolicy, PutRequest, StoreError};
use crate::types::{base_name, extension_of, has_image_extension, is_safe_filename};

/// Extension to store a file under, given its declared content type.
fn extension_for_content_type(content_type: &str) -> Option<&'static str> {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    match essence.as_str() {
        "image/png" => Some("png"),
        "image/jpeg" | "image/jpg" | "image/pjpeg" => Some("jpg"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}

/// Reject anything that does not declare itself as an image.
fn check_content_type(request: &PutRequest) -> Result<(), StoreError> {
    let declared = request.content_type.as_deref().unwrap_or("");
    if declared.trim().to_ascii_lowercase().starts_with("image/") {
        Ok(())
    } else {
        Err(StoreError::UnsupportedType(declared.to_string()))
    }
}

/// Extension carried over to the stored name: the uploaded file's own if it
/// is a listable image extension, otherwise one derived from the content type.
fn carried_extension(request: &PutRequest) -> Result<String, StoreError> {
    if let Some(name) = request.original_name.as_deref() {
        let name = base_name(name);
        if has_image_extension(name) {
            if let Some(ext) = extension_of(name) {
                return Ok(ext);
            }
        }
    }
    request
        .content_type
        .as_deref()
        .and_then(extension_for_content_type)
        .map(str::to_string)
        .ok_or_else(|| {
            StoreError::UnsupportedType(request.content_type.clone().unwrap_or_default())
        })
}

/// Give `name` the carried extension if it has none; reject foreign ones.
fn with_image_extension(name: &str, request: &PutRequest) -> Result<String, StoreError> {
    if !is_safe_filename(name) {
        return Err(StoreError::InvalidName(name.to_string()));
    }
    match extension_of(name) {
        Some(_) if has_image_extension(name) => Ok(name.to_string()),
        Some(_) => Err(StoreError::InvalidName(name.to_string())),
        None => Ok(format!("{}.{}", name, carried_extension(request)?)),
    }
}

/// Decide the name an upload is stored under.
///
/// An explicit `requested_name` always wins. Otherwise `Preserve` keeps the
/// uploaded file's base name and `Random` generates a UUID-hex name.
pub fn resolve_target_name(
    policy: FilenamePolicy,
    request: &PutRequest,
) -> Result<String, StoreError> {
    check_content_type(request)?;

    if let Some(requested) = request
        .requested_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
    {
        return with_image_extension(requested, request);
    }

    match policy {
        FilenamePolicy::Preserve => {
            let original = request
                .original_name
                .as_deref()
                .map(base_name)
                .filter(|n| !n.is_empty())
                .ok_or_else(|| StoreError::InvalidName(String::new()))?;
            with_image_extension(original, request)
        }
        FilenamePolicy::Random => Ok(format!(
            "{}.{}",
            uuid::Uuid::new_v4().simple(),
            carried_extension(request)?
        )),
    }
}
