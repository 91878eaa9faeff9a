//! Image store trait definitions

use crate::types::Category;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during image store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Image not found: {0}")]
    NotFound(String),

    #[error("Image already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid filename: {0}")]
    InvalidName(String),

    #[error("Unsupported content type: {0}")]
    UnsupportedType(String),

    #[error("Insufficient storage space")]
    DiskFull,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Other(String),
}

/// How stored names are chosen when the uploader does not ask for one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilenamePolicy {
    /// Keep the uploaded file's own name.
    #[default]
    Preserve,
    /// Random hex name with the original extension.
    Random,
}

/// An upload as received from the client.
#[derive(Debug, Clone)]
pub struct PutRequest {
    /// Name the client's file carried, if any.
    pub original_name: Option<String>,
    /// Declared content type of the file part.
    pub content_type: Option<String>,
    /// Explicit target name. Always deterministic: never overwrites.
    pub requested_name: Option<String>,
    pub data: Bytes,
}

/// Abstract image store with one flat namespace per category.
///
/// This trait is object-safe and can be used with `Arc<dyn ImageStore>`.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Names of the images in a category, in storage-native order.
    async fn list(&self, category: Category) -> Result<Vec<String>, StoreError>;

    /// Store an image and return the name it was stored under.
    async fn put(&self, category: Category, request: PutRequest) -> Result<String, StoreError>;

    /// Read an image's bytes.
    async fn get(&self, category: Category, filename: &str) -> Result<Bytes, StoreError>;

    /// Remove an image.
    async fn delete(&self, category: Category, filename: &str) -> Result<(), StoreError>;
}
