//! API error types and JSON error responses

use crate::access::DenyReason;
use crate::storage::StoreError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Errors surfaced to HTTP clients.
///
/// Every variant renders as `{"detail": "..."}` with a short generic message;
/// internal details are logged, never returned.
#[derive(Debug, Error)]
pub enum CdnError {
    #[error("{0}")]
    Unauthenticated(&'static str),

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("Image not found")]
    NotFound,

    #[error("An image with that name already exists")]
    Conflict,

    #[error("{0}")]
    BadRequest(String),

    #[error("Upload exceeds the maximum allowed size")]
    PayloadTooLarge,

    #[error("Internal server error")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    detail: &'a str,
}

impl CdnError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            CdnError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            CdnError::Forbidden(_) => StatusCode::FORBIDDEN,
            CdnError::NotFound => StatusCode::NOT_FOUND,
            CdnError::Conflict => StatusCode::CONFLICT,
            CdnError::BadRequest(_) => StatusCode::BAD_REQUEST,
            CdnError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            CdnError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Map a denied administrative request to a response.
    pub fn from_admin_denial(reason: DenyReason) -> Self {
        match reason {
            DenyReason::Unauthenticated | DenyReason::InvalidSession => {
                CdnError::Unauthenticated("Not authenticated")
            }
            DenyReason::OriginNotAllowed => CdnError::Forbidden("Not authorized"),
        }
    }

    /// Map a denied image read to a response. Image reads never distinguish
    /// missing credentials from bad ones.
    pub fn from_read_denial(_reason: DenyReason) -> Self {
        CdnError::Forbidden("Not authorized")
    }
}

impl IntoResponse for CdnError {
    fn into_response(self) -> Response {
        if let CdnError::Internal(ref detail) = self {
            error!("Internal error: {}", detail);
        }
        let status = self.status_code();
        let message = self.to_string();
        (status, Json(ErrorBody { detail: &message })).into_response()
    }
}

impl From<StoreError> for CdnError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => CdnError::NotFound,
            StoreError::AlreadyExists(_) => CdnError::Conflict,
            StoreError::InvalidName(_) => CdnError::BadRequest("Invalid filename".to_string()),
            StoreError::UnsupportedType(_) => {
                CdnError::BadRequest("File must be an image".to_string())
            }
            other => CdnError::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_mapping() {
        assert!(matches!(
            CdnError::from(StoreError::NotFound("x".into())),
            CdnError::NotFound
        ));
        assert!(matches!(
            CdnError::from(StoreError::AlreadyExists("x".into())),
            CdnError::Conflict
        ));
        assert_eq!(
            CdnError::from(StoreError::UnsupportedType("text/plain".into())).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            CdnError::from(StoreError::DiskFull).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_internal_detail_not_exposed() {
        let err = CdnError::Internal("/srv/images/private: permission denied".into());
        assert_eq!(err.to_string(), "Internal server error");
    }

    #[test]
    fn test_denial_mapping() {
        assert_eq!(
            CdnError::from_admin_denial(DenyReason::InvalidSession).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            CdnError::from_admin_denial(DenyReason::OriginNotAllowed).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            CdnError::from_read_denial(DenyReason::Unauthenticated).status_code(),
            StatusCode::FORBIDDEN
        );
    }
}
