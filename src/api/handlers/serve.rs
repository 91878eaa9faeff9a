//! Image reads: the session-gated private CDN and the open public bucket.

use super::AppState;
use crate::access::{Credentials, Decision};
use crate::api::errors::CdnError;
use crate::api::extractors::RequestCredentials;
use crate::types::{content_type_for, Category};
use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use tracing::debug;

async fn serve(
    state: &AppState,
    category: Category,
    filename: &str,
    credentials: &Credentials,
) -> Result<Response, CdnError> {
    if let Decision::Deny(reason) = state.access.authorize(category, credentials) {
        debug!("Denied {}/{}: {}", category, filename, reason.as_str());
        return Err(CdnError::from_read_denial(reason));
    }

    let data = state.store.get(category, filename).await?;
    let cache_control = match category {
        Category::Public => "public, max-age=86400",
        Category::Private => "private, no-store",
    };
    let quoted = filename.replace('"', "_");
    let disposition = HeaderValue::from_str(&format!("inline; filename=\"{}\"", quoted))
        .unwrap_or_else(|_| HeaderValue::from_static("inline"));

    Ok((
        StatusCode::OK,
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static(content_type_for(filename)),
            ),
            (header::CACHE_CONTROL, HeaderValue::from_static(cache_control)),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        data,
    )
        .into_response())
}

/// GET /cdn/:filename: private image, session or API key required.
pub async fn serve_private(
    State(state): State<Arc<AppState>>,
    RequestCredentials(credentials): RequestCredentials,
    Path(filename): Path<String>,
) -> Result<Response, CdnError> {
    serve(&state, Category::Private, &filename, &credentials).await
}

/// GET /images/public/:filename: public image, no credentials.
pub async fn serve_public(
    State(state): State<Arc<AppState>>,
    RequestCredentials(credentials): RequestCredentials,
    Path(filename): Path<String>,
) -> Result<Response, CdnError> {
    serve(&state, Category::Public, &filename, &credentials).await
}
