//! HTTP request handlers
//!
//! Split into submodules by domain:
//! - `auth`: login, logout, session check, API-key exchange, CAPTCHA
//! - `images`: administrative list, upload and delete
//! - `serve`: private (`/cdn`) and public image reads
//! - `status`: health check

mod auth;
mod images;
mod serve;
mod status;

use crate::access::{AccessController, AdminCredentials, AllowedOrigins};
use crate::captcha::{CaptchaSlots, ChallengeProvider, TextChallengeProvider};
use crate::config::{AuthMode, Config};
use crate::session::SessionStore;
use crate::storage::ImageStore;
use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::routing::{delete, get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

pub use auth::{api_key_auth, check_session, issue_captcha, login, logout};
pub use images::{delete_image, list_images, upload_image, ImageListResponse, UploadResponse};
pub use serve::{serve_private, serve_public};
pub use status::{health_check, HealthResponse};

/// Login behaviour knobs taken from `Config`.
#[derive(Debug, Clone, Copy)]
pub struct AuthSettings {
    pub mode: AuthMode,
    pub captcha_enabled: bool,
    pub cookie_secure: bool,
}

/// Application state shared across handlers
pub struct AppState {
    pub store: Arc<dyn ImageStore>,
    pub access: AccessController,
    pub admin: AdminCredentials,
    pub captcha: CaptchaSlots,
    pub challenges: Arc<dyn ChallengeProvider>,
    pub auth: AuthSettings,
}

impl AppState {
    pub fn new(config: &Config, sessions: Arc<dyn SessionStore>, store: Arc<dyn ImageStore>) -> Self {
        let access = AccessController::new(
            sessions,
            AllowedOrigins::from_entries(&config.allowed_origins),
            config.origin_binding,
            config.api_key.clone(),
        );
        let admin = AdminCredentials::new(
            config.admin_username.clone(),
            config.admin_password.clone(),
            config.admin_password_hash.clone(),
        );
        Self {
            store,
            access,
            admin,
            captcha: CaptchaSlots::default(),
            challenges: Arc::new(TextChallengeProvider::default()),
            auth: AuthSettings {
                mode: config.auth_mode,
                captcha_enabled: config.captcha_enabled,
                cookie_secure: config.cookie_secure,
            },
        }
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        self.access.sessions()
    }
}

/// CORS for credentialed requests. A wildcard allow-list mirrors the request
/// origin, since browsers refuse `*` together with credentials.
fn cors_layer(config: &Config) -> CorsLayer {
    let allow_origin = match AllowedOrigins::from_entries(&config.allowed_origins) {
        AllowedOrigins::Any => AllowOrigin::mirror_request(),
        AllowedOrigins::List(list) => AllowOrigin::list(
            list.iter()
                .filter_map(|o| HeaderValue::from_str(o).ok())
                .collect::<Vec<_>>(),
        ),
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-api-key"),
            HeaderName::from_static("x-session-token"),
        ])
}

/// Build the application router.
///
/// Routes:
///   POST   /api/auth/login                 - administrator login
///   GET    /logout                         - clear session
///   GET    /api/auth/session               - session check
///   POST   /auth                           - exchange API key for a session token
///   GET    /api/captcha                    - issue a login CAPTCHA
///   GET    /api/images                     - list both categories
///   POST   /api/upload                     - multipart upload
///   DELETE /api/images/:category/:filename - delete an image
///   GET    /cdn/:filename                  - private image (session or API key)
///   GET    /images/public/:filename        - public image
///   GET    /health                         - liveness probe
pub fn router(state: Arc<AppState>, config: &Config) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/auth/login", post(login))
        .route("/api/auth/session", get(check_session))
        .route("/logout", get(logout))
        .route("/auth", post(api_key_auth))
        .route("/api/captcha", get(issue_captcha))
        .route("/api/images", get(list_images))
        .route("/api/upload", post(upload_image))
        .route("/api/images/:category/:filename", delete(delete_image))
        .route("/cdn/:filename", get(serve_private))
        .route("/images/public/:filename", get(serve_public))
        .layer(cors_layer(config))
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(
            usize::try_from(config.max_upload_size).unwrap_or(usize::MAX),
        ))
        .with_state(state)
}
