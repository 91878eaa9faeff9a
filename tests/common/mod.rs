//! Shared test infrastructure for integration tests
//!
//! Provides TestApp (the real router over a temp image root, with a manual
//! clock for session expiry), multipart body building and response helpers.

#![allow(dead_code)]

use axum::body::{Body, Bytes};
use axum::http::{header, Request, Response, StatusCode};
use axum::Router;
use personal_cdn::api::{router, AppState};
use personal_cdn::config::Config;
use personal_cdn::session::{ManualClock, MemorySessionStore};
use personal_cdn::storage::FilesystemStore;
use personal_cdn::types::Category;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

pub const ADMIN_USER: &str = "admin";
pub const ADMIN_PASSWORD: &str = "admin123";
pub const BOUNDARY: &str = "personal-cdn-test-boundary";

/// The application wired up in-process over a temporary image directory.
pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub clock: ManualClock,
    pub config: Config,
    dir: TempDir,
}

impl TestApp {
    // ── Factory methods ──

    /// Default configuration: cookie sessions, 1h TTL, no CAPTCHA.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Start from the default configuration and apply `customize`.
    pub async fn with_config(customize: impl FnOnce(&mut Config)) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let mut config = Config {
            image_dir: dir.path().to_path_buf(),
            ..Config::default()
        };
        customize(&mut config);

        let clock = ManualClock::default();
        let sessions = MemorySessionStore::with_clock(
            config.session_ttl,
            config.origin_binding,
            Arc::new(clock.clone()),
        );
        let store = FilesystemStore::new(config.image_dir.clone(), config.filename_policy)
            .await
            .expect("Failed to create image store");
        let state = Arc::new(AppState::new(&config, Arc::new(sessions), Arc::new(store)));
        let router = router(state.clone(), &config);

        Self {
            router,
            state,
            clock,
            config,
            dir,
        }
    }

    // ── Filesystem helpers ──

    pub fn category_dir(&self, category: Category) -> PathBuf {
        self.dir.path().join(category.as_str())
    }

    /// Put a file straight onto disk, bypassing the API.
    pub fn seed(&self, category: Category, name: &str, data: &[u8]) {
        std::fs::write(self.category_dir(category).join(name), data).expect("seed write");
    }

    pub fn read(&self, category: Category, name: &str) -> Vec<u8> {
        std::fs::read(self.category_dir(category).join(name)).expect("read seeded file")
    }

    // ── Request helpers ──

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }

    /// GET with extra headers.
    pub async fn get(&self, uri: &str, headers: &[(&str, &str)]) -> Response<Body> {
        let mut builder = Request::get(uri);
        for (k, v) in headers {
            builder = builder.header(*k, *v);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    /// GET with the session cookie set.
    pub async fn get_with_session(&self, uri: &str, token: &str) -> Response<Body> {
        let cookie = format!("cdn_session={}", token);
        self.get(uri, &[("cookie", &cookie)]).await
    }

    /// POST a urlencoded login form.
    pub async fn login_with(&self, username: &str, password: &str) -> Response<Body> {
        let body = format!("username={}&password={}", username, password);
        self.send(
            Request::post("/api/auth/login")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
    }

    /// Log in as the administrator and return the session token.
    pub async fn login(&self) -> String {
        let resp = self.login_with(ADMIN_USER, ADMIN_PASSWORD).await;
        assert_eq!(resp.status(), StatusCode::OK, "admin login should succeed");
        set_cookie_value(&resp, "cdn_session").expect("login should set a session cookie")
    }

    /// Multipart upload through the API.
    pub async fn upload(
        &self,
        token: &str,
        category: &str,
        filename: &str,
        content_type: &str,
        data: &[u8],
        new_filename: Option<&str>,
    ) -> Response<Body> {
        let mut parts = vec![
            Part::Text("category", category),
            Part::File {
                name: "file",
                filename,
                content_type,
                data,
            },
        ];
        if let Some(new_name) = new_filename {
            parts.push(Part::Text("new_filename", new_name));
        }
        let (content_type, body) = multipart_body(&parts);
        self.send(
            Request::post("/api/upload")
                .header(header::CONTENT_TYPE, content_type)
                .header(header::COOKIE, format!("cdn_session={}", token))
                .body(Body::from(body))
                .unwrap(),
        )
        .await
    }

    pub async fn delete(&self, token: &str, category: &str, filename: &str) -> Response<Body> {
        self.send(
            Request::delete(format!("/api/images/{}/{}", category, filename))
                .header(header::COOKIE, format!("cdn_session={}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    pub async fn list(&self, token: &str) -> serde_json::Value {
        let resp = self.get_with_session("/api/images", token).await;
        assert_eq!(resp.status(), StatusCode::OK);
        body_json(resp).await
    }
}

// ── Multipart ──

pub enum Part<'a> {
    Text(&'a str, &'a str),
    File {
        name: &'a str,
        filename: &'a str,
        content_type: &'a str,
        data: &'a [u8],
    },
}

/// Encode `parts` as multipart/form-data. Returns (content-type, body).
pub fn multipart_body(parts: &[Part<'_>]) -> (String, Vec<u8>) {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name)
                        .as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
            Part::File {
                name,
                filename,
                content_type,
                data,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                        name, filename, content_type
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(data);
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    (format!("multipart/form-data; boundary={}", BOUNDARY), body)
}

// ── Response helpers ──

pub async fn body_bytes(resp: Response<Body>) -> Bytes {
    axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("read body")
}

pub async fn body_json(resp: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(resp).await).expect("JSON body")
}

/// Value of cookie `name` from the response's Set-Cookie headers.
pub fn set_cookie_value(resp: &Response<Body>, name: &str) -> Option<String> {
    let prefix = format!("{}=", name);
    resp.headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|v| {
            let first = v.split(';').next()?.trim();
            first
                .strip_prefix(&prefix)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        })
}

/// Full Set-Cookie header for cookie `name`, attributes included.
pub fn set_cookie_header(resp: &Response<Body>, name: &str) -> Option<String> {
    let prefix = format!("{}=", name);
    resp.headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with(&prefix))
        .map(str::to_string)
}

pub fn sorted_names(value: &serde_json::Value) -> Vec<String> {
    let mut names: Vec<String> = value
        .as_array()
        .expect("array of names")
        .iter()
        .map(|v| v.as_str().expect("name string").to_string())
        .collect();
    names.sort();
    names
}
