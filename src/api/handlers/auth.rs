//! Login, logout, session check, legacy API-key exchange and CAPTCHA issue.

use super::{AppState, AuthSettings};
use crate::api::errors::CdnError;
use crate::api::extractors::{
    cookie_value, session_tokens, LoginForm, RequestCredentials, CAPTCHA_COOKIE, SESSION_COOKIE,
};
use crate::captcha::{new_slot_id, CHALLENGE_TTL};
use crate::config::AuthMode;
use crate::session::{Session, SessionScope};
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    valid: bool,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    session_token: String,
    expires_at: DateTime<Utc>,
}

fn cookie_header(value: String) -> Result<HeaderValue, CdnError> {
    HeaderValue::from_str(&value)
        .map_err(|e| CdnError::Internal(format!("invalid Set-Cookie value: {}", e)))
}

fn session_cookie(session: &Session, settings: &AuthSettings) -> Result<HeaderValue, CdnError> {
    let max_age = session.remaining_secs(session.issued_at);
    let secure = if settings.cookie_secure { "; Secure" } else { "" };
    cookie_header(format!(
        "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}{}",
        SESSION_COOKIE, session.token, max_age, secure
    ))
}

fn expired_cookie(name: &str, settings: &AuthSettings) -> Result<HeaderValue, CdnError> {
    let secure = if settings.cookie_secure { "; Secure" } else { "" };
    cookie_header(format!(
        "{}=; HttpOnly; SameSite=Strict; Path=/; Max-Age=0{}",
        name, secure
    ))
}

/// POST /api/auth/login: verify credentials (and CAPTCHA), start a session.
pub async fn login(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    form: LoginForm,
) -> Result<Response, CdnError> {
    let RequestCredentials(credentials) = RequestCredentials::from_headers(&headers);
    let mut response_headers = HeaderMap::new();

    if state.auth.captcha_enabled {
        let slot = cookie_value(&headers, CAPTCHA_COOKIE);
        // The slot is consumed here whether or not the answer is right.
        response_headers.insert(
            header::SET_COOKIE,
            expired_cookie(CAPTCHA_COOKIE, &state.auth)?,
        );
        if !state
            .captcha
            .verify(slot.as_deref(), form.captcha_text.as_deref())
        {
            warn!("Login rejected: CAPTCHA mismatch");
            return Ok((
                response_headers,
                CdnError::Unauthenticated("Invalid CAPTCHA"),
            )
                .into_response());
        }
    }

    let username = form.username.as_deref().unwrap_or("");
    let password = form.password.as_deref().unwrap_or("");
    if !state.admin.verify(username, password) {
        warn!("Login rejected: bad credentials");
        return Ok((
            response_headers,
            CdnError::Unauthenticated("Incorrect username or password"),
        )
            .into_response());
    }

    if !state.access.origin_allowed(credentials.origin.as_deref()) {
        warn!("Login rejected: origin not allowed");
        return Ok((response_headers, CdnError::Forbidden("Not authorized")).into_response());
    }

    let session = state.sessions().create(
        state.admin.username(),
        SessionScope::Admin,
        credentials.origin.as_deref(),
    );
    info!(expires_at = %session.expires_at, "Administrator logged in");

    let body = match state.auth.mode {
        AuthMode::Cookie => {
            response_headers.append(header::SET_COOKIE, session_cookie(&session, &state.auth)?);
            LoginResponse {
                ok: true,
                session_token: None,
                expires_at: None,
            }
        }
        AuthMode::Bearer => LoginResponse {
            ok: true,
            session_token: Some(session.token.clone()),
            expires_at: Some(session.expires_at),
        },
    };

    Ok((StatusCode::OK, response_headers, Json(body)).into_response())
}

/// GET /logout: clear the session cookie and drop the session.
///
/// Eviction is best-effort: if the request does not carry the token, the
/// entry is left to expire on its own.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, CdnError> {
    let tokens = session_tokens(&headers);
    for token in &tokens {
        state.sessions().destroy(token);
    }
    if !tokens.is_empty() {
        info!("Administrator logged out");
    }

    let mut resp_headers = HeaderMap::new();
    resp_headers.insert(
        header::SET_COOKIE,
        expired_cookie(SESSION_COOKIE, &state.auth)?,
    );

    Ok((
        StatusCode::OK,
        resp_headers,
        Json(LoginResponse {
            ok: true,
            session_token: None,
            expires_at: None,
        }),
    )
        .into_response())
}

/// GET /api/auth/session: check if the current session is valid.
pub async fn check_session(
    State(state): State<Arc<AppState>>,
    RequestCredentials(credentials): RequestCredentials,
) -> Json<SessionResponse> {
    let valid = state.access.authorize_admin(&credentials).is_allowed();
    Json(SessionResponse { valid })
}

/// POST /auth: exchange the legacy API key for a read-only session token
/// bound to the request origin. The token reads `/cdn` and nothing else.
pub async fn api_key_auth(
    State(state): State<Arc<AppState>>,
    RequestCredentials(credentials): RequestCredentials,
) -> Result<Json<TokenResponse>, CdnError> {
    let key_ok = credentials
        .api_key
        .as_deref()
        .map(|k| state.access.api_key_matches(k))
        .unwrap_or(false);
    if !key_ok {
        return Err(CdnError::Forbidden("Invalid or missing API key"));
    }
    if !state.access.origin_allowed(credentials.origin.as_deref()) {
        return Err(CdnError::Forbidden("Not authorized"));
    }

    let session = state.sessions().create(
        state.admin.username(),
        SessionScope::ReadOnly,
        credentials.origin.as_deref(),
    );
    info!("Issued read-only session token for API key");

    Ok(Json(TokenResponse {
        session_token: session.token,
        expires_at: session.expires_at,
    }))
}

/// GET /api/captcha: issue a fresh challenge for this browser.
pub async fn issue_captcha(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, CdnError> {
    if !state.auth.captcha_enabled {
        return Err(CdnError::NotFound);
    }

    let slot_id = cookie_value(&headers, CAPTCHA_COOKIE)
        .filter(|id| id.len() == 32 && id.chars().all(|c| c.is_ascii_hexdigit()))
        .unwrap_or_else(new_slot_id);
    let challenge = state.challenges.generate();
    state.captcha.put(&slot_id, challenge.answer);

    let secure = if state.auth.cookie_secure { "; Secure" } else { "" };
    let cookie = cookie_header(format!(
        "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}{}",
        CAPTCHA_COOKIE,
        slot_id,
        CHALLENGE_TTL.as_secs(),
        secure
    ))?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(challenge.content_type)),
            (header::CACHE_CONTROL, HeaderValue::from_static("no-store")),
            (header::SET_COOKIE, cookie),
        ],
        challenge.body,
    )
        .into_response())
}
