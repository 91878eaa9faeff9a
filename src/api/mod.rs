//! HTTP API: routing, extractors, handlers and error responses

mod errors;
mod extractors;
pub mod handlers;

pub use errors::CdnError;
pub use extractors::{
    cookie_value, session_tokens, AdminSession, LoginForm, RequestCredentials, CAPTCHA_COOKIE,
    SESSION_COOKIE,
};
pub use handlers::{router, AppState, AuthSettings};
