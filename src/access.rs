//! Access decisions for image reads and administrative operations, plus
//! the administrator credential check used by login.

use crate::session::{Session, SessionScope, SessionStore};
use crate::types::Category;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::debug;

/// Credentials presented by a request, as pulled out of headers/cookies.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    /// Every session token presented, in lookup order. The first one that
    /// validates is used.
    pub session_tokens: Vec<String>,
    pub api_key: Option<String>,
    pub origin: Option<String>,
}

/// Why a request was denied, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    Unauthenticated,
    InvalidSession,
    OriginNotAllowed,
}

impl DenyReason {
    /// Coarse label for logs. Never echoed to clients verbatim.
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::Unauthenticated => "unauthenticated",
            DenyReason::InvalidSession => "invalid session",
            DenyReason::OriginNotAllowed => "origin not allowed",
        }
    }
}

/// How a request was let through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Grant {
    /// Resource needs no credentials.
    Anonymous,
    /// Legacy shared API key.
    ApiKey,
    Session(Session),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow(Grant),
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow(_))
    }
}

/// Origins that may present credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedOrigins {
    Any,
    List(HashSet<String>),
}

impl AllowedOrigins {
    /// Build from configured entries; a `*` entry (or no entries) means any.
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut list = HashSet::new();
        for entry in entries {
            let entry = entry.as_ref().trim();
            if entry == "*" {
                return Self::Any;
            }
            if !entry.is_empty() {
                list.insert(entry.trim_end_matches('/').to_string());
            }
        }
        if list.is_empty() {
            Self::Any
        } else {
            Self::List(list)
        }
    }

    pub fn contains(&self, origin: &str) -> bool {
        match self {
            Self::Any => true,
            Self::List(list) => list.contains(origin.trim_end_matches('/')),
        }
    }
}

/// Decides whether a request may touch a resource.
pub struct AccessController {
    sessions: Arc<dyn SessionStore>,
    allowed_origins: AllowedOrigins,
    origin_binding: bool,
    api_key: Option<String>,
}

impl AccessController {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        allowed_origins: AllowedOrigins,
        origin_binding: bool,
        api_key: Option<String>,
    ) -> Self {
        Self {
            sessions,
            allowed_origins,
            origin_binding,
            api_key: api_key.filter(|k| !k.is_empty()),
        }
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    /// Decide a read of an image in `category`.
    pub fn authorize(&self, category: Category, credentials: &Credentials) -> Decision {
        if category == Category::Public {
            return Decision::Allow(Grant::Anonymous);
        }
        self.decide(credentials, true)
    }

    /// Decide an administrative operation (list, upload, delete). Only an
    /// admin-scoped session is accepted here. The API key, and sessions
    /// exchanged for it, are read credentials.
    pub fn authorize_admin(&self, credentials: &Credentials) -> Decision {
        self.decide(credentials, false)
    }

    /// Whether `key` equals the configured legacy API key.
    pub fn api_key_matches(&self, key: &str) -> bool {
        match &self.api_key {
            Some(expected) => constant_time_eq(key, expected),
            None => false,
        }
    }

    /// Whether a request `Origin` passes the configured allow-list.
    pub fn origin_allowed(&self, origin: Option<&str>) -> bool {
        if !self.origin_binding {
            return true;
        }
        origin.map_or(true, |o| self.allowed_origins.contains(o))
    }

    fn decide(&self, credentials: &Credentials, read_only: bool) -> Decision {
        let api_key = credentials.api_key.as_deref().filter(|_| read_only);
        if credentials.session_tokens.is_empty() && api_key.is_none() {
            return self.deny(DenyReason::Unauthenticated);
        }

        let origin = credentials.origin.as_deref();
        let grant = match api_key.filter(|k| self.api_key_matches(k)) {
            Some(_) => Grant::ApiKey,
            None => {
                let session = credentials
                    .session_tokens
                    .iter()
                    .filter_map(|token| self.sessions.validate(token, origin))
                    .find(|session| read_only || session.scope == SessionScope::Admin);
                match session {
                    Some(session) => Grant::Session(session),
                    None => return self.deny(DenyReason::InvalidSession),
                }
            }
        };

        if !self.origin_allowed(origin) {
            return self.deny(DenyReason::OriginNotAllowed);
        }

        Decision::Allow(grant)
    }

    fn deny(&self, reason: DenyReason) -> Decision {
        debug!(reason = reason.as_str(), "access denied");
        Decision::Deny(reason)
    }
}

/// The single administrator identity.
#[derive(Clone)]
pub struct AdminCredentials {
    username: String,
    password: String,
    password_hash: Option<String>,
}

impl std::fmt::Debug for AdminCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminCredentials")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl AdminCredentials {
    /// `password_hash`, when present, is a bcrypt hash that takes precedence
    /// over the plaintext `password`.
    pub fn new(username: String, password: String, password_hash: Option<String>) -> Self {
        Self {
            username,
            password,
            password_hash: password_hash.filter(|h| !h.is_empty()),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Check a submitted username/password pair.
    ///
    /// Both fields are always compared so the response time does not tell
    /// which one was wrong.
    pub fn verify(&self, username: &str, password: &str) -> bool {
        let user_ok = constant_time_eq(username, &self.username);
        let pass_ok = match &self.password_hash {
            Some(hash) => bcrypt::verify(password, hash).unwrap_or(false),
            None => constant_time_eq(password, &self.password),
        };
        user_ok & pass_ok
    }
}

/// Compare two secrets without leaking their length or common prefix
/// through timing: both sides are hashed to 32 bytes first.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = Sha256::digest(a.as_bytes());
    let b = Sha256::digest(b.as_bytes());
    a.as_slice().ct_eq(b.as_slice()).into()
}
