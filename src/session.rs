//! In-memory session store for administrator authentication.
//!
//! Sessions live only in process memory: a restart logs everyone out.
//! Expired entries are evicted lazily when they are next validated; there
//! is no background sweep.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// What a session may be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionScope {
    /// Administrator login: private reads plus list, upload and delete.
    Admin,
    /// Exchanged for the legacy API key: private reads only.
    ReadOnly,
}

/// One authenticated login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub username: String,
    pub scope: SessionScope,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub origin_hint: Option<String>,
}

impl Session {
    /// A session is valid up to and including its expiry instant.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        now <= self.expires_at
    }

    /// Seconds until expiry, clamped at zero. Used for cookie `Max-Age`.
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds().max(0)
    }
}

/// Source of "now" for session expiry.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock for time-travel in tests.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        *self.now.lock() += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Session table contract shared by handlers.
pub trait SessionStore: Send + Sync {
    /// Issue a fresh token for `username`, remembering the request origin.
    fn create(&self, username: &str, scope: SessionScope, origin_hint: Option<&str>) -> Session;

    /// Look up a live session. Any failed lookup evicts the entry.
    fn validate(&self, token: &str, origin_hint: Option<&str>) -> Option<Session>;

    /// Remove a session unconditionally.
    fn destroy(&self, token: &str);

    /// Number of stored entries, including expired ones not yet evicted.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Thread-safe in-memory session store.
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    ttl: chrono::Duration,
    bind_origin: bool,
    clock: Arc<dyn Clock>,
}

impl MemorySessionStore {
    pub fn new(ttl: Duration, bind_origin: bool) -> Self {
        Self::with_clock(ttl, bind_origin, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, bind_origin: bool, clock: Arc<dyn Clock>) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(365));
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
            bind_origin,
            clock,
        }
    }

    /// 32 random bytes as a 64-char hex string.
    fn generate_token() -> String {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill(&mut bytes);
        hex::encode(bytes)
    }

    fn origin_matches(&self, stored: Option<&str>, presented: Option<&str>) -> bool {
        if !self.bind_origin {
            return true;
        }
        match (stored, presented) {
            (Some(stored), Some(presented)) => stored == presented,
            _ => true,
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn create(&self, username: &str, scope: SessionScope, origin_hint: Option<&str>) -> Session {
        let issued_at = self.clock.now();
        let session = Session {
            token: Self::generate_token(),
            username: username.to_string(),
            scope,
            issued_at,
            expires_at: issued_at + self.ttl,
            origin_hint: origin_hint.map(str::to_string),
        };

        self.sessions
            .write()
            .insert(session.token.clone(), session.clone());

        session
    }

    fn validate(&self, token: &str, origin_hint: Option<&str>) -> Option<Session> {
        let now = self.clock.now();
        {
            let sessions = self.sessions.read();
            match sessions.get(token) {
                None => return None,
                Some(session)
                    if session.is_live(now)
                        && self.origin_matches(session.origin_hint.as_deref(), origin_hint) =>
                {
                    return Some(session.clone());
                }
                Some(_) => {}
            }
        }

        // Re-check under the write lock: another request may have replaced
        // or already evicted the entry between the two lock acquisitions.
        let mut sessions = self.sessions.write();
        if let Some(session) = sessions.get(token) {
            if session.is_live(now)
                && self.origin_matches(session.origin_hint.as_deref(), origin_hint)
            {
                return Some(session.clone());
            }
            tracing::debug!(expires_at = %session.expires_at, "evicting rejected session");
            sessions.remove(token);
        }
        None
    }

    fn destroy(&self, token: &str) {
        self.sessions.write().remove(token);
    }

    fn len(&self) -> usize {
        self.sessions.read().len()
    }
}
