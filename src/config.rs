//! Configuration for the personal CDN server

use crate::storage::FilenamePolicy;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// How a successful login hands the session token back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// HTTP-only session cookie.
    #[default]
    Cookie,
    /// Token in the JSON body, presented back as `Authorization: Bearer`.
    Bearer,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Address to listen on
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Root directory holding the `public/` and `private/` image directories
    #[serde(default = "default_image_dir")]
    pub image_dir: PathBuf,

    /// Administrator login name
    #[serde(default = "default_admin_username")]
    pub admin_username: String,

    /// Administrator password (plaintext). Ignored when
    /// `admin_password_hash` is set.
    #[serde(default = "default_admin_password")]
    pub admin_password: String,

    /// Bcrypt hash of the administrator password.
    #[serde(default)]
    pub admin_password_hash: Option<String>,

    /// Legacy shared API key. When set, `x-api-key` grants read access to
    /// private images and can be exchanged for a session at `POST /auth`.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Origins allowed to make credentialed requests. `*` allows any.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,

    /// Enforce `allowed_origins` on private reads and bind sessions to the
    /// origin they were issued to.
    #[serde(default)]
    pub origin_binding: bool,

    /// Session lifetime, e.g. "1h" or "2h".
    #[serde(
        default = "default_session_ttl",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub session_ttl: Duration,

    #[serde(default)]
    pub auth_mode: AuthMode,

    /// Require a CAPTCHA answer on login.
    #[serde(default)]
    pub captcha_enabled: bool,

    /// Naming of uploads that do not request an explicit name.
    #[serde(default)]
    pub filename_policy: FilenamePolicy,

    /// Maximum upload size in bytes
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: u64,

    /// Mark the session cookie `Secure` (serve over HTTPS only).
    #[serde(default)]
    pub cookie_secure: bool,

    /// Log level filter string. Overridden by RUST_LOG.
    /// Default: "personal_cdn=debug,tower_http=debug"
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// Default value functions for serde
fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8000))
}

fn default_image_dir() -> PathBuf {
    PathBuf::from("./images")
}

fn default_admin_username() -> String {
    "admin".to_string()
}

fn default_admin_password() -> String {
    "admin123".to_string()
}

fn default_allowed_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_session_ttl() -> Duration {
    Duration::from_secs(60 * 60)
}

fn default_max_upload_size() -> u64 {
    10 * 1024 * 1024 // 10MB
}

fn default_log_level() -> String {
    "personal_cdn=debug,tower_http=debug".to_string()
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
}

fn serialize_duration<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&humantime::format_duration(*value).to_string())
}

fn env_flag(name: &str) -> Option<bool> {
    std::env::var(name)
        .ok()
        .map(|v| matches!(v.trim(), "1" | "true" | "yes" | "on"))
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            image_dir: default_image_dir(),
            admin_username: default_admin_username(),
            admin_password: default_admin_password(),
            admin_password_hash: None,
            api_key: None,
            allowed_origins: default_allowed_origins(),
            origin_binding: false,
            session_ttl: default_session_ttl(),
            auth_mode: AuthMode::default(),
            captcha_enabled: false,
            filename_policy: FilenamePolicy::default(),
            max_upload_size: default_max_upload_size(),
            cookie_secure: false,
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("CDN_LISTEN_ADDR") {
            config.listen_addr = addr
                .parse()
                .map_err(|_| ConfigError::InvalidEnv("CDN_LISTEN_ADDR"))?;
        }

        if let Ok(dir) = std::env::var("CDN_IMAGE_DIR") {
            config.image_dir = PathBuf::from(dir);
        }

        if let Ok(username) = std::env::var("CDN_ADMIN_USERNAME") {
            config.admin_username = username;
        }
        if let Ok(password) = std::env::var("CDN_ADMIN_PASSWORD") {
            config.admin_password = password;
        }
        config.admin_password_hash = std::env::var("CDN_ADMIN_PASSWORD_HASH").ok();
        config.api_key = std::env::var("CDN_API_KEY").ok().filter(|k| !k.is_empty());

        if let Ok(origins) = std::env::var("CDN_ALLOWED_ORIGINS") {
            config.allowed_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Some(flag) = env_flag("CDN_ORIGIN_BINDING") {
            config.origin_binding = flag;
        }

        if let Ok(ttl) = std::env::var("CDN_SESSION_TTL") {
            config.session_ttl = humantime::parse_duration(&ttl)
                .map_err(|_| ConfigError::InvalidEnv("CDN_SESSION_TTL"))?;
        }

        if let Ok(mode) = std::env::var("CDN_AUTH_MODE") {
            config.auth_mode = match mode.trim() {
                "cookie" => AuthMode::Cookie,
                "bearer" => AuthMode::Bearer,
                _ => return Err(ConfigError::InvalidEnv("CDN_AUTH_MODE")),
            };
        }

        if let Some(flag) = env_flag("CDN_CAPTCHA") {
            config.captcha_enabled = flag;
        }

        if let Ok(policy) = std::env::var("CDN_FILENAME_POLICY") {
            config.filename_policy = match policy.trim() {
                "preserve" => FilenamePolicy::Preserve,
                "random" => FilenamePolicy::Random,
                _ => return Err(ConfigError::InvalidEnv("CDN_FILENAME_POLICY")),
            };
        }

        if let Ok(size) = std::env::var("CDN_MAX_UPLOAD_SIZE") {
            config.max_upload_size = size
                .parse()
                .map_err(|_| ConfigError::InvalidEnv("CDN_MAX_UPLOAD_SIZE"))?;
        }

        if let Some(flag) = env_flag("CDN_COOKIE_SECURE") {
            config.cookie_secure = flag;
        }

        if let Ok(level) = std::env::var("CDN_LOG_LEVEL") {
            config.log_level = level;
        }

        Ok(config)
    }

    /// Load configuration from file if it exists, otherwise from environment
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = std::env::var("CDN_CONFIG") {
            return Self::from_file(&path);
        }

        for path in &["personal_cdn.toml", "/etc/personal_cdn/config.toml"] {
            if std::path::Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        Self::from_env()
    }

    /// True when the administrator still uses the shipped default password.
    pub fn uses_default_password(&self) -> bool {
        self.admin_password_hash.is_none() && self.admin_password == default_admin_password()
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("invalid value for env var {0}")]
    InvalidEnv(&'static str),
}
