//! Ingestion Configuration Settings
//!
//! Configuration types for the streaming core, loaded from environment variables.

use std::time::Duration;

use reqwest::Url;
use uuid::Uuid;

/// Default chat backend base URL.
const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Default live tick socket base URL.
const DEFAULT_LIVE_URL: &str = "ws://localhost:8000/ws/live";

/// Session bearer token.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken(String);

impl AuthToken {
    /// Wrap a token, rejecting blank values.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Option<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            None
        } else {
            Some(Self(token))
        }
    }

    /// Get the raw token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AuthToken([REDACTED])")
    }
}

/// Chat reply settings.
#[derive(Debug, Clone)]
pub struct ReplySettings {
    /// Base URL of the chat backend.
    pub api_url: Url,
    /// Bearer token for authenticated sessions.
    pub auth_token: Option<AuthToken>,
    /// TCP connect timeout. There is no read timeout.
    pub connect_timeout: Duration,
    /// Capacity of the per-request event channel.
    pub channel_capacity: usize,
}

impl Default for ReplySettings {
    fn default() -> Self {
        Self {
            api_url: default_url(DEFAULT_API_URL),
            auth_token: None,
            connect_timeout: Duration::from_secs(10),
            channel_capacity: 64,
        }
    }
}

impl ReplySettings {
    /// Endpoint for a one-off message outside any session.
    #[must_use]
    pub fn anonymous_endpoint(&self) -> String {
        with_segments(&self.api_url, &["chat", "anonymous", "message"])
    }

    /// Endpoint for a message within a persisted session.
    #[must_use]
    pub fn session_endpoint(&self, session_id: Uuid) -> String {
        let session_id = session_id.to_string();
        with_segments(&self.api_url, &["chat", "sessions", &session_id, "messages"])
    }
}

/// Live tick socket settings.
#[derive(Debug, Clone)]
pub struct LiveSettings {
    /// Socket base URL; the symbol is appended as a path segment.
    pub live_url: Url,
    /// Fixed delay between reconnect attempts.
    pub reconnect_delay: Duration,
    /// Consecutive failures before the subscription fails.
    pub max_reconnect_attempts: u32,
}

impl Default for LiveSettings {
    fn default() -> Self {
        Self {
            live_url: default_url(DEFAULT_LIVE_URL),
            reconnect_delay: Duration::from_millis(3000),
            max_reconnect_attempts: 5,
        }
    }
}

impl LiveSettings {
    /// Socket URL for one symbol.
    ///
    /// The symbol is percent-encoded as a single path segment.
    #[must_use]
    pub fn symbol_url(&self, symbol: &str) -> String {
        with_segments(&self.live_url, &[symbol])
    }
}

/// Complete ingestion configuration.
#[derive(Debug, Clone, Default)]
pub struct IngestConfig {
    /// Chat reply settings.
    pub reply: ReplySettings,
    /// Live tick settings.
    pub live: LiveSettings,
    /// Prometheus metrics port (0 = disabled).
    pub metrics_port: u16,
}

impl IngestConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a URL variable is set but not a valid URL.
    pub fn from_env() -> Result<Self, ConfigError> {
        let reply_defaults = ReplySettings::default();
        let live_defaults = LiveSettings::default();

        let reply = ReplySettings {
            api_url: parse_env_url("SURGE_API_URL", DEFAULT_API_URL, &["http", "https"])?,
            auth_token: std::env::var("SURGE_AUTH_TOKEN")
                .ok()
                .and_then(AuthToken::new),
            connect_timeout: parse_env_duration_secs(
                "SURGE_CONNECT_TIMEOUT_SECS",
                reply_defaults.connect_timeout,
            ),
            channel_capacity: parse_env_usize(
                "SURGE_REPLY_CHANNEL_CAPACITY",
                reply_defaults.channel_capacity,
            )
            .max(1),
        };

        let live = LiveSettings {
            live_url: parse_env_url("SURGE_LIVE_URL", DEFAULT_LIVE_URL, &["ws", "wss"])?,
            reconnect_delay: parse_env_duration_millis(
                "SURGE_RECONNECT_DELAY_MS",
                live_defaults.reconnect_delay,
            ),
            max_reconnect_attempts: parse_env_u32(
                "SURGE_MAX_RECONNECT_ATTEMPTS",
                live_defaults.max_reconnect_attempts,
            ),
        };

        Ok(Self {
            reply,
            live,
            metrics_port: parse_env_u16("SURGE_METRICS_PORT", 0),
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Variable holds something that is not a URL.
    #[error("{key} is not a valid URL: {reason}")]
    InvalidUrl {
        /// Environment variable name.
        key: String,
        /// Parser message.
        reason: String,
    },
    /// URL uses a scheme this endpoint cannot speak.
    #[error("{key} must use one of {expected:?}, got {scheme}")]
    UnsupportedScheme {
        /// Environment variable name.
        key: String,
        /// Scheme found.
        scheme: String,
        /// Accepted schemes.
        expected: Vec<String>,
    },
}

/// Parse a URL, checking its scheme.
///
/// # Errors
///
/// Returns an error if the value does not parse or has the wrong scheme.
pub fn parse_url(key: &str, raw: &str, schemes: &[&str]) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim()).map_err(|e| ConfigError::InvalidUrl {
        key: key.to_string(),
        reason: e.to_string(),
    })?;

    if !schemes.contains(&url.scheme()) {
        return Err(ConfigError::UnsupportedScheme {
            key: key.to_string(),
            scheme: url.scheme().to_string(),
            expected: schemes.iter().map(ToString::to_string).collect(),
        });
    }

    Ok(url)
}

fn parse_env_url(key: &str, default: &str, schemes: &[&str]) -> Result<Url, ConfigError> {
    let raw = std::env::var(key).unwrap_or_else(|_| default.to_string());
    parse_url(key, &raw, schemes)
}

#[allow(clippy::expect_used)]
fn default_url(raw: &str) -> Url {
    Url::parse(raw).expect("built-in default URL is valid")
}

fn with_segments(base: &Url, segments: &[&str]) -> String {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url.into()
}

fn parse_env_u16(key: &str, default: u16) -> u16 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_duration_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_env_duration_millis(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
