//! Floorwatch Configuration
//!
//! Defaults match the collector's observed deployment; every field can be
//! overridden from the environment. Invalid values are ignored with a warning.

use std::time::Duration;
use tracing::warn;

/// Runtime configuration shared by the library and the replay binary
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// Collector endpoint receiving reports (POST)
    pub endpoint: String,
    /// SQLite file backing the key/value store
    pub db_path: String,
    /// Namespace prefix for every persisted key
    pub key_prefix: String,
    /// Auctions started this long before a new `auction-init` are purged
    pub stale_window_ms: i64,
    /// Reports older than this are dropped from the event history
    pub history_window_ms: i64,
    /// Maximum number of reports retained in the event history
    pub history_cap: usize,
    /// Attach the event history to every outgoing report
    pub attach_history: bool,
    pub session_timeout_ms: i64,
    pub utm_timeout_ms: i64,
    /// None = no timeout; a hung request just leaves floors unreconciled
    pub http_timeout: Option<Duration>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://pf.rxthdr.com".to_string(),
            db_path: "floorwatch.db".to_string(),
            key_prefix: "floorwatch_".to_string(),
            stale_window_ms: 36_000,      // 6 * 6 seconds
            history_window_ms: 3_600_000, // 1 hour
            history_cap: 1000,
            attach_history: true,
            session_timeout_ms: 3_600_000,
            utm_timeout_ms: 3_600_000,
            http_timeout: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("FLOOR_ENDPOINT") {
            if !v.trim().is_empty() {
                config.endpoint = v.trim().to_string();
            }
        }
        if let Ok(v) = std::env::var("FLOOR_DB_PATH") {
            if !v.trim().is_empty() {
                config.db_path = v.trim().to_string();
            }
        }
        if let Ok(v) = std::env::var("FLOOR_KEY_PREFIX") {
            config.key_prefix = v;
        }
        if let Some(ms) = parse_positive("FLOOR_STALE_WINDOW_MS") {
            config.stale_window_ms = ms;
        }
        if let Some(ms) = parse_positive("FLOOR_HISTORY_WINDOW_MS") {
            config.history_window_ms = ms;
        }
        if let Some(cap) = parse_positive("FLOOR_HISTORY_CAP") {
            config.history_cap = cap as usize;
        }
        if let Ok(v) = std::env::var("FLOOR_ATTACH_HISTORY") {
            config.attach_history = matches!(v.as_str(), "1" | "true" | "TRUE" | "on" | "ON");
        }
        if let Some(ms) = parse_positive("FLOOR_SESSION_TIMEOUT_MS") {
            config.session_timeout_ms = ms;
        }
        if let Some(ms) = parse_positive("FLOOR_UTM_TIMEOUT_MS") {
            config.utm_timeout_ms = ms;
        }
        if let Some(ms) = parse_positive("FLOOR_HTTP_TIMEOUT_MS") {
            config.http_timeout = Some(Duration::from_millis(ms as u64));
        }

        config
    }
}

fn parse_positive(var: &str) -> Option<i64> {
    let raw = std::env::var(var).ok()?;
    match raw.trim().parse::<i64>() {
        Ok(v) if v > 0 => Some(v),
        _ => {
            warn!(var, value = %raw, "Ignoring invalid configuration value");
            None
        }
    }
}
