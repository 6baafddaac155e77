//! Configuration file parser for ~/.config/feedline/config.toml.
//!
//! The config file is optional and a missing file yields `Config::default()`.
//! Unknown keys are accepted by serde but logged as warnings, since they are
//! usually typos.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::feed::{FetchConfig, DEFAULT_USER_AGENT};
use crate::refresh::SchedulerConfig;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

const KNOWN_KEYS: [&str; 10] = [
    "database_path",
    "refresh_interval_minutes",
    "min_refresh_interval_secs",
    "initial_delay_secs",
    "request_timeout_secs",
    "max_retries",
    "retry_backoff_ms",
    "proxy_url",
    "user_agent",
    "allow_private_networks",
];

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
///
/// The Debug impl masks the query of `proxy_url`, which commonly carries an
/// access token.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database file. Defaults to `feeds.db` next to the config file.
    pub database_path: Option<PathBuf>,

    /// Minutes between automatic refreshes. 0 = refresh once at startup only.
    pub refresh_interval_minutes: u64,

    /// Refreshes requested sooner than this after the previous one are skipped.
    pub min_refresh_interval_secs: u64,

    /// Delay before the first automatic refresh.
    pub initial_delay_secs: u64,

    pub request_timeout_secs: u64,

    /// Retries for rate-limited, server-error and truncated responses.
    pub max_retries: u32,

    /// Base retry delay, doubled on each retry.
    pub retry_backoff_ms: u64,

    /// Fetch through `<proxy_url>?url=<target>` instead of directly.
    pub proxy_url: Option<String>,

    pub user_agent: Option<String>,

    /// Allow feeds on loopback and private network addresses.
    pub allow_private_networks: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            refresh_interval_minutes: 60,
            min_refresh_interval_secs: 60,
            initial_delay_secs: 5,
            request_timeout_secs: 30,
            max_retries: 3,
            retry_backoff_ms: 1000,
            proxy_url: None,
            user_agent: None,
            allow_private_networks: false,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("database_path", &self.database_path)
            .field("refresh_interval_minutes", &self.refresh_interval_minutes)
            .field("min_refresh_interval_secs", &self.min_refresh_interval_secs)
            .field("initial_delay_secs", &self.initial_delay_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("proxy_url", &self.proxy_url.as_deref().map(redact_query))
            .field("user_agent", &self.user_agent)
            .field("allow_private_networks", &self.allow_private_networks)
            .finish()
    }
}

fn redact_query(url: &str) -> String {
    match url.split_once('?') {
        Some((base, _)) => format!("{base}?[REDACTED]"),
        None => url.to_owned(),
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check size before reading so a huge file is never loaded.
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            refresh_interval_minutes = config.refresh_interval_minutes,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Database location, resolved against `config_dir` when unset.
    pub fn database_path_in(&self, config_dir: &Path) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| config_dir.join("feeds.db"))
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            initial_delay: Duration::from_secs(self.initial_delay_secs),
            period: Duration::from_secs(self.refresh_interval_minutes.saturating_mul(60)),
            min_interval: Duration::from_secs(self.min_refresh_interval_secs),
        }
    }

    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            max_retries: self.max_retries,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
            proxy_url: self.proxy_url.clone(),
            user_agent: self
                .user_agent
                .clone()
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_owned()),
            allow_private_networks: self.allow_private_networks,
            ..FetchConfig::default()
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
