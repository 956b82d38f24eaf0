//! Offline layer configuration
//!
//! `OfflineConfig` is assembled through `OfflineConfigBuilder`, either directly,
//! from a TOML document or from environment variables. Durations in TOML and
//! in the environment are given in milliseconds.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default server URL
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:3000";
/// Default first-party health endpoint path
pub const DEFAULT_HEALTH_PATH: &str = "/api/health";
/// Default third-party resource used to detect internet reachability
pub const DEFAULT_INTERNET_PROBE_URL: &str = "https://www.google.com/favicon.ico";
/// Default ceiling for a single queued file, in bytes
pub const DEFAULT_MAX_FILE_BYTES: u64 = 3_000_000;
/// Default background sync tag
pub const DEFAULT_SYNC_TAG: &str = "offline-sync";

/// Offline layer configuration
#[derive(Debug, Clone, PartialEq)]
pub struct OfflineConfig {
    pub server_url: String,
    pub health_path: String,
    pub internet_probe_url: String,
    pub probe_timeout: Duration,
    pub poll_interval: Duration,
    pub notification_debounce: Duration,
    pub reconnect_settle: Duration,
    /// Periodic drain while online with pending work; `None` disables it
    pub periodic_sync_interval: Option<Duration>,
    pub max_file_bytes: u64,
    pub sync_tag: String,
    /// Whether the platform offers background sync registration
    pub background_sync: bool,
    /// Queue database file; `None` uses the platform data directory
    pub db_path: Option<PathBuf>,
    pub shell_assets: Vec<String>,
}

impl Default for OfflineConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            health_path: DEFAULT_HEALTH_PATH.to_string(),
            internet_probe_url: DEFAULT_INTERNET_PROBE_URL.to_string(),
            probe_timeout: Duration::from_millis(3000),
            poll_interval: Duration::from_millis(4000),
            notification_debounce: Duration::from_millis(1500),
            reconnect_settle: Duration::from_millis(1000),
            periodic_sync_interval: Some(Duration::from_secs(30)),
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            sync_tag: DEFAULT_SYNC_TAG.to_string(),
            background_sync: true,
            db_path: None,
            shell_assets: vec![
                "/".to_string(),
                "/icon.png".to_string(),
                "/manifest.json".to_string(),
                "/offline.html".to_string(),
            ],
        }
    }
}

impl OfflineConfig {
    /// Create a new OfflineConfigBuilder
    pub fn builder() -> OfflineConfigBuilder {
        OfflineConfigBuilder::default()
    }

    /// Parse a TOML document; absent keys keep their defaults
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let file: FileConfig = toml::from_str(source)?;
        file.into_builder().build()
    }

    /// Read and parse a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Build from `CLIENT_API_URL`, `OFFLINE_DB_PATH`, `OFFLINE_POLL_INTERVAL_MS`,
    /// `OFFLINE_PROBE_URL` and `OFFLINE_MAX_FILE_BYTES`
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut builder = Self::builder();
        if let Ok(url) = std::env::var("CLIENT_API_URL") {
            builder = builder.server_url(url);
        }
        if let Ok(path) = std::env::var("OFFLINE_DB_PATH") {
            builder = builder.db_path(path);
        }
        if let Ok(url) = std::env::var("OFFLINE_PROBE_URL") {
            builder = builder.internet_probe_url(url);
        }
        if let Ok(raw) = std::env::var("OFFLINE_POLL_INTERVAL_MS") {
            let ms = parse_number("OFFLINE_POLL_INTERVAL_MS", &raw)?;
            builder = builder.poll_interval(Duration::from_millis(ms));
        }
        if let Ok(raw) = std::env::var("OFFLINE_MAX_FILE_BYTES") {
            builder = builder.max_file_bytes(parse_number("OFFLINE_MAX_FILE_BYTES", &raw)?);
        }
        builder.build()
    }

    /// Full URL of the health endpoint
    pub fn health_url(&self) -> String {
        self.api_url(&self.health_path)
    }

    /// Join a path onto the server URL
    pub fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.server_url.trim_end_matches('/'), path)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        for url in [&self.server_url, &self.internet_probe_url] {
            reqwest::Url::parse(url).map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", url, e)))?;
        }
        if !self.health_path.starts_with('/') {
            return Err(ConfigError::InvalidValue {
                field: "health_path",
                reason: "must start with '/'".to_string(),
            });
        }
        let durations = [
            ("probe_timeout", self.probe_timeout),
            ("poll_interval", self.poll_interval),
        ];
        for (field, value) in durations {
            if value.is_zero() {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        if self.periodic_sync_interval.is_some_and(|d| d.is_zero()) {
            return Err(ConfigError::InvalidValue {
                field: "periodic_sync_interval",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.max_file_bytes == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_file_bytes",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.sync_tag.is_empty() {
            return Err(ConfigError::MissingValue("sync_tag"));
        }
        Ok(())
    }
}

fn parse_number(field: &'static str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim().parse::<u64>().map_err(|e| ConfigError::InvalidValue {
        field,
        reason: e.to_string(),
    })
}

/// Builder for OfflineConfig
#[derive(Debug, Default)]
pub struct OfflineConfigBuilder {
    config: OfflineConfig,
}

impl OfflineConfigBuilder {
    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.config.server_url = url.into();
        self
    }

    pub fn health_path(mut self, path: impl Into<String>) -> Self {
        self.config.health_path = path.into();
        self
    }

    pub fn internet_probe_url(mut self, url: impl Into<String>) -> Self {
        self.config.internet_probe_url = url.into();
        self
    }

    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.config.probe_timeout = timeout;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    pub fn notification_debounce(mut self, debounce: Duration) -> Self {
        self.config.notification_debounce = debounce;
        self
    }

    pub fn reconnect_settle(mut self, settle: Duration) -> Self {
        self.config.reconnect_settle = settle;
        self
    }

    pub fn periodic_sync_interval(mut self, interval: Option<Duration>) -> Self {
        self.config.periodic_sync_interval = interval;
        self
    }

    pub fn max_file_bytes(mut self, bytes: u64) -> Self {
        self.config.max_file_bytes = bytes;
        self
    }

    pub fn sync_tag(mut self, tag: impl Into<String>) -> Self {
        self.config.sync_tag = tag.into();
        self
    }

    pub fn background_sync(mut self, supported: bool) -> Self {
        self.config.background_sync = supported;
        self
    }

    pub fn db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.db_path = Some(path.into());
        self
    }

    pub fn shell_assets(mut self, assets: Vec<String>) -> Self {
        self.config.shell_assets = assets;
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<OfflineConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// On-disk TOML shape
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    server_url: Option<String>,
    health_path: Option<String>,
    internet_probe_url: Option<String>,
    probe_timeout_ms: Option<u64>,
    poll_interval_ms: Option<u64>,
    notification_debounce_ms: Option<u64>,
    reconnect_settle_ms: Option<u64>,
    /// 0 disables periodic sync
    periodic_sync_interval_ms: Option<u64>,
    max_file_bytes: Option<u64>,
    sync_tag: Option<String>,
    background_sync: Option<bool>,
    db_path: Option<PathBuf>,
    shell_assets: Option<Vec<String>>,
}

impl FileConfig {
    fn into_builder(self) -> OfflineConfigBuilder {
        let mut builder = OfflineConfig::builder();
        if let Some(url) = self.server_url {
            builder = builder.server_url(url);
        }
        if let Some(path) = self.health_path {
            builder = builder.health_path(path);
        }
        if let Some(url) = self.internet_probe_url {
            builder = builder.internet_probe_url(url);
        }
        if let Some(ms) = self.probe_timeout_ms {
            builder = builder.probe_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = self.poll_interval_ms {
            builder = builder.poll_interval(Duration::from_millis(ms));
        }
        if let Some(ms) = self.notification_debounce_ms {
            builder = builder.notification_debounce(Duration::from_millis(ms));
        }
        if let Some(ms) = self.reconnect_settle_ms {
            builder = builder.reconnect_settle(Duration::from_millis(ms));
        }
        if let Some(ms) = self.periodic_sync_interval_ms {
            builder = builder.periodic_sync_interval((ms > 0).then(|| Duration::from_millis(ms)));
        }
        if let Some(bytes) = self.max_file_bytes {
            builder = builder.max_file_bytes(bytes);
        }
        if let Some(tag) = self.sync_tag {
            builder = builder.sync_tag(tag);
        }
        if let Some(supported) = self.background_sync {
            builder = builder.background_sync(supported);
        }
        if let Some(path) = self.db_path {
            builder = builder.db_path(path);
        }
        if let Some(assets) = self.shell_assets {
            builder = builder.shell_assets(assets);
        }
        builder
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("missing value: {0}")]
    MissingValue(&'static str),
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
}
