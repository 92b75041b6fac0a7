//! Configuration management for publoader
//!
//! Configuration is loaded from `PUBLOADER_*` environment variables or from a
//! TOML file, and validated once at startup.
//!
//! ```toml
//! [orchestrator]
//! extensions_dir = "extensions"
//! schedule_path = "schedule.json"
//! fetch_timeout_secs = 900
//! max_concurrent_extensions = 8
//! daily_sweep_hour = 1
//!
//! [storage]
//! state_path = "data/state.db"
//!
//! [upload]
//! webhook_url = "https://uploader.example.com/dispatch"
//!
//! [logging]
//! level = "info"
//! format = "text"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::scheduler::DEFAULT_SWEEP_HOUR;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub orchestrator: OrchestratorConfig,
    pub storage: StorageConfig,
    pub upload: UploadConfig,
    pub logging: LoggingConfig,
}

/// Scheduling and run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Directory holding one sub-directory per extension
    pub extensions_dir: PathBuf,

    /// Schedule overrides, re-read every tick
    pub schedule_path: PathBuf,

    /// Bound on the fetch phase of one run
    pub fetch_timeout_secs: u64,

    /// Extensions running at the same time
    pub max_concurrent_extensions: usize,

    /// Hour (UTC) of the daily catch-up sweep
    pub daily_sweep_hour: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            extensions_dir: PathBuf::from("extensions"),
            schedule_path: PathBuf::from("schedule.json"),
            fetch_timeout_secs: 900,
            max_concurrent_extensions: 8,
            daily_sweep_hour: DEFAULT_SWEEP_HOUR,
        }
    }
}

/// State store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database path
    pub state_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_path: PathBuf::from("data/state.db"),
        }
    }
}

/// Upload sink configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Webhook receiving decisions; without one decisions are only logged
    pub webhook_url: Option<String>,

    /// Bearer token sent to the webhook
    pub auth_token: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::from("info"),
            format: String::from("text"),
        }
    }
}

/// Parse an optional environment variable
fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("Invalid value for {key}: {value:?}")),
        Err(_) => Ok(None),
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        let orchestrator = &mut config.orchestrator;

        if let Some(dir) = env_parse::<PathBuf>("PUBLOADER_EXTENSIONS_DIR")? {
            orchestrator.extensions_dir = dir;
        }
        if let Some(path) = env_parse::<PathBuf>("PUBLOADER_SCHEDULE_PATH")? {
            orchestrator.schedule_path = path;
        }
        if let Some(secs) = env_parse("PUBLOADER_FETCH_TIMEOUT")? {
            orchestrator.fetch_timeout_secs = secs;
        }
        if let Some(max) = env_parse("PUBLOADER_MAX_CONCURRENT")? {
            orchestrator.max_concurrent_extensions = max;
        }
        if let Some(hour) = env_parse("PUBLOADER_DAILY_SWEEP_HOUR")? {
            orchestrator.daily_sweep_hour = hour;
        }

        if let Some(path) = env_parse::<PathBuf>("PUBLOADER_STATE_PATH")? {
            config.storage.state_path = path;
        }

        config.upload.webhook_url = std::env::var("PUBLOADER_UPLOAD_WEBHOOK")
            .ok()
            .filter(|url| !url.trim().is_empty());
        config.upload.auth_token = std::env::var("PUBLOADER_UPLOAD_TOKEN").ok();

        if let Ok(level) = std::env::var("PUBLOADER_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(format) = std::env::var("PUBLOADER_LOG_FORMAT") {
            config.logging.format = format;
        }

        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.orchestrator.max_concurrent_extensions == 0 {
            anyhow::bail!("max_concurrent_extensions must be greater than 0");
        }

        if self.orchestrator.fetch_timeout_secs == 0 {
            anyhow::bail!("fetch_timeout_secs must be greater than 0");
        }

        if self.orchestrator.daily_sweep_hour > 23 {
            anyhow::bail!(
                "daily_sweep_hour must be 0-23, got {}",
                self.orchestrator.daily_sweep_hour
            );
        }

        if !matches!(self.logging.format.as_str(), "text" | "json") {
            anyhow::bail!("logging.format must be 'text' or 'json'");
        }

        Ok(())
    }

    /// Get fetch timeout as Duration
    #[must_use]
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.orchestrator.fetch_timeout_secs)
    }
}
