//! Daemon configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::info;
use usbwatch_core::CollectorConfig;
use usbwatch_monitor::MonitorConfig;

/// Daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Monitor timing
    #[serde(default)]
    pub monitor: MonitorSection,
    /// Enumeration command settings
    #[serde(default)]
    pub collector: CollectorConfig,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), format: LogFormat::default() }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// `[monitor]` table, in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MonitorSection {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_native_poll_timeout_ms")]
    pub native_poll_timeout_ms: u64,
    #[serde(default = "default_kernel_poll_timeout_ms")]
    pub kernel_poll_timeout_ms: u64,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Poll and diff listings even where native notifications exist
    #[serde(default)]
    pub force_polling: bool,
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            native_poll_timeout_ms: default_native_poll_timeout_ms(),
            kernel_poll_timeout_ms: default_kernel_poll_timeout_ms(),
            debounce_ms: default_debounce_ms(),
            force_polling: false,
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_native_poll_timeout_ms() -> u64 {
    100
}

fn default_kernel_poll_timeout_ms() -> u64 {
    1000
}

fn default_debounce_ms() -> u64 {
    300
}

impl MonitorSection {
    #[must_use]
    pub fn to_monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            native_poll_timeout: Duration::from_millis(self.native_poll_timeout_ms),
            kernel_poll_timeout: Duration::from_millis(self.kernel_poll_timeout_ms),
            debounce_window: Duration::from_millis(self.debounce_ms),
            force_polling: self.force_polling,
        }
    }
}

/// Load configuration from `explicit`, or from the default location.
///
/// A missing default file means defaults; a missing explicit file is an error.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let config_path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let path = config_path()?;
            if !path.exists() {
                info!(?path, "Config file not found, using defaults");
                return Ok(Config::default());
            }
            path
        }
    };

    let content = std::fs::read_to_string(&config_path)
        .with_context(|| format!("Failed to read config file: {config_path:?}"))?;
    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {config_path:?}"))?;
    Ok(config)
}

/// Get the configuration file path.
fn config_path() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("com", "usbwatch", "usbwatch")
        .context("Could not determine config directory")?;
    Ok(dirs.config_dir().join("config.toml"))
}
