//! Configuration file parsing and structures.
//!
//! alarmd keeps a single JSON configuration file. It is read once at
//! startup and rewritten on demand with a snapshot of the live state (see
//! the `PUT /configuration` route). A missing file is not an error: every
//! section has defaults and everything starts out disabled.

use std::collections::BTreeSet;
use std::path::Path;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use tracing_subscriber::filter::LevelFilter;

use crate::bus::DeviceId;

pub const DEFAULT_CONFIG_FILE: &str = "alarmd.json";
pub const DEFAULT_PORT: u16 = 9001;
pub const DEFAULT_FILTER_SECONDS: u64 = 5;

const DEFAULT_SMTP_PORT: u16 = 587;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read or write configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed configuration file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Top-level configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// HTTP control API listen port
    pub port: u16,

    /// Log level: trace, debug, info, warn, error
    pub log_level: LogLevel,

    pub alarm: AlarmConfig,
    pub push: PushConfig,
    pub email: EmailConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            log_level: LogLevel::default(),
            alarm: AlarmConfig::default(),
            push: PushConfig::default(),
            email: EmailConfig::default(),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

/// Alarm policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AlarmConfig {
    pub enabled: bool,

    /// Registered trigger sources. Duplicate ids collapse on load.
    pub trigger_sources: Vec<TriggerSourceConfig>,

    /// External veto command; empty or absent means no suppression check.
    pub suppress_command: Option<String>,

    /// Duplicate filter window in seconds
    pub filter_seconds: u64,
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            trigger_sources: Vec::new(),
            suppress_command: None,
            filter_seconds: DEFAULT_FILTER_SECONDS,
        }
    }
}

impl AlarmConfig {
    /// The configured trigger-source ids, de-duplicated.
    pub fn device_ids(&self) -> BTreeSet<DeviceId> {
        self.trigger_sources.iter().map(|s| s.device_id).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerSourceConfig {
    pub device_id: DeviceId,
}

/// Push notification channel configuration
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PushConfig {
    pub enabled: bool,
    pub api_key: String,
}

/// Email notification channel configuration
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmailConfig {
    pub enabled: bool,

    /// Destination address for alarm mails
    pub email_address: String,

    /// SMTP transport settings; only ever set through the config file
    pub smtp: Option<SmtpConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmtpConfig {
    pub host: String,

    #[serde(default = "default_smtp_port")]
    pub port: u16,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    pub from_address: String,
}

fn default_smtp_port() -> u16 {
    DEFAULT_SMTP_PORT
}

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// A missing file yields the default configuration; a file that exists
    /// but does not parse is an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(
                    "no configuration file at {}, using defaults",
                    path.display()
                );
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Write this configuration to `path` as pretty-printed JSON.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let contents = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path.as_ref(), contents).await?;
        Ok(())
    }
}
