//! Connection and operation configuration
//!
//! Default config location: ~/.esadmin/config.toml

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub operations: OperationsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// How to reach the cluster's control plane
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConnectionConfig {
    /// Target cluster endpoint, `host:port` or a full URL
    #[serde(default = "default_host")]
    pub host: String,

    /// Per-request deadline in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Max transient-error retries for reads
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Initial backoff between read retries, doubled per attempt
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Use https when `host` carries no scheme
    #[serde(default)]
    pub tls: bool,

    pub username: Option<String>,

    pub password: Option<String>,

    /// Extra CA certificate (PEM) to trust
    pub ca_cert_path: Option<PathBuf>,

    /// Skip certificate verification (INSECURE - for development only)
    #[serde(default)]
    pub skip_verify: bool,
}

fn default_host() -> String {
    "localhost:9200".to_string()
}

fn default_timeout_seconds() -> u64 {
    30
}

fn default_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    200
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            timeout_seconds: default_timeout_seconds(),
            retries: default_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            tls: false,
            username: None,
            password: None,
            ca_cert_path: None,
            skip_verify: false,
        }
    }
}

impl ConnectionConfig {
    /// Connection settings for a given endpoint, everything else defaulted
    pub fn for_host(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Default::default()
        }
    }

    /// Base URL with scheme, no trailing slash
    pub fn base_url(&self) -> String {
        let host = self.host.trim_end_matches('/');
        if host.contains("://") {
            host.to_string()
        } else if self.tls {
            format!("https://{}", host)
        } else {
            format!("http://{}", host)
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Which cluster-settings bucket mutations are written to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SettingsScope {
    /// Lost on full cluster restart
    #[default]
    Transient,
    /// Survives full cluster restart
    Persistent,
}

impl SettingsScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettingsScope::Transient => "transient",
            SettingsScope::Persistent => "persistent",
        }
    }
}

/// Tuning for multi-step operations
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OperationsConfig {
    /// Interval between shard placement polls during a move
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// How long a shard move is watched before giving up
    #[serde(default = "default_move_timeout_seconds")]
    pub move_timeout_seconds: u64,

    #[serde(default)]
    pub settings_scope: SettingsScope,
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_move_timeout_seconds() -> u64 {
    300
}

impl Default for OperationsConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            move_timeout_seconds: default_move_timeout_seconds(),
            settings_scope: SettingsScope::default(),
        }
    }
}

impl OperationsConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn move_timeout(&self) -> Duration {
        Duration::from_secs(self.move_timeout_seconds)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Expand ~ to home directory in path
pub fn expand_tilde(path: &Path) -> Result<PathBuf> {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Cannot determine home directory".to_string()))?;
        Ok(home.join(rest))
    } else if s == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Cannot determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}

/// ~/.esadmin/config.toml
pub fn default_config_path() -> Result<PathBuf> {
    expand_tilde(Path::new("~/.esadmin/config.toml"))
}

impl Config {
    /// Load config from the default location, falling back to defaults
    pub fn load() -> Result<Self> {
        Self::load_from(&default_config_path()?)
    }

    /// Load config from a file path; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        let path = expand_tilde(path)?;
        let mut config: Config = if path.exists() {
            let content = fs::read_to_string(&path).map_err(|e| {
                EngineError::Config(format!("Failed to read {}: {}", path.display(), e))
            })?;
            toml::from_str(&content).map_err(|e| {
                EngineError::Config(format!("Invalid config {}: {}", path.display(), e))
            })?
        } else {
            Config::default()
        };
        config.expand_paths()?;
        Ok(config)
    }

    fn expand_paths(&mut self) -> Result<()> {
        if let Some(ref ca) = self.connection.ca_cert_path {
            self.connection.ca_cert_path = Some(expand_tilde(ca)?);
        }
        Ok(())
    }
}
