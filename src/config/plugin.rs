//! # Plugin Configuration
//!
//! Daemon-level settings loaded from environment variables.

use super::{env_var_or_default, env_var_or_default_bool, env_var_or_default_str};
use crate::constants::{
    DEFAULT_HTTP_TIMEOUT_SECS, DEFAULT_METRICS_PORT, DEFAULT_PLUGIN_NAME,
    DEFAULT_PLUGIN_SOCKET_DIR, DEFAULT_REFRESH_INTERVAL_SECS, DEFAULT_REFRESH_THROTTLE_SECS,
    DEFAULT_SECRETS_ROOT,
};
use std::path::PathBuf;
use std::time::Duration;

/// How `VolumeDriver.Create` behaves
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateMode {
    /// Volumes come from the backend listing; Create is accepted and ignored
    Discovery,
    /// Create registers a volume whose name carries `prefix`; the secret name
    /// is the remainder after the prefix
    Provisioning { prefix: String },
}

/// Plugin-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
#[derive(Debug, Clone)]
pub struct PluginConfig {
    /// Directory holding secret files and the snapshot
    pub secrets_root: PathBuf,
    /// Plugin name (socket file stem)
    pub plugin_name: String,
    /// Directory the plugin socket is created in
    pub socket_dir: PathBuf,
    /// Refresh sweep interval (seconds)
    pub refresh_interval_secs: u64,
    /// Delay between backend calls within one sweep (seconds)
    pub refresh_throttle_secs: u64,
    /// Outbound HTTP timeout (seconds)
    pub http_timeout_secs: u64,
    /// Create behaviour, derived from `VOLUME_PREFIX`
    pub create_mode: CreateMode,
    /// Global log level (ERROR, WARN, INFO, DEBUG, TRACE)
    pub log_level: String,
    /// Log format (json, text)
    pub log_format: String,
    /// Enable the metrics and probe server
    pub enable_metrics: bool,
    /// Metrics and probe server port
    pub metrics_port: u16,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            secrets_root: PathBuf::from(DEFAULT_SECRETS_ROOT),
            plugin_name: DEFAULT_PLUGIN_NAME.to_string(),
            socket_dir: PathBuf::from(DEFAULT_PLUGIN_SOCKET_DIR),
            refresh_interval_secs: DEFAULT_REFRESH_INTERVAL_SECS,
            refresh_throttle_secs: DEFAULT_REFRESH_THROTTLE_SECS,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
            create_mode: CreateMode::Discovery,
            log_level: "INFO".to_string(),
            log_format: "text".to_string(),
            enable_metrics: true,
            metrics_port: DEFAULT_METRICS_PORT,
        }
    }
}

impl PluginConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let create_mode = match std::env::var("VOLUME_PREFIX") {
            Ok(prefix) if !prefix.is_empty() => CreateMode::Provisioning { prefix },
            _ => CreateMode::Discovery,
        };

        Self {
            secrets_root: PathBuf::from(env_var_or_default_str(
                "SECRETS_ROOT",
                DEFAULT_SECRETS_ROOT,
            )),
            plugin_name: env_var_or_default_str("PLUGIN_NAME", DEFAULT_PLUGIN_NAME),
            socket_dir: PathBuf::from(env_var_or_default_str(
                "PLUGIN_SOCKET_DIR",
                DEFAULT_PLUGIN_SOCKET_DIR,
            )),
            refresh_interval_secs: env_var_or_default(
                "REFRESH_INTERVAL_SECS",
                DEFAULT_REFRESH_INTERVAL_SECS,
            ),
            refresh_throttle_secs: env_var_or_default(
                "REFRESH_THROTTLE_SECS",
                DEFAULT_REFRESH_THROTTLE_SECS,
            ),
            http_timeout_secs: env_var_or_default("HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS),
            create_mode,
            log_level: env_var_or_default_str("LOG_LEVEL", "INFO"),
            log_format: env_var_or_default_str("LOG_FORMAT", "text"),
            enable_metrics: env_var_or_default_bool("ENABLE_METRICS", true),
            metrics_port: env_var_or_default("METRICS_PORT", DEFAULT_METRICS_PORT),
        }
    }

    /// Path of the plugin socket Docker discovers
    pub fn socket_path(&self) -> PathBuf {
        self.socket_dir.join(format!("{}.sock", self.plugin_name))
    }

    /// Get refresh interval duration
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    /// Get inter-item refresh delay
    pub fn refresh_throttle(&self) -> Duration {
        Duration::from_secs(self.refresh_throttle_secs)
    }

    /// Get outbound HTTP timeout
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}
