//! # Logging
//!
//! Installs the process-wide tracing subscriber.
//!
//! `RUST_LOG` takes precedence; otherwise the configured `LOG_LEVEL` applies to
//! this crate and `warn` to everything else, so HTTP client internals stay quiet.

use crate::config::PluginConfig;
use tracing_subscriber::EnvFilter;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    /// Parse a `LOG_FORMAT` value, defaulting to text
    #[must_use]
    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Text
        }
    }
}

/// Build the default filter directive for a `LOG_LEVEL` value
///
/// Unknown levels fall back to `info`.
#[must_use]
pub fn default_directive(log_level: &str) -> String {
    let level = match log_level.to_ascii_lowercase().as_str() {
        level @ ("error" | "warn" | "info" | "debug" | "trace") => level.to_string(),
        _ => "info".to_string(),
    };
    format!("warn,secret_volume_plugin={level}")
}

/// Install the global tracing subscriber
///
/// Calling this twice is harmless; the second subscriber is rejected and ignored.
pub fn init_tracing(config: &PluginConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(&config.log_level)));

    let result = match LogFormat::parse(&config.log_format) {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .try_init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).try_init(),
    };

    if let Err(e) = result {
        eprintln!("Tracing subscriber already initialized: {e}");
    }
}
