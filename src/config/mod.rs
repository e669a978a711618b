//! # Configuration
//!
//! Settings loaded from environment variables at startup.
//!
//! - `plugin`: daemon-level settings (paths, intervals, logging, metrics)
//! - `backend`: which secret store to talk to and its credentials

pub mod backend;
pub mod plugin;

pub use backend::{
    AzureKeyVaultConfig, BackendConfig, ConfigError, PasswordstateConfig, VaultConfig,
};
pub use plugin::{CreateMode, PluginConfig};

use std::path::Path;

/// Load variables from a `.env` file at `path` into the process environment
///
/// Returns `false` when there is no such file. Variables already set in the
/// environment are left alone.
///
/// # Errors
/// Returns an error if the file exists but cannot be read or parsed
pub fn load_dotenv(path: &Path) -> Result<bool, dotenvy::Error> {
    match dotenvy::from_path(path) {
        Ok(()) => Ok(true),
        Err(e) if e.not_found() => Ok(false),
        Err(e) => Err(e),
    }
}

/// Read environment variable or return default value
pub(crate) fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T
where
    <T as std::str::FromStr>::Err: std::fmt::Debug,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read environment variable as boolean or return default
pub(crate) fn env_var_or_default_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| {
            let v_lower = v.to_lowercase();
            v_lower == "true" || v_lower == "1" || v_lower == "yes" || v_lower == "on"
        })
        .unwrap_or(default)
}

/// Read environment variable as string or return default
pub(crate) fn env_var_or_default_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
