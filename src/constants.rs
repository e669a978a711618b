//! # Constants
//!
//! Shared constants used throughout the plugin.
//!
//! These values represent reasonable defaults and can be overridden via
//! environment variables where applicable.

/// Default directory holding one file per volume plus the snapshot
#[cfg(unix)]
pub const DEFAULT_SECRETS_ROOT: &str = "/secrets";

/// Default directory holding one file per volume plus the snapshot
#[cfg(not(unix))]
pub const DEFAULT_SECRETS_ROOT: &str = "C:\\ProgramData\\docker\\secrets";

/// Snapshot file name, relative to the secrets root
pub const SNAPSHOT_FILE_NAME: &str = "secrets.json";

/// Plugin name; the socket is `<socket dir>/<name>.sock`
pub const DEFAULT_PLUGIN_NAME: &str = "secret";

/// Directory Docker scans for plugin sockets
pub const DEFAULT_PLUGIN_SOCKET_DIR: &str = "/run/docker/plugins";

/// Default refresh sweep interval (seconds)
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 3600;

/// Default delay between backend calls inside one refresh sweep (seconds)
/// Keeps a full sweep under the backends' request-rate ceilings
pub const DEFAULT_REFRESH_THROTTLE_SECS: u64 = 10;

/// How long shutdown waits for an in-progress refresh sweep to stop (seconds)
pub const REFRESH_SHUTDOWN_GRACE_SECS: u64 = 5;

/// Default timeout for every outbound backend HTTP call (seconds)
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// A cached bearer token is reused only while more than this remains before expiry
pub const TOKEN_EXPIRY_MARGIN_SECS: u64 = 60;

/// Upper bound on how long a cached bearer token is trusted, whatever the
/// identity endpoint reports
pub const MAX_TOKEN_LIFETIME_SECS: u64 = 24 * 3600;

/// Default Microsoft identity platform host
pub const DEFAULT_AZURE_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// Key Vault REST API version
pub const AZURE_KEYVAULT_API_VERSION: &str = "7.4";

/// Default field read from a Vault KV v2 secret
pub const DEFAULT_VAULT_SECRET_FIELD: &str = "Secret";

/// Custom metadata key carrying a Vault secret's expiry date (`YYYY-MM-DD`)
pub const VAULT_EXPIRY_METADATA_KEY: &str = "ExpiryDate";

/// Content type used by the Docker plugin protocol
pub const PLUGIN_CONTENT_TYPE: &str = "application/vnd.docker.plugins.v1.1+json";

/// Secret files are readable by their owner only
#[cfg(unix)]
pub const SECRET_FILE_MODE: u32 = 0o600;

/// Plugin socket permissions
#[cfg(unix)]
pub const PLUGIN_SOCKET_MODE: u32 = 0o660;
