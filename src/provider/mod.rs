//! # Secret Backends
//!
//! Clients for the external secret stores a volume can be backed by.
//!
//! Each backend implements [`SecretBackend`]:
//! - `azure`: Azure Key Vault (OAuth2 client credentials + REST)
//! - `vault`: HashiCorp Vault KV v2 (token header + REST)
//! - `passwordstate`: Passwordstate password lists (API key header + search REST)
//!
//! Backends are read-only; nothing here writes back to a store.

use crate::config::BackendConfig;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use zeroize::Zeroizing;

// Common utilities shared across backends
pub(crate) mod common;

// Backend implementations
pub mod azure;
pub mod passwordstate;
pub mod vault;

pub use azure::AzureKeyVault;
pub use passwordstate::Passwordstate;
pub use vault::VaultKv;

/// Result of a single secret fetch
///
/// `None` timestamps mean the backend did not report one.
pub struct SecretRecord {
    pub value: Zeroizing<String>,
    pub updated_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl SecretRecord {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: Zeroizing::new(value.into()),
            updated_at: None,
            expires_at: None,
        }
    }
}

impl std::fmt::Debug for SecretRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretRecord")
            .field("value", &"***")
            .field("updated_at", &self.updated_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
    #[error("Failed to acquire access token: {message}")]
    Auth { message: String },
    #[error("Request to {target} failed: {source}")]
    Request {
        target: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Failed to fetch secret {secret}: status {status}")]
    Fetch { secret: String, status: StatusCode },
    #[error("Failed to list {target}: status {status}")]
    List { target: String, status: StatusCode },
    #[error("Error decoding {context}: {source}")]
    Decode {
        context: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("No secret found with title {secret:?} in list {list_id:?}")]
    NotFound { secret: String, list_id: String },
    #[error("Secret {secret} has no fields")]
    Empty { secret: String },
    #[error("Invalid {field} {value:?} for secret {secret}")]
    InvalidTimestamp {
        secret: String,
        field: &'static str,
        value: String,
    },
    #[error("Invalid URL {url}: {message}")]
    InvalidUrl { url: String, message: String },
}

/// Read-only view of an external secret store
#[async_trait]
pub trait SecretBackend: Send + Sync + std::fmt::Debug {
    /// Short backend name used in logs and metric labels
    fn kind(&self) -> &'static str;

    /// Fetch the current value of one secret
    async fn fetch_secret(&self, secret_name: &str) -> Result<SecretRecord, BackendError>;

    /// List every secret name, in the order the backend returns them
    async fn list_secrets(&self) -> Result<Vec<String>, BackendError>;
}

/// Build the backend selected by `config`
///
/// # Errors
/// Returns an error if the HTTP client cannot be built or an endpoint URL is invalid
pub fn build_backend(
    config: &BackendConfig,
    timeout: Duration,
) -> Result<Arc<dyn SecretBackend>, BackendError> {
    let backend: Arc<dyn SecretBackend> = match config {
        BackendConfig::Azure(azure) => Arc::new(AzureKeyVault::new(azure, timeout)?),
        BackendConfig::Vault(vault) => Arc::new(VaultKv::new(vault, timeout)?),
        BackendConfig::Passwordstate(pws) => Arc::new(Passwordstate::new(pws, timeout)?),
    };
    Ok(backend)
}
