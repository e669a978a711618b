//! # Backend Configuration
//!
//! Selects the secret store via `SECRET_BACKEND` and collects the credentials
//! and endpoints that store requires. Any missing value is fatal: the daemon
//! never starts with a half-configured backend.

use crate::constants::{DEFAULT_AZURE_AUTHORITY_HOST, DEFAULT_VAULT_SECRET_FIELD};
use thiserror::Error;
use zeroize::Zeroizing;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("SECRET_BACKEND environment variable is required (azure, passwordstate, vault)")]
    MissingBackend,
    #[error("{0} environment variable is required")]
    MissingVar(&'static str),
    #[error("Unsupported backend: {0}")]
    UnsupportedBackend(String),
}

/// Azure Key Vault with a client-credentials service principal
pub struct AzureKeyVaultConfig {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: Zeroizing<String>,
    pub vault_url: String,
    /// Identity platform host, overridable for sovereign clouds
    pub authority_host: String,
}

impl std::fmt::Debug for AzureKeyVaultConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureKeyVaultConfig")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("vault_url", &self.vault_url)
            .field("authority_host", &self.authority_host)
            .finish_non_exhaustive()
    }
}

/// HashiCorp Vault KV v2 engine
pub struct VaultConfig {
    pub address: String,
    /// Mount path of the KV v2 engine, e.g. `secret`
    pub path: String,
    pub token: Zeroizing<String>,
    /// Field read from each secret's data map
    pub secret_field: String,
}

impl std::fmt::Debug for VaultConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultConfig")
            .field("address", &self.address)
            .field("path", &self.path)
            .field("secret_field", &self.secret_field)
            .finish_non_exhaustive()
    }
}

/// Passwordstate password list
pub struct PasswordstateConfig {
    pub base_url: String,
    pub api_key: Zeroizing<String>,
    pub list_id: String,
}

impl std::fmt::Debug for PasswordstateConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordstateConfig")
            .field("base_url", &self.base_url)
            .field("list_id", &self.list_id)
            .finish_non_exhaustive()
    }
}

/// Secret store selection
#[derive(Debug)]
pub enum BackendConfig {
    Azure(AzureKeyVaultConfig),
    Vault(VaultConfig),
    Passwordstate(PasswordstateConfig),
}

impl BackendConfig {
    /// Load backend configuration from the process environment
    ///
    /// # Errors
    /// Returns an error if `SECRET_BACKEND` or any variable the selected backend needs is missing
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load backend configuration from an arbitrary key lookup
    ///
    /// Empty values count as missing.
    ///
    /// # Errors
    /// Returns an error if `SECRET_BACKEND` or any variable the selected backend needs is missing
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let require = |key: &'static str| get(key).ok_or(ConfigError::MissingVar(key));

        let backend = get("SECRET_BACKEND").ok_or(ConfigError::MissingBackend)?;
        match backend.as_str() {
            "azure" => Ok(Self::Azure(AzureKeyVaultConfig {
                tenant_id: require("AZURE_TENANT_ID")?,
                client_id: require("AZURE_CLIENT_ID")?,
                client_secret: Zeroizing::new(require("AZURE_CLIENT_SECRET")?),
                vault_url: require("AZURE_KEYVAULT_URL")?
                    .trim_end_matches('/')
                    .to_string(),
                authority_host: get("AZURE_AUTHORITY_HOST")
                    .unwrap_or_else(|| DEFAULT_AZURE_AUTHORITY_HOST.to_string())
                    .trim_end_matches('/')
                    .to_string(),
            })),
            "vault" => Ok(Self::Vault(VaultConfig {
                address: require("VAULT_ADDR")?.trim_end_matches('/').to_string(),
                path: require("VAULT_PATH")?.trim_matches('/').to_string(),
                token: Zeroizing::new(require("VAULT_TOKEN")?),
                secret_field: get("VAULT_SECRET_FIELD")
                    .unwrap_or_else(|| DEFAULT_VAULT_SECRET_FIELD.to_string()),
            })),
            "passwordstate" => Ok(Self::Passwordstate(PasswordstateConfig {
                base_url: require("PASSWORDSTATE_BASE_URL")?
                    .trim_end_matches('/')
                    .to_string(),
                api_key: Zeroizing::new(require("PASSWORDSTATE_API_KEY")?),
                list_id: require("PASSWORDSTATE_LIST_ID")?,
            })),
            other => Err(ConfigError::UnsupportedBackend(other.to_string())),
        }
    }

    /// Short backend name, as given in `SECRET_BACKEND`
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Azure(_) => "azure",
            Self::Vault(_) => "vault",
            Self::Passwordstate(_) => "passwordstate",
        }
    }
}
