//! # HashiCorp Vault Client
//!
//! Reads a KV v2 engine mounted at `VAULT_PATH`, authenticating with the
//! `X-Vault-Token` header.
//!
//! Each secret's data map holds one or more string fields. The configured
//! field (`Secret` by default) is preferred; otherwise the first field in key
//! order is used so the choice is stable across fetches. The creation time of
//! the current version becomes `updated_at`, and a `custom_metadata.ExpiryDate`
//! (`YYYY-MM-DD`) becomes `expires_at`.

use crate::config::VaultConfig;
use crate::constants::VAULT_EXPIRY_METADATA_KEY;
use crate::provider::common;
use crate::provider::{BackendError, SecretBackend, SecretRecord};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::{debug, debug_span, info_span, Instrument};
use zeroize::Zeroizing;

const BACKEND: &str = "vault";
const TOKEN_HEADER: &str = "X-Vault-Token";

#[derive(Deserialize)]
struct ReadResponse {
    data: ReadData,
}

#[derive(Deserialize)]
struct ReadData {
    #[serde(default)]
    data: BTreeMap<String, serde_json::Value>,
    metadata: VersionMetadata,
}

#[derive(Deserialize)]
struct VersionMetadata {
    created_time: String,
    #[serde(default)]
    custom_metadata: Option<HashMap<String, String>>,
}

#[derive(Deserialize)]
struct ListResponse {
    data: ListData,
}

#[derive(Deserialize)]
struct ListData {
    #[serde(default)]
    keys: Vec<String>,
}

/// Vault KV v2 provider implementation
pub struct VaultKv {
    http: Client,
    address: String,
    mount: String,
    token: Zeroizing<String>,
    secret_field: String,
}

impl std::fmt::Debug for VaultKv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultKv")
            .field("address", &self.address)
            .field("mount", &self.mount)
            .field("secret_field", &self.secret_field)
            .finish_non_exhaustive()
    }
}

impl VaultKv {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built
    pub fn new(config: &VaultConfig, timeout: Duration) -> Result<Self, BackendError> {
        Ok(Self {
            http: common::http_client(timeout)?,
            address: config.address.clone(),
            mount: config.path.clone(),
            token: config.token.clone(),
            secret_field: config.secret_field.clone(),
        })
    }

    async fn read_secret(&self, secret_name: &str) -> Result<SecretRecord, BackendError> {
        let url = format!("{}/v1/{}/data/{}", self.address, self.mount, secret_name);
        let response = common::send(
            self.http
                .get(&url)
                .header(TOKEN_HEADER, self.token.as_str()),
            &url,
        )
        .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Fetch {
                secret: secret_name.to_string(),
                status,
            });
        }

        let body: ReadResponse = common::read_json(response, "Vault secret").await?;
        self.to_record(secret_name, body.data)
    }

    fn to_record(&self, secret_name: &str, data: ReadData) -> Result<SecretRecord, BackendError> {
        let ReadData { mut data, metadata } = data;

        let value = match data.remove(&self.secret_field) {
            Some(value) => value,
            None => {
                let (field, value) = data.into_iter().next().ok_or_else(|| BackendError::Empty {
                    secret: secret_name.to_string(),
                })?;
                debug!(
                    secret = secret_name,
                    field = %field,
                    "Configured field missing, using first field"
                );
                value
            }
        };

        let updated_at = DateTime::parse_from_rfc3339(&metadata.created_time)
            .ok()
            .map(|t| t.with_timezone(&Utc))
            .ok_or_else(|| BackendError::InvalidTimestamp {
                secret: secret_name.to_string(),
                field: "created_time",
                value: metadata.created_time.clone(),
            })?;

        let expires_at = match metadata
            .custom_metadata
            .as_ref()
            .and_then(|m| m.get(VAULT_EXPIRY_METADATA_KEY))
        {
            Some(raw) => Some(parse_expiry_date(raw).ok_or_else(|| {
                BackendError::InvalidTimestamp {
                    secret: secret_name.to_string(),
                    field: VAULT_EXPIRY_METADATA_KEY,
                    value: raw.clone(),
                }
            })?),
            None => None,
        };

        Ok(SecretRecord {
            value: Zeroizing::new(field_text(value)),
            updated_at: Some(updated_at),
            expires_at,
        })
    }

    async fn list_keys(&self) -> Result<Vec<String>, BackendError> {
        let url = format!("{}/v1/{}/metadata?list=true", self.address, self.mount);
        let response = common::send(
            self.http
                .get(&url)
                .header(TOKEN_HEADER, self.token.as_str()),
            &url,
        )
        .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::List {
                target: format!("{}/{}", self.address, self.mount),
                status,
            });
        }

        let body: ListResponse = common::read_json(response, "Vault key list").await?;
        Ok(body.data.keys)
    }
}

#[async_trait]
impl SecretBackend for VaultKv {
    fn kind(&self) -> &'static str {
        BACKEND
    }

    async fn fetch_secret(&self, secret_name: &str) -> Result<SecretRecord, BackendError> {
        let span = info_span!("vault.kv.read", secret.name = secret_name, vault.mount = %self.mount);
        common::observe(BACKEND, "fetch", self.read_secret(secret_name))
            .instrument(span)
            .await
    }

    async fn list_secrets(&self) -> Result<Vec<String>, BackendError> {
        let span = debug_span!("vault.kv.list", vault.mount = %self.mount);
        common::observe(BACKEND, "list", self.list_keys())
            .instrument(span)
            .await
    }
}

/// Strings are written verbatim; any other JSON value is written as JSON
fn field_text(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}

/// `YYYY-MM-DD`, taken as midnight UTC
fn parse_expiry_date(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
