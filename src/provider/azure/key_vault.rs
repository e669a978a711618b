//! # Azure Key Vault Client
//!
//! Reads secrets through the Key Vault REST API (`api-version=7.4`):
//! - `GET {vault}/secrets/{name}` for a value with its `updated` and `exp` attributes
//! - `GET {vault}/secrets` for the name listing, following `nextLink` pages

use super::token::TokenManager;
use crate::config::AzureKeyVaultConfig;
use crate::constants::AZURE_KEYVAULT_API_VERSION;
use crate::provider::common;
use crate::provider::{BackendError, SecretBackend, SecretRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Url};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, debug_span, info_span, Instrument};
use zeroize::Zeroizing;

const BACKEND: &str = "azure";

#[derive(Deserialize)]
struct SecretBundle {
    value: String,
    #[serde(default)]
    attributes: SecretAttributes,
}

/// Unix-second timestamps as returned by Key Vault
#[derive(Deserialize, Default)]
struct SecretAttributes {
    updated: Option<i64>,
    exp: Option<i64>,
}

#[derive(Deserialize)]
struct SecretListPage {
    #[serde(default)]
    value: Vec<SecretItem>,
    #[serde(rename = "nextLink")]
    next_link: Option<String>,
}

#[derive(Deserialize)]
struct SecretItem {
    id: String,
}

/// Azure Key Vault provider implementation
pub struct AzureKeyVault {
    http: Client,
    vault_url: Url,
    tokens: TokenManager,
}

impl std::fmt::Debug for AzureKeyVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureKeyVault")
            .field("vault_url", &self.vault_url.as_str())
            .field("tokens", &self.tokens)
            .finish_non_exhaustive()
    }
}

impl AzureKeyVault {
    /// Create a new Azure Key Vault client
    ///
    /// # Errors
    /// Returns an error if the vault URL does not parse or the HTTP client cannot be built
    pub fn new(config: &AzureKeyVaultConfig, timeout: Duration) -> Result<Self, BackendError> {
        let vault_url = Url::parse(&config.vault_url).map_err(|e| BackendError::InvalidUrl {
            url: config.vault_url.clone(),
            message: e.to_string(),
        })?;
        if vault_url.cannot_be_a_base() {
            return Err(BackendError::InvalidUrl {
                url: config.vault_url.clone(),
                message: "not a base URL".to_string(),
            });
        }

        let http = common::http_client(timeout)?;
        let tokens = TokenManager::new(
            http.clone(),
            &config.authority_host,
            &config.tenant_id,
            &config.client_id,
            config.client_secret.clone(),
            format!("{}/.default", config.vault_url),
        );

        Ok(Self {
            http,
            vault_url,
            tokens,
        })
    }

    /// `{vault}/secrets[/{name}]?api-version=...`
    fn secrets_url(&self, secret_name: Option<&str>) -> Url {
        let mut url = self.vault_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("secrets");
            if let Some(name) = secret_name {
                segments.push(name);
            }
        }
        url.query_pairs_mut()
            .append_pair("api-version", AZURE_KEYVAULT_API_VERSION);
        url
    }

    async fn get_secret(&self, secret_name: &str) -> Result<SecretRecord, BackendError> {
        let bearer = self.tokens.bearer().await?;
        let url = self.secrets_url(Some(secret_name));
        let response = common::send(
            self.http.get(url.clone()).bearer_auth(bearer.as_str()),
            url.as_str(),
        )
        .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Fetch {
                secret: secret_name.to_string(),
                status,
            });
        }

        let bundle: SecretBundle = common::read_json(response, "Key Vault secret").await?;
        Ok(SecretRecord {
            value: Zeroizing::new(bundle.value),
            updated_at: bundle.attributes.updated.and_then(from_unix),
            expires_at: bundle.attributes.exp.and_then(from_unix),
        })
    }

    async fn list_names(&self) -> Result<Vec<String>, BackendError> {
        let mut names = Vec::new();
        let mut next = Some(self.secrets_url(None).to_string());

        while let Some(page_url) = next {
            let bearer = self.tokens.bearer().await?;
            let response = common::send(
                self.http.get(&page_url).bearer_auth(bearer.as_str()),
                &page_url,
            )
            .await?;

            let status = response.status();
            if !status.is_success() {
                return Err(BackendError::List {
                    target: self.vault_url.to_string(),
                    status,
                });
            }

            let page: SecretListPage = common::read_json(response, "Key Vault secret list").await?;
            names.extend(page.value.iter().filter_map(|item| name_from_id(&item.id)));
            next = page.next_link.filter(|link| !link.is_empty());
        }

        Ok(names)
    }
}

#[async_trait]
impl SecretBackend for AzureKeyVault {
    fn kind(&self) -> &'static str {
        BACKEND
    }

    async fn fetch_secret(&self, secret_name: &str) -> Result<SecretRecord, BackendError> {
        let span = info_span!(
            "azure.keyvault.secret.get",
            secret.name = secret_name,
            vault.url = %self.vault_url
        );
        common::observe(BACKEND, "fetch", self.get_secret(secret_name))
            .instrument(span)
            .await
    }

    async fn list_secrets(&self) -> Result<Vec<String>, BackendError> {
        let span = debug_span!("azure.keyvault.secret.list", vault.url = %self.vault_url);
        let names = common::observe(BACKEND, "list", self.list_names())
            .instrument(span)
            .await?;
        debug!(count = names.len(), "Listed Azure Key Vault secrets");
        Ok(names)
    }
}

/// Secret name from an item id such as `https://kv.vault.azure.net/secrets/db-password`
fn name_from_id(id: &str) -> Option<String> {
    id.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

fn from_unix(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}
