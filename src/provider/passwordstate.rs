//! # Passwordstate Client
//!
//! Searches one password list by title through the Passwordstate REST API,
//! authenticating with the `APIKey` header. Searches pass
//! `PreventAuditing=true` so refresh sweeps do not flood the audit log.
//!
//! Passwordstate does not report a modification time, so `updated_at` is the
//! fetch time. `ExpiryDate` uses the `D.M.YYYY` form; a value in any other
//! form is logged and ignored.

use crate::config::PasswordstateConfig;
use crate::provider::common;
use crate::provider::{BackendError, SecretBackend, SecretRecord};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug_span, info_span, warn, Instrument};
use zeroize::Zeroizing;

const BACKEND: &str = "passwordstate";
const API_KEY_HEADER: &str = "APIKey";

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PasswordEntry {
    #[serde(default)]
    title: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    expiry_date: Option<String>,
}

/// Passwordstate provider implementation
pub struct Passwordstate {
    http: Client,
    search_url: String,
    api_key: Zeroizing<String>,
    list_id: String,
}

impl std::fmt::Debug for Passwordstate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Passwordstate")
            .field("search_url", &self.search_url)
            .field("list_id", &self.list_id)
            .finish_non_exhaustive()
    }
}

impl Passwordstate {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built
    pub fn new(config: &PasswordstateConfig, timeout: Duration) -> Result<Self, BackendError> {
        Ok(Self {
            http: common::http_client(timeout)?,
            search_url: format!("{}/searchpasswords/{}", config.base_url, config.list_id),
            api_key: config.api_key.clone(),
            list_id: config.list_id.clone(),
        })
    }

    fn search(&self) -> RequestBuilder {
        self.http
            .get(&self.search_url)
            .header(API_KEY_HEADER, self.api_key.as_str())
    }

    async fn search_entries(
        &self,
        request: RequestBuilder,
        secret_name: Option<&str>,
    ) -> Result<Vec<PasswordEntry>, BackendError> {
        let response = common::send(request, &self.search_url).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(match secret_name {
                Some(secret) => BackendError::Fetch {
                    secret: secret.to_string(),
                    status,
                },
                None => BackendError::List {
                    target: format!("password list {}", self.list_id),
                    status,
                },
            });
        }
        common::read_json(response, "Passwordstate search results").await
    }

    async fn find_password(&self, secret_name: &str) -> Result<SecretRecord, BackendError> {
        let request = self
            .search()
            .query(&[("title", secret_name), ("PreventAuditing", "true")]);
        let entries = self.search_entries(request, Some(secret_name)).await?;
        let entry = pick_entry(entries, secret_name).ok_or_else(|| BackendError::NotFound {
            secret: secret_name.to_string(),
            list_id: self.list_id.clone(),
        })?;

        let expires_at = entry
            .expiry_date
            .as_deref()
            .filter(|raw| !raw.trim().is_empty())
            .and_then(|raw| {
                let parsed = parse_expiry_date(raw);
                if parsed.is_none() {
                    warn!(
                        secret = secret_name,
                        expiry_date = raw,
                        "Ignoring unparseable Passwordstate expiry date"
                    );
                }
                parsed
            });

        Ok(SecretRecord {
            value: Zeroizing::new(entry.password),
            updated_at: Some(Utc::now()),
            expires_at,
        })
    }

    async fn list_titles(&self) -> Result<Vec<String>, BackendError> {
        let request = self.search().query(&[("PreventAuditing", "true")]);
        let entries = self.search_entries(request, None).await?;
        Ok(entries.into_iter().map(|entry| entry.title).collect())
    }
}

#[async_trait]
impl SecretBackend for Passwordstate {
    fn kind(&self) -> &'static str {
        BACKEND
    }

    async fn fetch_secret(&self, secret_name: &str) -> Result<SecretRecord, BackendError> {
        let span = info_span!(
            "passwordstate.password.search",
            secret.name = secret_name,
            list.id = %self.list_id
        );
        common::observe(BACKEND, "fetch", self.find_password(secret_name))
            .instrument(span)
            .await
    }

    async fn list_secrets(&self) -> Result<Vec<String>, BackendError> {
        let span = debug_span!("passwordstate.password.list", list.id = %self.list_id);
        common::observe(BACKEND, "list", self.list_titles())
            .instrument(span)
            .await
    }
}

/// Title search is a substring match, so an exact title wins over the first hit
fn pick_entry(entries: Vec<PasswordEntry>, title: &str) -> Option<PasswordEntry> {
    let exact = entries.iter().position(|entry| entry.title == title);
    entries.into_iter().nth(exact.unwrap_or(0))
}

/// `D.M.YYYY`, taken as midnight UTC
fn parse_expiry_date(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDate::parse_from_str(raw.trim(), "%d.%m.%Y")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
