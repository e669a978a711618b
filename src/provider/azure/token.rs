//! # Azure AD Tokens
//!
//! Client-credentials flow against the Microsoft identity platform.
//!
//! A token is reused while more than [`TOKEN_EXPIRY_MARGIN_SECS`] of its
//! lifetime remains. The cache sits behind its own lock, held only while a
//! token is checked or acquired, so secret requests never queue on it for
//! longer than one token round trip.

use crate::constants::{MAX_TOKEN_LIFETIME_SECS, TOKEN_EXPIRY_MARGIN_SECS};
use crate::observability::metrics;
use crate::provider::common;
use crate::provider::BackendError;
use reqwest::Client;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;
use zeroize::Zeroizing;

/// A bearer token and the instant it stops being valid
pub struct AccessToken {
    secret: Zeroizing<String>,
    expires_at: Instant,
}

impl AccessToken {
    /// `expires_in` is capped at [`MAX_TOKEN_LIFETIME_SECS`]
    #[must_use]
    pub fn new(secret: impl Into<String>, expires_in: Duration) -> Self {
        let lifetime = expires_in.min(Duration::from_secs(MAX_TOKEN_LIFETIME_SECS));
        let now = Instant::now();
        Self {
            secret: Zeroizing::new(secret.into()),
            expires_at: now.checked_add(lifetime).unwrap_or(now),
        }
    }

    /// True while more than `margin` of the token's lifetime remains
    #[must_use]
    pub fn is_fresh(&self, margin: Duration) -> bool {
        self.expires_at.saturating_duration_since(Instant::now()) > margin
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"***")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

/// Acquires and caches tokens for one service principal and scope
pub struct TokenManager {
    http: Client,
    token_url: String,
    client_id: String,
    client_secret: Zeroizing<String>,
    scope: String,
    margin: Duration,
    cached: Mutex<Option<AccessToken>>,
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

impl TokenManager {
    /// `authority_host` is the identity platform root, e.g. `https://login.microsoftonline.com`
    #[must_use]
    pub fn new(
        http: Client,
        authority_host: &str,
        tenant_id: &str,
        client_id: &str,
        client_secret: Zeroizing<String>,
        scope: String,
    ) -> Self {
        Self {
            http,
            token_url: format!("{authority_host}/{tenant_id}/oauth2/v2.0/token"),
            client_id: client_id.to_string(),
            client_secret,
            scope,
            margin: Duration::from_secs(TOKEN_EXPIRY_MARGIN_SECS),
            cached: Mutex::new(None),
        }
    }

    /// Return a usable bearer token, acquiring a new one if the cached token is near expiry
    ///
    /// # Errors
    /// Returns [`BackendError::Auth`] if the token endpoint fails or rejects the credentials
    pub async fn bearer(&self) -> Result<Zeroizing<String>, BackendError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(self.margin)) {
            return Ok(token.secret.clone());
        }

        let token = common::observe("azure", "token", self.request_token()).await?;
        let bearer = token.secret.clone();
        *cached = Some(token);
        Ok(bearer)
    }

    async fn request_token(&self) -> Result<AccessToken, BackendError> {
        debug!(token_url = %self.token_url, "Requesting Azure AD token");
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", self.scope.as_str()),
        ];

        let response = self
            .http
            .post(&self.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| BackendError::Auth {
                message: format!("token request failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Auth {
                message: format!("token endpoint returned {status}: {body}"),
            });
        }

        let token: TokenResponse = common::read_json(response, "token response").await?;
        metrics::increment_token_acquisitions();
        Ok(AccessToken::new(
            token.access_token,
            Duration::from_secs(token.expires_in),
        ))
    }
}
