//! Common test utilities for integration tests
//!
//! Provides:
//! - rustls crypto provider setup
//! - an in-memory `FakeBackend` with call counters and failure switches
//! - in-process axum mock servers for the HTTP backends
//! - registry construction over a temporary secrets root

#![allow(dead_code, reason = "each test binary uses a different subset")]

use async_trait::async_trait;
use axum::Router;
use chrono::{DateTime, TimeZone, Utc};
use secret_volume_plugin::provider::{BackendError, SecretBackend, SecretRecord};
use secret_volume_plugin::volume::Registry;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;

static RUSTLS_INIT: Once = Once::new();

/// Initialize rustls crypto provider for tests
pub fn init_rustls() {
    RUSTLS_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// `updated_at` reported for every fake fetch
pub fn fake_updated_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()
}

/// In-memory backend
#[derive(Debug, Default)]
pub struct FakeBackend {
    secrets: Mutex<BTreeMap<String, String>>,
    listing: Mutex<Vec<String>>,
    expires_at: Mutex<Option<DateTime<Utc>>>,
    fetches: AtomicUsize,
    lists: AtomicUsize,
    fail_fetch: AtomicBool,
    fail_list: AtomicBool,
    delay: Mutex<Duration>,
}

impl FakeBackend {
    /// Backend holding `pairs`, listed in the given order
    pub fn with_secrets(pairs: &[(&str, &str)]) -> Arc<Self> {
        let backend = Self::default();
        for (name, value) in pairs {
            backend.set_secret(name, value);
        }
        backend.set_listing(&pairs.iter().map(|(name, _)| *name).collect::<Vec<_>>());
        Arc::new(backend)
    }

    pub fn set_secret(&self, name: &str, value: &str) {
        self.secrets
            .lock()
            .unwrap()
            .insert(name.to_string(), value.to_string());
    }

    pub fn set_listing(&self, names: &[&str]) {
        *self.listing.lock().unwrap() = names.iter().map(|n| (*n).to_string()).collect();
    }

    pub fn set_expires_at(&self, expires_at: Option<DateTime<Utc>>) {
        *self.expires_at.lock().unwrap() = expires_at;
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn fail_fetches(&self, fail: bool) {
        self.fail_fetch.store(fail, Ordering::SeqCst);
    }

    pub fn fail_listing(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn list_count(&self) -> usize {
        self.lists.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SecretBackend for FakeBackend {
    fn kind(&self) -> &'static str {
        "fake"
    }

    async fn fetch_secret(&self, secret_name: &str) -> Result<SecretRecord, BackendError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let value = self.secrets.lock().unwrap().get(secret_name).cloned();
        match value {
            Some(value) if !self.fail_fetch.load(Ordering::SeqCst) => Ok(SecretRecord {
                value: value.into(),
                updated_at: Some(fake_updated_at()),
                expires_at: *self.expires_at.lock().unwrap(),
            }),
            _ => Err(BackendError::NotFound {
                secret: secret_name.to_string(),
                list_id: "fake".to_string(),
            }),
        }
    }

    async fn list_secrets(&self) -> Result<Vec<String>, BackendError> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(BackendError::Auth {
                message: "listing disabled".to_string(),
            });
        }
        Ok(self.listing.lock().unwrap().clone())
    }
}

/// Open a registry over a fresh temporary secrets root
pub async fn open_registry(backend: &Arc<FakeBackend>) -> (TempDir, Arc<Registry>) {
    let dir = tempfile::tempdir().unwrap();
    let registry = reopen_registry(&dir, backend).await;
    (dir, registry)
}

/// Open a registry over an existing secrets root
pub async fn reopen_registry(dir: &TempDir, backend: &Arc<FakeBackend>) -> Arc<Registry> {
    let backend: Arc<dyn SecretBackend> = Arc::clone(backend) as Arc<dyn SecretBackend>;
    Arc::new(Registry::open(dir.path(), backend).await.unwrap())
}

/// Serve the router built by `build` on an ephemeral local port
///
/// `build` receives the server's base URL so responses can link back to it.
pub async fn spawn_mock<F>(build: F) -> String
where
    F: FnOnce(String) -> Router,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let router = build(base.clone());
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    base
}
