//! Azure Key Vault client against an in-process mock of the identity and vault endpoints

mod common;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use common::{init_rustls, spawn_mock};
use secret_volume_plugin::config::AzureKeyVaultConfig;
use secret_volume_plugin::provider::{AzureKeyVault, BackendError, SecretBackend};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use zeroize::Zeroizing;

#[derive(Clone)]
struct MockState {
    base: String,
    expires_in: u64,
    token_calls: Arc<AtomicUsize>,
}

async fn token(
    State(state): State<MockState>,
    Path(tenant): Path<String>,
    Form(form): Form<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    if tenant != "tenant"
        || form.get("grant_type").map(String::as_str) != Some("client_credentials")
        || form.get("client_secret").map(String::as_str) != Some("shh")
        || form.get("scope") != Some(&format!("{}/.default", state.base))
    {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "invalid_client"})),
        );
    }
    let n = state.token_calls.fetch_add(1, Ordering::SeqCst) + 1;
    (
        StatusCode::OK,
        Json(json!({
            "token_type": "Bearer",
            "expires_in": state.expires_in,
            "access_token": format!("token-{n}"),
        })),
    )
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("Bearer token-"))
}

async fn secret(
    Path(name): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({})));
    }
    assert_eq!(query.get("api-version").map(String::as_str), Some("7.4"));
    match name.as_str() {
        "db-password" => (
            StatusCode::OK,
            Json(json!({
                "value": "s3cret",
                "id": "https://kv/secrets/db-password/abc",
                "attributes": {"enabled": true, "updated": 1_700_000_000, "exp": 1_800_000_000}
            })),
        ),
        "no-attributes" => (StatusCode::OK, Json(json!({"value": "plain"}))),
        "garbled" => (StatusCode::OK, Json(json!({"val": 1}))),
        _ => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": {"code": "SecretNotFound"}})),
        ),
    }
}

async fn list(
    State(state): State<MockState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({})));
    }
    if query.contains_key("$skiptoken") {
        (
            StatusCode::OK,
            Json(json!({
                "value": [{"id": format!("{}/secrets/third", state.base)}],
                "nextLink": null
            })),
        )
    } else {
        (
            StatusCode::OK,
            Json(json!({
                "value": [
                    {"id": format!("{}/secrets/first", state.base)},
                    {"id": format!("{}/secrets/second", state.base)}
                ],
                "nextLink": format!("{}/secrets?api-version=7.4&$skiptoken=page2", state.base)
            })),
        )
    }
}

async fn start(expires_in: u64) -> (AzureKeyVault, Arc<AtomicUsize>) {
    init_rustls();
    let token_calls = Arc::new(AtomicUsize::new(0));
    let calls = Arc::clone(&token_calls);
    let base = spawn_mock(move |base| {
        Router::new()
            .route("/{tenant}/oauth2/v2.0/token", post(token))
            .route("/secrets", get(list))
            .route("/secrets/{name}", get(secret))
            .with_state(MockState {
                base,
                expires_in,
                token_calls: calls,
            })
    })
    .await;

    let config = AzureKeyVaultConfig {
        tenant_id: "tenant".to_string(),
        client_id: "client".to_string(),
        client_secret: Zeroizing::new("shh".to_string()),
        vault_url: base.clone(),
        authority_host: base,
    };
    let client = AzureKeyVault::new(&config, Duration::from_secs(5)).unwrap();
    (client, token_calls)
}

#[tokio::test]
async fn test_fetch_reads_value_and_attributes() {
    let (client, _) = start(3600).await;
    let record = client.fetch_secret("db-password").await.unwrap();

    assert_eq!(record.value.as_str(), "s3cret");
    assert_eq!(record.updated_at.unwrap().timestamp(), 1_700_000_000);
    assert_eq!(record.expires_at.unwrap().timestamp(), 1_800_000_000);

    let record = client.fetch_secret("no-attributes").await.unwrap();
    assert_eq!(record.value.as_str(), "plain");
    assert!(record.updated_at.is_none());
    assert!(record.expires_at.is_none());
}

#[tokio::test]
async fn test_token_is_reused_while_fresh() {
    let (client, token_calls) = start(3600).await;
    for _ in 0..3 {
        client.fetch_secret("db-password").await.unwrap();
    }
    client.list_secrets().await.unwrap();
    assert_eq!(token_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_oversized_token_lifetime_does_not_panic() {
    let (client, token_calls) = start(u64::MAX).await;
    let fetches = tokio::spawn(async move {
        client.fetch_secret("db-password").await.unwrap();
        client.fetch_secret("db-password").await.unwrap();
    });

    fetches.await.unwrap();
    assert_eq!(token_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_token_inside_expiry_margin_is_refreshed() {
    let (client, token_calls) = start(30).await;
    for expected in 1..=3 {
        client.fetch_secret("db-password").await.unwrap();
        assert_eq!(token_calls.load(Ordering::SeqCst), expected);
    }
}

#[tokio::test]
async fn test_list_follows_next_link() {
    let (client, _) = start(3600).await;
    let names = client.list_secrets().await.unwrap();
    assert_eq!(names, vec!["first", "second", "third"]);
}

#[tokio::test]
async fn test_missing_secret_is_a_fetch_error() {
    let (client, _) = start(3600).await;
    let err = client.fetch_secret("absent").await.unwrap_err();
    match err {
        BackendError::Fetch { secret, status } => {
            assert_eq!(secret, "absent");
            assert_eq!(status.as_u16(), 404);
        }
        other => panic!("Expected fetch error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_malformed_body_is_a_decode_error() {
    let (client, _) = start(3600).await;
    let err = client.fetch_secret("garbled").await.unwrap_err();
    assert!(matches!(err, BackendError::Decode { .. }));
}

#[tokio::test]
async fn test_rejected_credentials_are_an_auth_error() {
    init_rustls();
    let base = spawn_mock(|_| {
        Router::new().route(
            "/{tenant}/oauth2/v2.0/token",
            post(|| async { (StatusCode::UNAUTHORIZED, "invalid_client") }),
        )
    })
    .await;
    let config = AzureKeyVaultConfig {
        tenant_id: "tenant".to_string(),
        client_id: "client".to_string(),
        client_secret: Zeroizing::new("wrong".to_string()),
        vault_url: base.clone(),
        authority_host: base,
    };
    let client = AzureKeyVault::new(&config, Duration::from_secs(5)).unwrap();

    let err = client.fetch_secret("db-password").await.unwrap_err();
    assert!(matches!(err, BackendError::Auth { .. }));
    assert!(err.to_string().contains("401"));
}
