//! Vault KV v2 client against an in-process mock

mod common;

use axum::extract::{Path, Query};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use common::{init_rustls, spawn_mock};
use secret_volume_plugin::config::VaultConfig;
use secret_volume_plugin::provider::{BackendError, SecretBackend, VaultKv};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use zeroize::Zeroizing;

fn has_token(headers: &HeaderMap) -> bool {
    headers.get("x-vault-token").and_then(|v| v.to_str().ok()) == Some("root")
}

async fn read(Path(name): Path<String>, headers: HeaderMap) -> (StatusCode, Json<Value>) {
    if !has_token(&headers) {
        return (StatusCode::FORBIDDEN, Json(json!({"errors": ["permission denied"]})));
    }
    match name.as_str() {
        "db-password" => (
            StatusCode::OK,
            Json(json!({
                "data": {
                    "data": {"Secret": "s3cret", "username": "app"},
                    "metadata": {
                        "created_time": "2024-03-04T05:06:07.123456789Z",
                        "custom_metadata": {"ExpiryDate": "2025-12-31"},
                        "version": 3
                    }
                }
            })),
        ),
        "other-field" => (
            StatusCode::OK,
            Json(json!({
                "data": {
                    "data": {"password": "p"},
                    "metadata": {"created_time": "2024-03-04T05:06:07Z", "custom_metadata": null}
                }
            })),
        ),
        "bad-expiry" => (
            StatusCode::OK,
            Json(json!({
                "data": {
                    "data": {"Secret": "v"},
                    "metadata": {
                        "created_time": "2024-03-04T05:06:07Z",
                        "custom_metadata": {"ExpiryDate": "soon"}
                    }
                }
            })),
        ),
        _ => (StatusCode::NOT_FOUND, Json(json!({"errors": []}))),
    }
}

async fn list(
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    if !has_token(&headers) || query.get("list").map(String::as_str) != Some("true") {
        return (StatusCode::BAD_REQUEST, Json(json!({})));
    }
    (
        StatusCode::OK,
        Json(json!({"data": {"keys": ["db-password", "other-field", "nested/"]}})),
    )
}

async fn client(token: &str) -> VaultKv {
    init_rustls();
    let base = spawn_mock(|_| {
        Router::new()
            .route("/v1/secret/data/{name}", get(read))
            .route("/v1/secret/metadata", get(list))
    })
    .await;

    VaultKv::new(
        &VaultConfig {
            address: base,
            path: "secret".to_string(),
            token: Zeroizing::new(token.to_string()),
            secret_field: "Secret".to_string(),
        },
        Duration::from_secs(5),
    )
    .unwrap()
}

#[tokio::test]
async fn test_fetch_reads_field_and_metadata() {
    let vault = client("root").await;
    let record = vault.fetch_secret("db-password").await.unwrap();

    assert_eq!(record.value.as_str(), "s3cret");
    assert_eq!(
        record.updated_at.unwrap().to_rfc3339(),
        "2024-03-04T05:06:07.123456789+00:00"
    );
    assert_eq!(
        record.expires_at.unwrap().to_rfc3339(),
        "2025-12-31T00:00:00+00:00"
    );
}

#[tokio::test]
async fn test_fetch_falls_back_to_only_field() {
    let vault = client("root").await;
    let record = vault.fetch_secret("other-field").await.unwrap();
    assert_eq!(record.value.as_str(), "p");
    assert!(record.expires_at.is_none());
}

#[tokio::test]
async fn test_unparseable_expiry_fails_the_fetch() {
    let vault = client("root").await;
    let err = vault.fetch_secret("bad-expiry").await.unwrap_err();
    assert!(matches!(err, BackendError::InvalidTimestamp { .. }));
}

#[tokio::test]
async fn test_list_returns_keys_verbatim() {
    let vault = client("root").await;
    assert_eq!(
        vault.list_secrets().await.unwrap(),
        vec!["db-password", "other-field", "nested/"]
    );
}

#[tokio::test]
async fn test_wrong_token_is_reported_per_operation() {
    let vault = client("nope").await;

    match vault.fetch_secret("db-password").await.unwrap_err() {
        BackendError::Fetch { secret, status } => {
            assert_eq!(secret, "db-password");
            assert_eq!(status.as_u16(), 403);
        }
        other => panic!("Expected fetch error, got {other:?}"),
    }
    assert!(matches!(
        vault.list_secrets().await.unwrap_err(),
        BackendError::List { .. }
    ));
}
