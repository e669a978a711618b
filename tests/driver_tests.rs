//! Volume lifecycle operations

mod common;

use common::{open_registry, FakeBackend};
use secret_volume_plugin::config::CreateMode;
use secret_volume_plugin::driver::{DriverError, VolumeDriver};
use std::sync::Arc;
use std::time::Duration;

async fn discovery_driver(
    backend: &Arc<FakeBackend>,
) -> (tempfile::TempDir, Arc<VolumeDriver>) {
    let (dir, registry) = open_registry(backend).await;
    (dir, Arc::new(VolumeDriver::new(registry, CreateMode::Discovery)))
}

#[tokio::test]
async fn test_list_reconciles_and_hides_invalid_names() {
    let backend = FakeBackend::with_secrets(&[("Bad Name!", "x"), ("db-password", "s3cret")]);
    let (_dir, driver) = discovery_driver(&backend).await;

    let volumes = driver.list().await;
    assert_eq!(volumes.len(), 1);
    assert_eq!(volumes[0].name, "db-password");
    assert_eq!(
        volumes[0].mountpoint,
        driver.registry().secret_path("db-password").display().to_string()
    );
    assert_eq!(backend.list_count(), 1);
}

#[tokio::test]
async fn test_mount_fetches_then_returns_path() {
    let backend = FakeBackend::with_secrets(&[("db-password", "s3cret")]);
    let (_dir, driver) = discovery_driver(&backend).await;
    driver.list().await;

    let path = driver.mount("db-password", "container-1").await.unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "s3cret");

    // Already materialized: no second fetch
    driver.mount("db-password", "container-2").await.unwrap();
    assert_eq!(backend.fetch_count(), 1);

    assert_eq!(driver.path("db-password").await.unwrap(), path);
    driver.unmount("db-password", "container-1").await.unwrap();
}

#[tokio::test]
async fn test_invalid_volume_is_visible_but_not_mountable() {
    let backend = FakeBackend::with_secrets(&[("Bad Name!", "x")]);
    let (_dir, driver) = discovery_driver(&backend).await;
    assert!(driver.list().await.is_empty());

    let info = driver.get("Bad Name!").await.unwrap();
    assert_eq!(info.name, "Bad Name!");
    assert!(info.mountpoint.is_empty());
    assert_eq!(info.status["valid"], serde_json::Value::Bool(false));

    assert!(matches!(
        driver.mount("Bad Name!", "c").await.unwrap_err(),
        DriverError::NotMountable(_)
    ));
    assert!(matches!(
        driver.path("Bad Name!").await.unwrap_err(),
        DriverError::NotMountable(_)
    ));
    assert_eq!(backend.fetch_count(), 0);
}

#[tokio::test]
async fn test_get_reconciles_unknown_names() {
    let backend = FakeBackend::with_secrets(&[("db", "1")]);
    let (_dir, driver) = discovery_driver(&backend).await;

    backend.set_secret("late", "2");
    backend.set_listing(&["db", "late"]);
    let info = driver.get("late").await.unwrap();
    assert_eq!(info.status["secretName"], "late");
    assert!(info.created_at.is_none());

    assert!(matches!(
        driver.get("nowhere").await.unwrap_err(),
        DriverError::NotFound(_)
    ));
}

#[tokio::test]
async fn test_get_reports_created_at_after_mount() {
    let backend = FakeBackend::with_secrets(&[("db", "1")]);
    let (_dir, driver) = discovery_driver(&backend).await;
    driver.list().await;
    driver.mount("db", "c").await.unwrap();

    let info = driver.get("db").await.unwrap();
    assert_eq!(info.created_at.as_deref(), Some("2024-01-02T03:04:05Z"));
}

#[tokio::test]
async fn test_unknown_volume_operations_fail() {
    let backend = FakeBackend::with_secrets(&[]);
    let (_dir, driver) = discovery_driver(&backend).await;

    assert!(matches!(
        driver.mount("ghost", "c").await.unwrap_err(),
        DriverError::NotFound(_)
    ));
    assert!(matches!(
        driver.path("ghost").await.unwrap_err(),
        DriverError::NotFound(_)
    ));
    assert!(matches!(
        driver.unmount("ghost", "c").await.unwrap_err(),
        DriverError::NotFound(_)
    ));
    assert!(matches!(
        driver.remove("ghost").await.unwrap_err(),
        DriverError::NotFound(_)
    ));
}

#[tokio::test]
async fn test_mount_failure_is_reported() {
    let backend = FakeBackend::with_secrets(&[("db", "1")]);
    backend.fail_fetches(true);
    let (_dir, driver) = discovery_driver(&backend).await;
    driver.list().await;

    let err = driver.mount("db", "c").await.unwrap_err();
    assert!(matches!(err, DriverError::Registry(_)));
    assert!(err.to_string().contains("db"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_mounts_fetch_once() {
    let backend = FakeBackend::with_secrets(&[("db", "1")]);
    backend.set_delay(Duration::from_millis(100));
    let (_dir, driver) = discovery_driver(&backend).await;
    driver.list().await;

    let mounts: Vec<_> = (0..8)
        .map(|i| {
            let driver = Arc::clone(&driver);
            tokio::spawn(async move { driver.mount("db", &format!("c{i}")).await })
        })
        .collect();
    for mount in mounts {
        mount.await.unwrap().unwrap();
    }

    assert_eq!(backend.fetch_count(), 1);
}

#[tokio::test]
async fn test_remove_deletes_file() {
    let backend = FakeBackend::with_secrets(&[("db", "1")]);
    let (_dir, driver) = discovery_driver(&backend).await;
    driver.list().await;
    let path = driver.mount("db", "c").await.unwrap();

    driver.remove("db").await.unwrap();
    assert!(!path.exists());
    assert!(!driver.registry().contains("db").await);
}

#[tokio::test]
async fn test_discovery_create_is_a_no_op() {
    let backend = FakeBackend::with_secrets(&[]);
    let (_dir, driver) = discovery_driver(&backend).await;

    driver.create("anything").await.unwrap();
    assert!(!driver.registry().contains("anything").await);
    assert_eq!(backend.fetch_count(), 0);
}

#[tokio::test]
async fn test_provisioning_create() {
    let backend = FakeBackend::with_secrets(&[("db", "1")]);
    let (_dir, registry) = open_registry(&backend).await;
    let driver = VolumeDriver::new(
        registry,
        CreateMode::Provisioning {
            prefix: "app-".to_string(),
        },
    );

    driver.create("app-db").await.unwrap();
    let volume = driver.registry().get("app-db").await.unwrap();
    assert_eq!(volume.secret_name, "db");
    assert_eq!(
        std::fs::read_to_string(driver.path("app-db").await.unwrap()).unwrap(),
        "1"
    );

    // Existing volume: no second fetch
    driver.create("app-db").await.unwrap();
    assert_eq!(backend.fetch_count(), 1);

    for name in ["db", "app-"] {
        assert!(matches!(
            driver.create(name).await.unwrap_err(),
            DriverError::MissingPrefix { .. }
        ));
    }

    assert!(matches!(
        driver.create("app-Bad Name").await.unwrap_err(),
        DriverError::NotMountable(_)
    ));

    assert!(matches!(
        driver.create("app-missing").await.unwrap_err(),
        DriverError::Registry(_)
    ));
    assert!(!driver.registry().contains("app-missing").await);
}

#[tokio::test]
async fn test_capabilities_scope_is_local() {
    let backend = FakeBackend::with_secrets(&[]);
    let (_dir, driver) = discovery_driver(&backend).await;
    assert_eq!(driver.capabilities().scope, "local");
}
