//! # Runtime
//!
//! Process wiring for the daemon: metrics, backend client, registry, driver,
//! refresh scheduler and the plugin socket, in that order.

use crate::config::{BackendConfig, PluginConfig};
use crate::constants::REFRESH_SHUTDOWN_GRACE_SECS;
use crate::driver::VolumeDriver;
use crate::observability;
use crate::provider::build_backend;
use crate::server::{start_server, ServerState};
use crate::volume::{is_valid_name, RefreshScheduler, Registry};
use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Everything the serve loop needs once startup has succeeded
pub struct InitializationResult {
    pub config: PluginConfig,
    pub driver: Arc<VolumeDriver>,
    pub server_state: Arc<ServerState>,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("socket_path", &self.config.socket_path())
            .field("server_ready", &self.server_state.is_ready.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Build every component and start the metrics server
///
/// # Errors
/// Returns an error if metrics registration, backend construction or the secrets root fails
pub async fn initialize(
    config: PluginConfig,
    backend_config: &BackendConfig,
) -> Result<InitializationResult> {
    info!("Starting secret volume plugin with {} backend", backend_config.kind());
    info!(
        "Build info: timestamp={}, datetime={}, git_hash={}",
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );

    let server_state = Arc::new(ServerState {
        is_ready: Arc::new(AtomicBool::new(false)),
    });

    if config.enable_metrics {
        observability::metrics::register_metrics()?;

        let server_state_clone = Arc::clone(&server_state);
        let server_port = config.metrics_port;
        tokio::spawn(async move {
            if let Err(e) = start_server(server_port, server_state_clone).await {
                error!("HTTP server error: {}", e);
            }
        });
    }

    let backend = build_backend(backend_config, config.http_timeout())
        .context("Failed to create secret backend client")?;
    let registry = Registry::open(config.secrets_root.clone(), backend)
        .await
        .context("Failed to open volume registry")?;
    let driver = Arc::new(VolumeDriver::new(
        Arc::new(registry),
        config.create_mode.clone(),
    ));

    Ok(InitializationResult {
        config,
        driver,
        server_state,
    })
}

/// Run the daemon until the plugin server fails or a shutdown signal arrives
///
/// # Errors
/// Returns an error if startup fails or the plugin socket cannot be served
pub async fn run(config: PluginConfig, backend_config: BackendConfig) -> Result<()> {
    let init = initialize(config, &backend_config).await?;
    let registry = Arc::clone(init.driver.registry());

    let added = registry.reconcile().await;
    info!(added, "Initial reconcile complete");

    let scheduler = RefreshScheduler::spawn(
        Arc::clone(&registry),
        init.config.refresh_interval(),
        init.config.refresh_throttle(),
    );

    let socket_path = init.config.socket_path();
    let result = serve(&init, &socket_path).await;

    scheduler
        .shutdown(Duration::from_secs(REFRESH_SHUTDOWN_GRACE_SECS))
        .await;
    init.server_state.is_ready.store(false, Ordering::Relaxed);
    #[cfg(unix)]
    if let Err(e) = std::fs::remove_file(&socket_path) {
        warn!("Failed to remove plugin socket {}: {}", socket_path.display(), e);
    }

    info!("Secret volume plugin stopped");
    result
}

#[cfg(unix)]
async fn serve(init: &InitializationResult, socket_path: &std::path::Path) -> Result<()> {
    let listener = crate::server::bind_plugin_socket(socket_path)?;
    init.server_state.is_ready.store(true, Ordering::Relaxed);

    tokio::select! {
        result = crate::server::serve_plugin_on(listener, Arc::clone(&init.driver)) => result,
        () = shutdown_signal() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn serve(init: &InitializationResult, socket_path: &std::path::Path) -> Result<()> {
    crate::server::serve_plugin(Arc::clone(&init.driver), socket_path).await
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let ctrl_c = tokio::signal::ctrl_c();
    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = ctrl_c => info!("Received SIGINT, shutting down"),
                _ = terminate.recv() => info!("Received SIGTERM, shutting down"),
            }
        }
        Err(e) => {
            warn!("Failed to install SIGTERM handler: {}", e);
            if ctrl_c.await.is_ok() {
                info!("Received SIGINT, shutting down");
            }
        }
    }
}

/// Validate the configuration and print the secrets the backend would expose
///
/// # Errors
/// Returns an error if the backend cannot be built or listed
pub async fn check(config: &PluginConfig, backend_config: &BackendConfig) -> Result<()> {
    let backend = build_backend(backend_config, config.http_timeout())
        .context("Failed to create secret backend client")?;
    let names = backend
        .list_secrets()
        .await
        .with_context(|| format!("Failed to list secrets from {} backend", backend.kind()))?;

    println!("Backend: {}", backend.kind());
    println!("Secrets root: {}", config.secrets_root.display());
    println!("Plugin socket: {}", config.socket_path().display());
    println!();
    for name in &names {
        let status = if is_valid_name(name) { "ok" } else { "invalid name" };
        println!("  {name:<40} {status}");
    }
    let valid = names.iter().filter(|name| is_valid_name(name)).count();
    println!();
    println!("{} secrets, {} mountable", names.len(), valid);
    Ok(())
}
