//! # HTTP Servers
//!
//! Two axum servers:
//!
//! - the plugin API, served over the Docker plugin Unix socket
//!   (`POST /Plugin.Activate`, `POST /VolumeDriver.*`)
//! - metrics and probes on TCP port 5000 by default (`METRICS_PORT`):
//!   - `/metrics` - Prometheus metrics in text format
//!   - `/healthz` - Liveness probe (always returns 200)
//!   - `/readyz` - Readiness probe (200 once the plugin socket is bound)

use crate::constants::PLUGIN_CONTENT_TYPE;
use crate::driver::types::{
    ActivateResponse, CapabilitiesResponse, CreateRequest, ErrorResponse, GetResponse,
    ListResponse, MountRequest, MountpointResponse, NameRequest,
};
use crate::driver::VolumeDriver;
use axum::{
    body::Bytes,
    extract::State,
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

#[cfg(unix)]
pub use unix::{bind_plugin_socket, serve_plugin_on};

#[derive(Debug, Default)]
pub struct ServerState {
    pub is_ready: Arc<AtomicBool>,
}

/// Router implementing the Docker volume plugin protocol
pub fn plugin_router(driver: Arc<VolumeDriver>) -> Router {
    Router::new()
        .route("/Plugin.Activate", post(activate))
        .route("/VolumeDriver.Create", post(create))
        .route("/VolumeDriver.Remove", post(remove))
        .route("/VolumeDriver.Mount", post(mount))
        .route("/VolumeDriver.Unmount", post(unmount))
        .route("/VolumeDriver.Path", post(path))
        .route("/VolumeDriver.Get", post(get_volume))
        .route("/VolumeDriver.List", post(list))
        .route("/VolumeDriver.Capabilities", post(capabilities))
        .with_state(driver)
        .layer(TraceLayer::new_for_http())
}

/// Bind the plugin socket and serve `driver` on it until the server fails
///
/// # Errors
/// Returns an error if the socket cannot be bound or the server stops with an error
#[cfg(unix)]
pub async fn serve_plugin(driver: Arc<VolumeDriver>, socket_path: &Path) -> anyhow::Result<()> {
    let listener = bind_plugin_socket(socket_path)?;
    serve_plugin_on(listener, driver).await
}

/// Named-pipe transport is not provided; run the Linux plugin instead
///
/// # Errors
/// Always
#[cfg(not(unix))]
pub async fn serve_plugin(_driver: Arc<VolumeDriver>, socket_path: &Path) -> anyhow::Result<()> {
    anyhow::bail!(
        "Plugin transport for {} is only available on Unix platforms",
        socket_path.display()
    )
}

#[cfg(unix)]
mod unix {
    use super::plugin_router;
    use crate::constants::PLUGIN_SOCKET_MODE;
    use crate::driver::VolumeDriver;
    use anyhow::Context;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use std::sync::Arc;
    use tokio::net::UnixListener;
    use tracing::info;

    /// Bind the plugin socket, replacing a stale one left by a previous run
    ///
    /// # Errors
    /// Returns an error if the directory, bind or permission change fails
    pub fn bind_plugin_socket(socket_path: &Path) -> anyhow::Result<UnixListener> {
        if let Some(dir) = socket_path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create socket directory {}", dir.display()))?;
        }
        match std::fs::remove_file(socket_path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                return Err(e).with_context(|| {
                    format!("Failed to remove stale socket {}", socket_path.display())
                });
            }
            _ => {}
        }

        let listener = UnixListener::bind(socket_path)
            .with_context(|| format!("Failed to bind plugin socket {}", socket_path.display()))?;
        std::fs::set_permissions(
            socket_path,
            std::fs::Permissions::from_mode(PLUGIN_SOCKET_MODE),
        )
        .with_context(|| format!("Failed to set permissions on {}", socket_path.display()))?;

        info!("Plugin API listening on {}", socket_path.display());
        Ok(listener)
    }

    /// # Errors
    /// Returns an error if the server stops with an error
    pub async fn serve_plugin_on(
        listener: UnixListener,
        driver: Arc<VolumeDriver>,
    ) -> anyhow::Result<()> {
        axum::serve(listener, plugin_router(driver))
            .await
            .context("Plugin API server failed")
    }
}

/// Serve metrics and probes on `port`
///
/// # Errors
/// Returns an error if the port cannot be bound or the server fails
pub async fn start_server(port: u16, state: Arc<ServerState>) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .with_state(state);

    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr).await?;

    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = crate::observability::metrics::REGISTRY.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        buffer,
    )
}

async fn healthz_handler() -> impl IntoResponse {
    StatusCode::OK
}

async fn readyz_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    if state.is_ready.load(Ordering::Relaxed) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

// Plugin protocol handlers

/// Docker sends an empty body for some calls and does not always set a JSON content type
fn decode<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, Response> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| failure(format!("Invalid request body: {e}")))
}

fn reply<T: Serialize>(body: &T) -> Response {
    match serde_json::to_vec(body) {
        Ok(bytes) => ([(CONTENT_TYPE, PLUGIN_CONTENT_TYPE)], bytes).into_response(),
        Err(e) => failure(format!("Failed to encode response: {e}")),
    }
}

fn empty() -> Response {
    ([(CONTENT_TYPE, PLUGIN_CONTENT_TYPE)], "{}").into_response()
}

fn failure(message: String) -> Response {
    let body = serde_json::to_vec(&ErrorResponse { err: message }).unwrap_or_default();
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        [(CONTENT_TYPE, PLUGIN_CONTENT_TYPE)],
        body,
    )
        .into_response()
}

async fn activate() -> Response {
    reply(&ActivateResponse {
        implements: vec!["VolumeDriver"],
    })
}

async fn create(State(driver): State<Arc<VolumeDriver>>, body: Bytes) -> Response {
    let req: CreateRequest = match decode(&body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    match driver.create(&req.name).await {
        Ok(()) => empty(),
        Err(e) => {
            warn!(volume = %req.name, error = %e, "Create failed");
            failure(e.to_string())
        }
    }
}

async fn remove(State(driver): State<Arc<VolumeDriver>>, body: Bytes) -> Response {
    let req: NameRequest = match decode(&body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    match driver.remove(&req.name).await {
        Ok(()) => empty(),
        Err(e) => failure(e.to_string()),
    }
}

async fn mount(State(driver): State<Arc<VolumeDriver>>, body: Bytes) -> Response {
    let req: MountRequest = match decode(&body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    match driver.mount(&req.name, &req.id).await {
        Ok(path) => reply(&MountpointResponse {
            mountpoint: path.display().to_string(),
        }),
        Err(e) => {
            warn!(volume = %req.name, error = %e, "Mount failed");
            failure(e.to_string())
        }
    }
}

async fn unmount(State(driver): State<Arc<VolumeDriver>>, body: Bytes) -> Response {
    let req: MountRequest = match decode(&body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    match driver.unmount(&req.name, &req.id).await {
        Ok(()) => empty(),
        Err(e) => failure(e.to_string()),
    }
}

async fn path(State(driver): State<Arc<VolumeDriver>>, body: Bytes) -> Response {
    let req: NameRequest = match decode(&body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    match driver.path(&req.name).await {
        Ok(path) => reply(&MountpointResponse {
            mountpoint: path.display().to_string(),
        }),
        Err(e) => failure(e.to_string()),
    }
}

async fn get_volume(State(driver): State<Arc<VolumeDriver>>, body: Bytes) -> Response {
    let req: NameRequest = match decode(&body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    match driver.get(&req.name).await {
        Ok(volume) => reply(&GetResponse { volume }),
        Err(e) => failure(e.to_string()),
    }
}

async fn list(State(driver): State<Arc<VolumeDriver>>) -> Response {
    reply(&ListResponse {
        volumes: driver.list().await,
    })
}

async fn capabilities(State(driver): State<Arc<VolumeDriver>>) -> Response {
    reply(&CapabilitiesResponse {
        capabilities: driver.capabilities(),
    })
}
