//! # Volume Registry
//!
//! In-memory map of volume name to [`Volume`], guarded by one reader/writer
//! lock and mirrored to the snapshot on every change. Secret files live at
//! `<secrets root>/<volume name>` and are only touched while the write lock
//! is held.
//!
//! Names that fail the naming policy are tracked but never get a file, so a
//! name like `../x` never reaches the filesystem.

use super::{snapshot, Volume};
use crate::constants::SNAPSHOT_FILE_NAME;
#[cfg(unix)]
use crate::constants::SECRET_FILE_MODE;
use crate::observability::metrics;
use crate::provider::{BackendError, SecretBackend};
use chrono::Utc;
use std::collections::HashMap;
use std::io::Write;
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{watch, RwLock};
use tracing::{debug, error, info, warn};
use zeroize::Zeroizing;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Unknown volume {0}")]
    UnknownVolume(String),
    #[error("Volume name {0:?} must match [a-z0-9][a-z0-9_.-]* and not be the snapshot file name")]
    InvalidName(String),
    #[error("Failed to fetch secret for volume {volume}: {source}")]
    Backend {
        volume: String,
        #[source]
        source: BackendError,
    },
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to encode snapshot: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("Failed to decode snapshot {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Snapshot writer task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Outcome of one content check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentUpdate {
    /// No backend call: the volume is not mountable, or its file does not exist yet
    Skipped,
    /// Fetched value already matched the file
    Unchanged,
    /// File (re)written and metadata updated
    Written,
}

/// Counts from one refresh sweep
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepSummary {
    pub written: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug)]
pub struct Registry {
    root: PathBuf,
    snapshot_path: PathBuf,
    backend: Arc<dyn SecretBackend>,
    volumes: RwLock<HashMap<String, Volume>>,
}

impl Registry {
    /// Open the registry rooted at `root`, creating the directory if needed
    ///
    /// An unreadable snapshot is logged and the registry starts empty.
    ///
    /// # Errors
    /// Returns an error if the secrets root cannot be created
    pub async fn open(
        root: impl Into<PathBuf>,
        backend: Arc<dyn SecretBackend>,
    ) -> Result<Self, RegistryError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|source| RegistryError::Io {
                path: root.clone(),
                source,
            })?;

        let snapshot_path = root.join(SNAPSHOT_FILE_NAME);
        let volumes = match snapshot::load(&snapshot_path).await {
            Ok(volumes) => {
                info!(count = volumes.len(), path = %snapshot_path.display(), "Loaded volume snapshot");
                volumes
            }
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable volume snapshot, starting empty");
                HashMap::new()
            }
        };
        update_gauges(&volumes);

        Ok(Self {
            root,
            snapshot_path,
            backend,
            volumes: RwLock::new(volumes),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Deterministic file path for a volume
    pub fn secret_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Track every backend secret not seen before
    ///
    /// Names that disappear from the backend stay tracked until removed
    /// explicitly. Listing failures are logged and leave the map untouched.
    /// Returns the number of newly tracked volumes.
    pub async fn reconcile(&self) -> usize {
        let names = match self.backend.list_secrets().await {
            Ok(names) => names,
            Err(e) => {
                error!(backend = self.backend.kind(), error = %e, "Failed to list secrets");
                return 0;
            }
        };

        let mut volumes = self.volumes.write().await;
        let mut added = 0;
        for name in names {
            if volumes.contains_key(&name) {
                continue;
            }
            let volume = Volume::new(&name, name.clone());
            if volume.valid {
                debug!(volume = %name, "Tracking new volume");
            } else {
                warn!(
                    volume = %name,
                    "Skipping invalid or reserved secret name, must match [a-z0-9][a-z0-9_.-]*"
                );
            }
            volumes.insert(name, volume);
            added += 1;
        }

        if added > 0 {
            self.persist_locked(&volumes).await;
            update_gauges(&volumes);
        }
        added
    }

    /// Fetch a volume's secret and write it if it changed
    ///
    /// When the file does not exist yet, nothing is fetched unless `create` is set.
    ///
    /// # Errors
    /// Returns an error if the volume is unknown, the fetch fails, or the file cannot be written
    pub async fn ensure_content(
        &self,
        name: &str,
        create: bool,
    ) -> Result<ContentUpdate, RegistryError> {
        let mut volumes = self.volumes.write().await;
        self.ensure_locked(&mut volumes, name, create).await
    }

    /// Make sure a mountable volume has its file, fetching it at most once
    ///
    /// # Errors
    /// Returns an error if the volume is unknown or invalid, or the first fetch fails
    pub async fn ensure_mounted(&self, name: &str) -> Result<PathBuf, RegistryError> {
        let path = self.secret_path(name);
        {
            let volumes = self.volumes.read().await;
            let volume = volumes
                .get(name)
                .ok_or_else(|| RegistryError::UnknownVolume(name.to_string()))?;
            if !volume.valid {
                return Err(RegistryError::InvalidName(name.to_string()));
            }
            if file_exists(&path).await? {
                return Ok(path);
            }
        }

        // Re-check under the write lock: a concurrent mount may have fetched it already
        let mut volumes = self.volumes.write().await;
        if !volumes.contains_key(name) {
            return Err(RegistryError::UnknownVolume(name.to_string()));
        }
        if !file_exists(&path).await? {
            self.ensure_locked(&mut volumes, name, true).await?;
        }
        Ok(path)
    }

    /// Track `name` for `secret_name` and fetch it immediately
    ///
    /// A failed fetch rolls back the entry and any partial file. Returns
    /// `false` if the volume was already tracked.
    ///
    /// # Errors
    /// Returns an error if the name is invalid or the first fetch fails
    pub async fn provision(&self, name: &str, secret_name: &str) -> Result<bool, RegistryError> {
        let volume = Volume::new(name, secret_name);
        if !volume.valid {
            return Err(RegistryError::InvalidName(name.to_string()));
        }

        let mut volumes = self.volumes.write().await;
        if volumes.contains_key(name) {
            return Ok(false);
        }
        volumes.insert(name.to_string(), volume);

        if let Err(e) = self.ensure_locked(&mut volumes, name, true).await {
            volumes.remove(name);
            let path = self.secret_path(name);
            if let Err(remove_err) = remove_file_if_exists(&path).await {
                warn!(volume = name, error = %remove_err, "Failed to remove file during rollback");
            }
            warn!(volume = name, error = %e, "Rolled back volume after failed fetch");
            return Err(e);
        }

        update_gauges(&volumes);
        Ok(true)
    }

    /// Stop tracking a volume and delete its file
    ///
    /// File deletion failures are logged; the entry is removed regardless.
    ///
    /// # Errors
    /// Returns an error if the volume is unknown
    pub async fn remove(&self, name: &str) -> Result<(), RegistryError> {
        let mut volumes = self.volumes.write().await;
        let volume = volumes
            .remove(name)
            .ok_or_else(|| RegistryError::UnknownVolume(name.to_string()))?;

        if volume.valid {
            if let Err(e) = remove_file_if_exists(&self.secret_path(name)).await {
                warn!(volume = name, error = %e, "Failed to delete secret file");
            }
        }

        self.persist_locked(&volumes).await;
        update_gauges(&volumes);
        info!(volume = name, "Removed volume");
        Ok(())
    }

    /// Re-fetch every tracked secret that already has a file
    ///
    /// The write lock is held for the whole sweep, including the `throttle`
    /// delay inserted between consecutive backend calls.
    pub async fn refresh_all(&self, throttle: Duration) -> SweepSummary {
        let (_stop_tx, stop) = watch::channel(false);
        self.refresh_until(throttle, stop).await
    }

    /// [`Registry::refresh_all`] that ends early once `stop` turns true
    ///
    /// `stop` is checked before each backend call and wakes the throttle
    /// delay. A fetch and write already in progress always completes.
    pub async fn refresh_until(
        &self,
        throttle: Duration,
        mut stop: watch::Receiver<bool>,
    ) -> SweepSummary {
        let start = Instant::now();
        let mut summary = SweepSummary::default();
        let mut volumes = self.volumes.write().await;

        let mut names: Vec<String> = volumes.keys().cloned().collect();
        names.sort();

        let mut fetched = false;
        let mut stopped = false;
        for (index, name) in names.iter().enumerate() {
            if stop_requested(&stop) {
                summary.skipped += names.len() - index;
                stopped = true;
                break;
            }

            let refreshable = volumes.get(name).is_some_and(|v| v.valid)
                && file_exists(&self.secret_path(name)).await.unwrap_or(false);
            if !refreshable {
                summary.skipped += 1;
                continue;
            }

            if fetched && !throttle.is_zero() {
                tokio::select! {
                    () = tokio::time::sleep(throttle) => {}
                    _ = stop.changed() => {}
                }
                if stop_requested(&stop) {
                    summary.skipped += names.len() - index;
                    stopped = true;
                    break;
                }
            }
            fetched = true;

            match self.ensure_locked(&mut volumes, name, false).await {
                Ok(ContentUpdate::Written) => summary.written += 1,
                Ok(ContentUpdate::Unchanged) => summary.unchanged += 1,
                Ok(ContentUpdate::Skipped) => summary.skipped += 1,
                Err(e) => {
                    summary.failed += 1;
                    error!(volume = %name, error = %e, "Failed to refresh secret");
                }
            }
        }
        drop(volumes);

        metrics::observe_refresh_sweep(start.elapsed().as_secs_f64());
        info!(
            written = summary.written,
            unchanged = summary.unchanged,
            skipped = summary.skipped,
            failed = summary.failed,
            stopped,
            "Refresh sweep complete"
        );
        summary
    }

    pub async fn get(&self, name: &str) -> Option<Volume> {
        self.volumes.read().await.get(name).cloned()
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.volumes.read().await.contains_key(name)
    }

    /// Every tracked volume, sorted by name
    pub async fn volumes(&self) -> Vec<(String, Volume)> {
        let volumes = self.volumes.read().await;
        let mut all: Vec<(String, Volume)> = volumes
            .iter()
            .map(|(name, volume)| (name.clone(), volume.clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// Mountable volumes, sorted by name
    pub async fn valid_volumes(&self) -> Vec<(String, Volume)> {
        let mut all = self.volumes().await;
        all.retain(|(_, volume)| volume.valid);
        all
    }

    async fn ensure_locked(
        &self,
        volumes: &mut HashMap<String, Volume>,
        name: &str,
        create: bool,
    ) -> Result<ContentUpdate, RegistryError> {
        let volume = volumes
            .get(name)
            .ok_or_else(|| RegistryError::UnknownVolume(name.to_string()))?;
        if !volume.valid {
            return Ok(ContentUpdate::Skipped);
        }
        let secret_name = volume.secret_name.clone();

        let path = self.secret_path(name);
        let current = read_if_exists(&path).await?;
        if current.is_none() && !create {
            return Ok(ContentUpdate::Skipped);
        }

        let record = self
            .backend
            .fetch_secret(&secret_name)
            .await
            .map_err(|source| RegistryError::Backend {
                volume: name.to_string(),
                source,
            })?;

        if current.as_deref().map(Vec::as_slice) == Some(record.value.as_bytes()) {
            metrics::increment_files_unchanged();
            debug!(volume = name, "Secret unchanged, skipping write");
            return Ok(ContentUpdate::Unchanged);
        }

        write_secret_file(&path, Zeroizing::new(record.value.as_bytes().to_vec())).await?;
        metrics::increment_files_written();

        if let Some(volume) = volumes.get_mut(name) {
            volume.updated_at = record.updated_at.or_else(|| Some(Utc::now()));
            volume.expires_at = record.expires_at;
        }
        self.persist_locked(volumes).await;

        info!(volume = name, "Updated secret for volume");
        Ok(ContentUpdate::Written)
    }

    /// Snapshot failures are logged; memory stays authoritative until the next write
    async fn persist_locked(&self, volumes: &HashMap<String, Volume>) {
        if let Err(e) = snapshot::persist(&self.snapshot_path, volumes).await {
            error!(error = %e, "Failed to persist volume snapshot");
        }
    }
}

fn update_gauges(volumes: &HashMap<String, Volume>) {
    let valid = volumes.values().filter(|v| v.valid).count();
    metrics::set_volumes(volumes.len(), valid);
}

async fn file_exists(path: &Path) -> Result<bool, RegistryError> {
    tokio::fs::try_exists(path)
        .await
        .map_err(|source| RegistryError::Io {
            path: path.to_path_buf(),
            source,
        })
}

async fn read_if_exists(path: &Path) -> Result<Option<Zeroizing<Vec<u8>>>, RegistryError> {
    match tokio::fs::read(path).await {
        Ok(data) => Ok(Some(Zeroizing::new(data))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(RegistryError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// A stop was sent, or the sender is gone
fn stop_requested(stop: &watch::Receiver<bool>) -> bool {
    *stop.borrow() || stop.has_changed().is_err()
}

/// Rewrite in place: containers bind-mount the file, so its inode must not change
///
/// Truncate, write and sync run as one blocking task, so a caller that is
/// cancelled mid-write never leaves a truncated file behind.
async fn write_secret_file(path: &Path, data: Zeroizing<Vec<u8>>) -> Result<(), RegistryError> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || write_in_place(&path, &data)).await?
}

fn write_in_place(path: &Path, data: &[u8]) -> Result<(), RegistryError> {
    let io_error = |source: std::io::Error| RegistryError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(SECRET_FILE_MODE);

    let mut file = options.open(path).map_err(io_error)?;
    file.write_all(data).map_err(io_error)?;
    file.sync_all().map_err(io_error)?;
    Ok(())
}

async fn remove_file_if_exists(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
