//! # Volume Driver
//!
//! The volume lifecycle operations Docker invokes, translated to registry calls.
//!
//! - `create`: no-op in discovery mode; in provisioning mode registers and fetches
//! - `list`: reconcile with the backend, then every mountable volume
//! - `get`: metadata, reconciling first if the name is unknown
//! - `path`: file path of a tracked volume, no side effects
//! - `mount`: fetch the file on first use, then its path
//! - `unmount` / `remove`: existence checks; remove also deletes the file
//! - `capabilities`: local scope

pub mod types;

use crate::config::CreateMode;
use crate::volume::{Registry, RegistryError, Volume};
use chrono::SecondsFormat;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};
use types::{Capability, VolumeInfo};

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Volume {0} not found")]
    NotFound(String),
    #[error("Volume {0} is not mountable: name must match [a-z0-9][a-z0-9_.-]* and not be the snapshot file name")]
    NotMountable(String),
    #[error("Volume name {name:?} must start with {prefix:?} followed by a secret name")]
    MissingPrefix { name: String, prefix: String },
    #[error(transparent)]
    Registry(RegistryError),
}

impl From<RegistryError> for DriverError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::UnknownVolume(name) => Self::NotFound(name),
            RegistryError::InvalidName(name) => Self::NotMountable(name),
            other => Self::Registry(other),
        }
    }
}

#[derive(Debug)]
pub struct VolumeDriver {
    registry: Arc<Registry>,
    create_mode: CreateMode,
}

impl VolumeDriver {
    pub fn new(registry: Arc<Registry>, create_mode: CreateMode) -> Self {
        Self {
            registry,
            create_mode,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// # Errors
    /// In provisioning mode, returns an error if the name lacks the prefix or the first fetch fails
    pub async fn create(&self, name: &str) -> Result<(), DriverError> {
        match &self.create_mode {
            CreateMode::Discovery => {
                debug!(volume = name, "Create ignored, volumes come from the backend listing");
                Ok(())
            }
            CreateMode::Provisioning { prefix } => {
                let secret_name = name
                    .strip_prefix(prefix.as_str())
                    .filter(|rest| !rest.is_empty())
                    .ok_or_else(|| DriverError::MissingPrefix {
                        name: name.to_string(),
                        prefix: prefix.clone(),
                    })?;

                if self.registry.provision(name, secret_name).await? {
                    info!(volume = name, secret = secret_name, "Created volume");
                }
                Ok(())
            }
        }
    }

    pub async fn list(&self) -> Vec<VolumeInfo> {
        self.registry.reconcile().await;
        self.registry
            .valid_volumes()
            .await
            .into_iter()
            .map(|(name, _)| VolumeInfo {
                mountpoint: self.mountpoint(&name),
                name,
                ..VolumeInfo::default()
            })
            .collect()
    }

    /// # Errors
    /// Returns an error if the volume is still unknown after reconciling
    pub async fn get(&self, name: &str) -> Result<VolumeInfo, DriverError> {
        let volume = match self.registry.get(name).await {
            Some(volume) => volume,
            None => {
                self.registry.reconcile().await;
                self.registry
                    .get(name)
                    .await
                    .ok_or_else(|| DriverError::NotFound(name.to_string()))?
            }
        };
        Ok(self.describe(name, &volume))
    }

    /// # Errors
    /// Returns an error if the volume is unknown or not mountable
    pub async fn path(&self, name: &str) -> Result<PathBuf, DriverError> {
        let volume = self
            .registry
            .get(name)
            .await
            .ok_or_else(|| DriverError::NotFound(name.to_string()))?;
        if !volume.valid {
            return Err(DriverError::NotMountable(name.to_string()));
        }
        Ok(self.registry.secret_path(name))
    }

    /// # Errors
    /// Returns an error if the volume is unknown, not mountable, or its first fetch fails
    pub async fn mount(&self, name: &str, id: &str) -> Result<PathBuf, DriverError> {
        let path = self.registry.ensure_mounted(name).await?;
        debug!(volume = name, id, path = %path.display(), "Mounted volume");
        Ok(path)
    }

    /// # Errors
    /// Returns an error if the volume is unknown
    pub async fn unmount(&self, name: &str, id: &str) -> Result<(), DriverError> {
        if !self.registry.contains(name).await {
            return Err(DriverError::NotFound(name.to_string()));
        }
        debug!(volume = name, id, "Unmounted volume");
        Ok(())
    }

    /// # Errors
    /// Returns an error if the volume is unknown
    pub async fn remove(&self, name: &str) -> Result<(), DriverError> {
        self.registry.remove(name).await?;
        Ok(())
    }

    pub fn capabilities(&self) -> Capability {
        Capability { scope: "local" }
    }

    fn mountpoint(&self, name: &str) -> String {
        self.registry.secret_path(name).display().to_string()
    }

    fn describe(&self, name: &str, volume: &Volume) -> VolumeInfo {
        let mut status = BTreeMap::new();
        status.insert(
            "secretName".to_string(),
            serde_json::Value::from(volume.secret_name.clone()),
        );
        if let Some(expires_at) = volume.expires_at {
            status.insert(
                "expiresAt".to_string(),
                serde_json::Value::from(expires_at.to_rfc3339_opts(SecondsFormat::Secs, true)),
            );
        }
        status.insert("valid".to_string(), serde_json::Value::from(volume.valid));

        VolumeInfo {
            name: name.to_string(),
            mountpoint: if volume.valid {
                self.mountpoint(name)
            } else {
                String::new()
            },
            created_at: volume
                .updated_at
                .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true)),
            status,
        }
    }
}
