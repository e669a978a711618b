//! Common imports for embedding the plugin
//!
//! ```ignore
//! use secret_volume_plugin::prelude::*;
//! ```

pub use crate::config::{BackendConfig, ConfigError, CreateMode, PluginConfig};
pub use crate::driver::{DriverError, VolumeDriver};
pub use crate::provider::{build_backend, BackendError, SecretBackend, SecretRecord};
pub use crate::volume::{ContentUpdate, RefreshScheduler, Registry, RegistryError, Volume};
