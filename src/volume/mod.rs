//! # Volumes
//!
//! The volume-state engine: tracked volumes, their on-disk secret files, the
//! durable snapshot of their metadata, and the background refresh.
//!
//! - `registry`: the lock-guarded volume map and every operation on it
//! - `snapshot`: load and atomically persist the metadata snapshot
//! - `refresh`: the interval task that re-fetches every tracked secret

use crate::constants::SNAPSHOT_FILE_NAME;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::LazyLock;

pub mod refresh;
pub mod registry;
pub mod snapshot;

pub use refresh::RefreshScheduler;
pub use registry::{ContentUpdate, Registry, RegistryError, SweepSummary};

/// Lower-case alphanumerics plus `_.-`, starting with an alphanumeric
static VOLUME_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9][a-z0-9_.-]*$")
        .expect("Failed to compile volume name regex - this should never happen")
});

/// Whether `name` may be exposed as a mountable volume
///
/// Names that fail this check are still tracked, they just never get a file.
/// The snapshot shares the secrets root, so its file name is reserved.
#[must_use]
pub fn is_valid_name(name: &str) -> bool {
    VOLUME_NAME.is_match(name) && name != SNAPSHOT_FILE_NAME
}

/// Metadata for one tracked volume
///
/// The registry map key is the volume name; `secret_name` is what the backend
/// is asked for. Timestamps are `None` until the backend has reported them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Volume {
    pub secret_name: String,
    pub updated_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Derived from the volume name, never persisted
    pub valid: bool,
}

impl Volume {
    #[must_use]
    pub fn new(name: &str, secret_name: impl Into<String>) -> Self {
        Self {
            secret_name: secret_name.into(),
            updated_at: None,
            expires_at: None,
            valid: is_valid_name(name),
        }
    }
}
