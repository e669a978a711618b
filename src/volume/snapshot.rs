//! # Snapshot
//!
//! Durable record of tracked volume metadata (never secret values), stored as
//! `secrets.json` under the secrets root:
//!
//! ```json
//! {
//!   "db-password": {
//!     "SecretName": "db-password",
//!     "UpdatedAt": "2024-01-02T03:04:05Z",
//!     "ExpiresAt": "0001-01-01T00:00:00Z"
//!   }
//! }
//! ```
//!
//! Unknown timestamps are written as the zero time. Writes go to a temporary
//! file in the same directory which is then renamed over the snapshot, so the
//! final path only ever holds a complete snapshot.

use super::{is_valid_name, RegistryError, Volume};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

#[derive(Serialize, Deserialize)]
struct SnapshotEntry {
    #[serde(rename = "SecretName", alias = "secretName")]
    secret_name: String,
    #[serde(rename = "UpdatedAt", alias = "updatedAt", default, with = "zero_time")]
    updated_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(rename = "ExpiresAt", alias = "expiresAt", default, with = "zero_time")]
    expires_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// `None` <-> `0001-01-01T00:00:00Z`
mod zero_time {
    use chrono::{DateTime, Datelike, SecondsFormat, Utc};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub const ZERO_TIME: &str = "0001-01-01T00:00:00Z";

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(t) => serializer.serialize_str(&t.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            None => serializer.serialize_str(ZERO_TIME),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let Some(raw) = Option::<String>::deserialize(deserializer)? else {
            return Ok(None);
        };
        let parsed = DateTime::parse_from_rfc3339(&raw)
            .map_err(D::Error::custom)?
            .with_timezone(&Utc);
        Ok((parsed.year() > 1).then_some(parsed))
    }
}

/// Load the snapshot at `path`
///
/// A missing file is a first run and yields an empty map. Validity is
/// recomputed from each volume name.
///
/// # Errors
/// Returns an error if the file cannot be read or is not a valid snapshot
pub async fn load(path: &Path) -> Result<HashMap<String, Volume>, RegistryError> {
    let data = match tokio::fs::read(path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
        Err(source) => {
            return Err(RegistryError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let entries: BTreeMap<String, SnapshotEntry> =
        serde_json::from_slice(&data).map_err(|source| RegistryError::Decode {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(entries
        .into_iter()
        .map(|(name, entry)| {
            let volume = Volume {
                secret_name: entry.secret_name,
                updated_at: entry.updated_at,
                expires_at: entry.expires_at,
                valid: is_valid_name(&name),
            };
            (name, volume)
        })
        .collect())
}

/// Atomically replace the snapshot at `path` with `volumes`
///
/// # Errors
/// Returns an error if encoding, writing, syncing or renaming fails; the
/// previous snapshot is left in place in every case
pub async fn persist(path: &Path, volumes: &HashMap<String, Volume>) -> Result<(), RegistryError> {
    let entries: BTreeMap<&str, SnapshotEntry> = volumes
        .iter()
        .map(|(name, volume)| {
            let entry = SnapshotEntry {
                secret_name: volume.secret_name.clone(),
                updated_at: volume.updated_at,
                expires_at: volume.expires_at,
            };
            (name.as_str(), entry)
        })
        .collect();
    let data = serde_json::to_vec_pretty(&entries).map_err(RegistryError::Encode)?;

    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || write_atomic(&path, &data)).await?
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<(), RegistryError> {
    let io_error = |source: std::io::Error| RegistryError::Io {
        path: path.to_path_buf(),
        source,
    };
    let dir = path.parent().unwrap_or_else(|| Path::new("."));

    let mut tmp = NamedTempFile::new_in(dir).map_err(io_error)?;
    tmp.write_all(data).map_err(io_error)?;
    tmp.as_file().sync_all().map_err(io_error)?;
    tmp.persist(path).map_err(|e| io_error(e.error))?;
    Ok(())
}
