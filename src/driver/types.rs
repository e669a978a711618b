//! Docker volume plugin protocol bodies
//!
//! Field names follow the plugin protocol's PascalCase JSON.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// `/VolumeDriver.Create`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateRequest {
    pub name: String,
    #[serde(default)]
    pub opts: Option<HashMap<String, String>>,
}

/// `/VolumeDriver.Remove`, `/VolumeDriver.Path`, `/VolumeDriver.Get`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NameRequest {
    pub name: String,
}

/// `/VolumeDriver.Mount`, `/VolumeDriver.Unmount`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MountRequest {
    pub name: String,
    #[serde(rename = "ID", default)]
    pub id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct VolumeInfo {
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub mountpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub status: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct MountpointResponse {
    pub mountpoint: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetResponse {
    pub volume: VolumeInfo,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListResponse {
    pub volumes: Vec<VolumeInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Capability {
    pub scope: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CapabilitiesResponse {
    pub capabilities: Capability,
}

/// `/Plugin.Activate`
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ActivateResponse {
    pub implements: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    #[serde(rename = "Err")]
    pub err: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mount_request_decodes_id() {
        let req: MountRequest =
            serde_json::from_str(r#"{"Name":"db-password","ID":"abc123"}"#).unwrap();
        assert_eq!(req.name, "db-password");
        assert_eq!(req.id, "abc123");
    }

    #[test]
    fn test_create_request_with_null_opts() {
        let req: CreateRequest = serde_json::from_str(r#"{"Name":"db","Opts":null}"#).unwrap();
        assert!(req.opts.is_none());
    }

    #[test]
    fn test_volume_info_omits_empty_fields() {
        let info = VolumeInfo {
            name: "db".to_string(),
            ..VolumeInfo::default()
        };
        assert_eq!(serde_json::to_string(&info).unwrap(), r#"{"Name":"db"}"#);
    }
}
