//! Wire types of the inbound shipping negotiation.

use crate::error::{CtrlError, CtrlResult};
use ferrostor_core::props::PATH_SEPARATOR;
use ferrostor_core::{
    ApiCallRc, NetInterfaceName, NodeName, ResourceName, RetCode, SnapshotName, StorPoolName,
    Version,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One volume described by the source cluster's backup metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupVolumeMetadata {
    pub vlm_nr: u32,
    pub size_kib: u64,
    pub stor_pool_name: String,
}

/// What the source cluster knows about the backup being shipped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupMetadata {
    pub rsc_name: String,
    #[serde(default)]
    pub rsc_dfn_props: BTreeMap<String, String>,
    #[serde(default)]
    pub snap_dfn_props: BTreeMap<String, String>,
    #[serde(default)]
    pub volumes: Vec<BackupVolumeMetadata>,
}

/// Request of a source cluster to ship a backup into this cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupShippingRequest {
    pub src_version: Version,
    pub dst_rsc_name: String,
    #[serde(rename = "metaData")]
    pub metadata: BackupMetadata,
    pub src_backup_name: String,
    pub src_cluster_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst_node_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst_node_net_if_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst_stor_pool: Option<String>,
    #[serde(default)]
    pub stor_pool_rename_map: BTreeMap<String, String>,
    #[serde(default)]
    pub use_zstd: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupShippingResponse {
    pub success: bool,
    pub api_call_results: ApiCallRc,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl BackupShippingResponse {
    pub fn success(api_call_results: ApiCallRc, ip_address: String, port: u16) -> Self {
        Self {
            success: true,
            api_call_results,
            ip_address: Some(ip_address),
            port: Some(port),
        }
    }

    pub fn failure(api_call_results: ApiCallRc) -> Self {
        Self {
            success: false,
            api_call_results,
            ip_address: None,
            port: None,
        }
    }
}

/// Validated state of one inbound shipping session.
#[derive(Debug, Clone)]
pub struct BackupShippingData {
    pub src_version: Version,
    pub dst_rsc_name: ResourceName,
    pub metadata: BackupMetadata,
    pub src_backup_name: String,
    pub src_cluster_id: String,
    pub dst_node_name: Option<NodeName>,
    pub dst_net_if_name: Option<NetInterfaceName>,
    pub dst_stor_pool: Option<StorPoolName>,
    pub stor_pool_rename_map: BTreeMap<StorPoolName, StorPoolName>,
    pub use_zstd: bool,
    /// Filled once a port was allocated.
    pub port: Option<u16>,
    /// Filled by the first transaction.
    pub snap_name: Option<SnapshotName>,
}

impl BackupShippingData {
    /// Validate every name carried by the request.
    pub fn from_request(req: BackupShippingRequest) -> CtrlResult<Self> {
        validate_cluster_id(&req.src_cluster_id)?;
        let stor_pool_rename_map = req
            .stor_pool_rename_map
            .into_iter()
            .map(|(from, to)| -> CtrlResult<_> {
                Ok((StorPoolName::new(from)?, StorPoolName::new(to)?))
            })
            .collect::<CtrlResult<_>>()?;
        Ok(Self {
            src_version: req.src_version,
            dst_rsc_name: ResourceName::new(req.dst_rsc_name)?,
            metadata: req.metadata,
            src_backup_name: req.src_backup_name,
            src_cluster_id: req.src_cluster_id,
            dst_node_name: req.dst_node_name.map(NodeName::new).transpose()?,
            dst_net_if_name: req
                .dst_node_net_if_name
                .map(NetInterfaceName::new)
                .transpose()?,
            dst_stor_pool: req.dst_stor_pool.map(StorPoolName::new).transpose()?,
            stor_pool_rename_map,
            use_zstd: req.use_zstd,
            port: None,
            snap_name: None,
        })
    }
}

/// Cluster ids key the short-id map directly, so they must stay one plain
/// property key segment.
fn validate_cluster_id(cluster_id: &str) -> CtrlResult<()> {
    if cluster_id.trim().is_empty() || cluster_id.contains(PATH_SEPARATOR) {
        return Err(CtrlError::api(
            RetCode::FailInvalidName,
            format!("invalid source cluster id {cluster_id:?}"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_format() {
        let req: BackupShippingRequest = serde_json::from_value(json!({
            "srcVersion": [1, 2, 3],
            "dstRscName": "rsc1",
            "metaData": {
                "rscName": "src-rsc",
                "volumes": [{ "vlmNr": 0, "sizeKib": 1024, "storPoolName": "thin" }]
            },
            "srcBackupName": "back_20240101",
            "srcClusterId": "6a1f"
        }))
        .unwrap();
        assert_eq!(req.src_version, Version::new(1, 2, 3));
        assert!(req.stor_pool_rename_map.is_empty());
        assert_eq!(req.dst_node_name, None);

        let data = BackupShippingData::from_request(req).unwrap();
        assert_eq!(data.dst_rsc_name.as_str(), "rsc1");
        assert_eq!(data.metadata.volumes[0].size_kib, 1024);
    }

    #[test]
    fn test_missing_required_field_is_rejected() {
        let res = serde_json::from_value::<BackupShippingRequest>(json!({
            "srcVersion": [1, 2, 3],
            "dstRscName": "rsc1",
            "srcBackupName": "back",
            "srcClusterId": "6a1f"
        }));
        assert!(res.is_err());
    }

    #[test]
    fn test_cluster_id_must_be_one_key_segment() {
        for cluster_id in ["", "  ", "/", "site/a", "site//a/"] {
            let req: BackupShippingRequest = serde_json::from_value(json!({
                "srcVersion": [1, 2, 3],
                "dstRscName": "rsc1",
                "metaData": { "rscName": "src-rsc" },
                "srcBackupName": "back",
                "srcClusterId": cluster_id
            }))
            .unwrap();
            let err = BackupShippingData::from_request(req).unwrap_err();
            assert_eq!(err.ret_code(), RetCode::FailInvalidName, "{cluster_id:?}");
        }
    }

    #[test]
    fn test_failure_response_has_no_endpoint() {
        let value = serde_json::to_value(BackupShippingResponse::failure(ApiCallRc::new())).unwrap();
        assert_eq!(value, json!({ "success": false, "apiCallResults": [] }));
    }
}
