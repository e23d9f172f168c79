//! Remotes: targets and sources of backup shipping.

use crate::error::{CtrlError, CtrlResult};
use ferrostor_core::{RemoteName, ResourceName, SnapshotName};
use ferrostor_metadata::models::RemoteRow;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RemoteType {
    S3,
    Linstor,
    /// Temporary remote pointing at a satellite that receives one shipment.
    Satellite,
}

impl RemoteType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::S3 => "S3",
            Self::Linstor => "LINSTOR",
            Self::Satellite => "SATELLITE",
        }
    }
}

impl fmt::Display for RemoteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Remote {
    pub name: RemoteName,
    pub url: String,
    pub bucket: String,
    pub region: String,
}

/// Another cluster's controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinstorRemote {
    pub name: RemoteName,
    pub url: String,
    pub cluster_id: String,
}

/// Receiving end of a shipment between two clusters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StltRemote {
    pub name: RemoteName,
    pub cluster_id: String,
    pub port: u16,
    pub rsc_name: ResourceName,
    pub snap_name: SnapshotName,
    pub use_zstd: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Remote {
    S3(S3Remote),
    Linstor(LinstorRemote),
    Satellite(StltRemote),
}

fn required<T>(row: &RemoteRow, column: &str, value: Option<T>) -> CtrlResult<T> {
    value.ok_or_else(|| {
        CtrlError::implementation(format!(
            "{} remote {} has no {column}",
            row.remote_type, row.remote_name
        ))
    })
}

impl Remote {
    pub fn name(&self) -> &RemoteName {
        match self {
            Self::S3(r) => &r.name,
            Self::Linstor(r) => &r.name,
            Self::Satellite(r) => &r.name,
        }
    }

    pub fn remote_type(&self) -> RemoteType {
        match self {
            Self::S3(_) => RemoteType::S3,
            Self::Linstor(_) => RemoteType::Linstor,
            Self::Satellite(_) => RemoteType::Satellite,
        }
    }

    pub fn as_satellite(&self) -> Option<&StltRemote> {
        match self {
            Self::Satellite(r) => Some(r),
            _ => None,
        }
    }

    pub(crate) fn to_row(&self) -> RemoteRow {
        let mut row = RemoteRow {
            remote_name: self.name().to_string(),
            remote_type: self.remote_type().as_str().to_string(),
            ..RemoteRow::default()
        };
        match self {
            Self::S3(r) => {
                row.url = Some(r.url.clone());
                row.bucket = Some(r.bucket.clone());
                row.region = Some(r.region.clone());
            }
            Self::Linstor(r) => {
                row.url = Some(r.url.clone());
                row.cluster_id = Some(r.cluster_id.clone());
            }
            Self::Satellite(r) => {
                row.cluster_id = Some(r.cluster_id.clone());
                row.port = Some(r.port);
                row.rsc_name = Some(r.rsc_name.to_string());
                row.snap_name = Some(r.snap_name.to_string());
                row.use_zstd = r.use_zstd;
            }
        }
        row
    }

    pub(crate) fn from_row(row: &RemoteRow) -> CtrlResult<Self> {
        let name = row.name()?;
        Ok(match row.remote_type.as_str() {
            "S3" => Self::S3(S3Remote {
                name,
                url: required(row, "url", row.url.clone())?,
                bucket: required(row, "bucket", row.bucket.clone())?,
                region: required(row, "region", row.region.clone())?,
            }),
            "LINSTOR" => Self::Linstor(LinstorRemote {
                name,
                url: required(row, "url", row.url.clone())?,
                cluster_id: required(row, "cluster_id", row.cluster_id.clone())?,
            }),
            "SATELLITE" => Self::Satellite(StltRemote {
                name,
                cluster_id: required(row, "cluster_id", row.cluster_id.clone())?,
                port: required(row, "port", row.port)?,
                rsc_name: ResourceName::new(required(row, "rsc_name", row.rsc_name.clone())?)?,
                snap_name: SnapshotName::new(required(row, "snap_name", row.snap_name.clone())?)?,
                use_zstd: row.use_zstd,
            }),
            other => {
                return Err(CtrlError::implementation(format!(
                    "remote {} has unknown type '{other}'",
                    row.remote_name
                )));
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stlt_remote_row() {
        let remote = Remote::Satellite(StltRemote {
            name: RemoteName::new("stlt-backup1_ab12c").unwrap(),
            cluster_id: "c0ffee".to_string(),
            port: 12000,
            rsc_name: ResourceName::new("rsc1").unwrap(),
            snap_name: SnapshotName::new("backup1_ab12c").unwrap(),
            use_zstd: true,
        });
        let row = remote.to_row();
        assert_eq!(row.remote_type, "SATELLITE");
        assert_eq!(row.port, Some(12000));
        assert_eq!(row.url, None);
        assert_eq!(Remote::from_row(&row).unwrap(), remote);
    }

    #[test]
    fn test_missing_column_is_implementation_error() {
        let row = RemoteRow {
            remote_name: "s3".to_string(),
            remote_type: "S3".to_string(),
            url: Some("https://s3.example".to_string()),
            ..RemoteRow::default()
        };
        let err = Remote::from_row(&row).unwrap_err();
        assert!(err.is_implementation_error());
    }
}
