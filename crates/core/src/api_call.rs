//! Structured API call results.
//!
//! Operations report outcomes as a list of entries, each carrying a return code
//! and a human-readable message, instead of a single success/error value.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Return codes reported to API callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RetCode {
    Created,
    Modified,
    Deleted,
    Info,
    FailBackupIncompatibleVersion,
    FailPoolExhaustedBackupShippingTcpPort,
    FailNotFoundNode,
    FailNotFoundStorPool,
    FailNotFoundNetIf,
    FailNotFoundRscDfn,
    FailNotFoundSnapshotDfn,
    FailNotFoundRemote,
    FailExistsSnapshotDfn,
    FailExistsRemote,
    FailInvalidName,
    FailInvalidBackupMetadata,
    FailInsufficientCapacity,
    FailSqlError,
    FailImplError,
    FailUnknownError,
}

impl RetCode {
    pub fn is_error(self) -> bool {
        !matches!(self, Self::Created | Self::Modified | Self::Deleted | Self::Info)
    }

    /// Stable string form, as serialized.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Modified => "MODIFIED",
            Self::Deleted => "DELETED",
            Self::Info => "INFO",
            Self::FailBackupIncompatibleVersion => "FAIL_BACKUP_INCOMPATIBLE_VERSION",
            Self::FailPoolExhaustedBackupShippingTcpPort => {
                "FAIL_POOL_EXHAUSTED_BACKUP_SHIPPING_TCP_PORT"
            }
            Self::FailNotFoundNode => "FAIL_NOT_FOUND_NODE",
            Self::FailNotFoundStorPool => "FAIL_NOT_FOUND_STOR_POOL",
            Self::FailNotFoundNetIf => "FAIL_NOT_FOUND_NET_IF",
            Self::FailNotFoundRscDfn => "FAIL_NOT_FOUND_RSC_DFN",
            Self::FailNotFoundSnapshotDfn => "FAIL_NOT_FOUND_SNAPSHOT_DFN",
            Self::FailNotFoundRemote => "FAIL_NOT_FOUND_REMOTE",
            Self::FailExistsSnapshotDfn => "FAIL_EXISTS_SNAPSHOT_DFN",
            Self::FailExistsRemote => "FAIL_EXISTS_REMOTE",
            Self::FailInvalidName => "FAIL_INVALID_NAME",
            Self::FailInvalidBackupMetadata => "FAIL_INVALID_BACKUP_METADATA",
            Self::FailInsufficientCapacity => "FAIL_INSUFFICIENT_CAPACITY",
            Self::FailSqlError => "FAIL_SQL_ERROR",
            Self::FailImplError => "FAIL_IMPL_ERROR",
            Self::FailUnknownError => "FAIL_UNKNOWN_ERROR",
        }
    }
}

impl fmt::Display for RetCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of an API call result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiCallRcEntry {
    pub ret_code: RetCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correction: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub obj_refs: BTreeMap<String, String>,
}

impl ApiCallRcEntry {
    pub fn new(ret_code: RetCode, message: impl Into<String>) -> Self {
        Self {
            ret_code,
            message: message.into(),
            cause: None,
            correction: None,
            obj_refs: BTreeMap::new(),
        }
    }

    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub fn with_correction(mut self, correction: impl Into<String>) -> Self {
        self.correction = Some(correction.into());
        self
    }

    pub fn with_obj_ref(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.obj_refs.insert(key.into(), value.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.ret_code.is_error()
    }
}

impl fmt::Display for ApiCallRcEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.ret_code, self.message)?;
        if let Some(cause) = &self.cause {
            write!(f, " (cause: {cause})")?;
        }
        Ok(())
    }
}

/// Ordered list of result entries for one API call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApiCallRc {
    entries: Vec<ApiCallRcEntry>,
}

impl ApiCallRc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(entry: ApiCallRcEntry) -> Self {
        Self {
            entries: vec![entry],
        }
    }

    pub fn push(&mut self, entry: ApiCallRcEntry) {
        self.entries.push(entry);
    }

    pub fn extend(&mut self, other: ApiCallRc) {
        self.entries.extend(other.entries);
    }

    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(ApiCallRcEntry::is_error)
    }

    pub fn entries(&self) -> &[ApiCallRcEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First error code, if any.
    pub fn first_error(&self) -> Option<RetCode> {
        self.entries
            .iter()
            .find(|e| e.is_error())
            .map(|e| e.ret_code)
    }
}

impl From<ApiCallRcEntry> for ApiCallRc {
    fn from(entry: ApiCallRcEntry) -> Self {
        Self::single(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ret_code_serialization_matches_as_str() {
        for code in [
            RetCode::Created,
            RetCode::FailBackupIncompatibleVersion,
            RetCode::FailPoolExhaustedBackupShippingTcpPort,
            RetCode::FailNotFoundNetIf,
            RetCode::FailImplError,
        ] {
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json, format!("\"{}\"", code.as_str()));
        }
    }

    #[test]
    fn test_api_call_rc_errors() {
        let mut rc = ApiCallRc::new();
        rc.push(ApiCallRcEntry::new(RetCode::Created, "created remote"));
        assert!(!rc.has_errors());
        rc.push(
            ApiCallRcEntry::new(RetCode::FailNotFoundNode, "node missing")
                .with_obj_ref("node", "n1"),
        );
        assert!(rc.has_errors());
        assert_eq!(rc.first_error(), Some(RetCode::FailNotFoundNode));
        assert_eq!(rc.entries().len(), 2);
    }
}
