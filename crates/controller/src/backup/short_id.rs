//! Short aliases of remote cluster ids.
//!
//! Snapshot names received from another cluster carry a short alias of that
//! cluster's id. Aliases are stored in the controller configuration under
//! [`SHORT_ID_NAMESPACE`], keyed by the full cluster id.

use crate::error::CtrlResult;
use crate::locks::{LockGuard, LockObj};
use ferrostor_core::{PriorityProps, ReadOnlyProps};
use ferrostor_metadata::{PropsContainer, TransactionMgr};
use rand::RngCore;
use std::collections::BTreeSet;

pub const SHORT_ID_NAMESPACE: &str = "Cluster/RemoteShortIds";

/// Source of candidate aliases.
pub trait ShortIdSource: Send + Sync {
    fn generate(&self) -> String;
}

/// Five random bytes rendered in base 36.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomShortIds;

impl ShortIdSource for RandomShortIds {
    fn generate(&self) -> String {
        let mut bytes = [0u8; 5];
        rand::rng().fill_bytes(&mut bytes);
        let value = bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b));
        to_base36(value)
    }
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

/// Return the alias of `cluster_id`, creating and persisting a new one on first contact.
///
/// Runs inside the caller's transaction, so a failed scope also drops a newly
/// created alias.
pub fn resolve_short_id(
    tx: &mut TransactionMgr,
    locks: &LockGuard,
    ctrl_conf: &PropsContainer,
    cluster_id: &str,
    source: &dyn ShortIdSource,
) -> CtrlResult<String> {
    let existing = {
        let props = PriorityProps::with_props([(
            ctrl_conf as &dyn ReadOnlyProps,
            "controller".to_string(),
        )]);
        props.get_prop(cluster_id, Some(SHORT_ID_NAMESPACE))
    };
    if let Some(short_id) = existing {
        return Ok(short_id);
    }

    locks.ensure_write(LockObj::CtrlConfig)?;
    let taken: BTreeSet<String> = ctrl_conf
        .namespace_entries(SHORT_ID_NAMESPACE)
        .into_values()
        .collect();
    let short_id = loop {
        let candidate = source.generate();
        if !taken.contains(&candidate) {
            break candidate;
        }
        tracing::debug!(candidate = %candidate, "short id collision, generating another one");
    };
    ctrl_conf.set_prop(tx, cluster_id, short_id.as_str(), Some(SHORT_ID_NAMESPACE))?;
    tracing::info!(cluster_id, short_id = %short_id, "assigned short id to remote cluster");
    Ok(short_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base36() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
        assert_eq!(to_base36(0xff_ffff_ffff), "e13wu1of");
    }

    #[test]
    fn test_random_ids_are_base36() {
        let id = RandomShortIds.generate();
        assert!(!id.is_empty() && id.len() <= 8);
        assert!(id.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }
}
