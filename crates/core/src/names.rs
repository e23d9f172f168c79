//! Validated object names.
//!
//! Every persisted object in the cluster model is addressed by a short name.
//! Names are 1..=48 ASCII characters, start with a letter or `_`, and continue
//! with letters, digits, `_` or `-`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length of any object name.
pub const MAX_NAME_LEN: usize = 48;

fn validate_name(kind: &str, name: &str) -> crate::Result<()> {
    if name.is_empty() {
        return Err(crate::Error::InvalidName(format!("{kind} name cannot be empty")));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(crate::Error::InvalidName(format!(
            "{kind} name '{name}' exceeds {MAX_NAME_LEN} characters"
        )));
    }
    let mut chars = name.chars();
    if let Some(first) = chars.next()
        && !(first.is_ascii_alphabetic() || first == '_')
    {
        return Err(crate::Error::InvalidName(format!(
            "{kind} name '{name}' must start with a letter or '_'"
        )));
    }
    if let Some(c) = chars.find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-')) {
        return Err(crate::Error::InvalidName(format!(
            "invalid character '{c}' in {kind} name '{name}'"
        )));
    }
    Ok(())
}

macro_rules! object_name {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Create from a string, validating format.
            pub fn new(name: impl Into<String>) -> crate::Result<Self> {
                let name = name.into();
                validate_name($kind, &name)?;
                Ok(Self(name))
            }

            /// Get the name string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = crate::Error;

            fn try_from(value: String) -> crate::Result<Self> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> String {
                value.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

object_name!(
    /// Name of a cluster node (controller or satellite host).
    NodeName,
    "node"
);
object_name!(
    /// Name of a resource definition.
    ResourceName,
    "resource"
);
object_name!(
    /// Name of a snapshot definition within a resource definition.
    SnapshotName,
    "snapshot"
);
object_name!(
    /// Name of a remote (S3 target, other cluster, or satellite-side tracking remote).
    RemoteName,
    "remote"
);
object_name!(
    /// Name of a storage pool on a node.
    StorPoolName,
    "storage pool"
);
object_name!(
    /// Name of a network interface on a node.
    NetInterfaceName,
    "network interface"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_regular_names() {
        assert!(NodeName::new("alpha-1").is_ok());
        assert!(SnapshotName::new("back_20240101_k3x9a").is_ok());
        assert!(ResourceName::new("_internal").is_ok());
    }

    #[test]
    fn rejects_bad_names() {
        assert!(NodeName::new("").is_err());
        assert!(NodeName::new("1node").is_err());
        assert!(ResourceName::new("has space").is_err());
        assert!(ResourceName::new("colon:name").is_err());
        assert!(RemoteName::new("a".repeat(MAX_NAME_LEN + 1)).is_err());
    }

    #[test]
    fn deserialize_validates() {
        let ok: NodeName = serde_json::from_str("\"node-a\"").unwrap();
        assert_eq!(ok.as_str(), "node-a");
        assert!(serde_json::from_str::<NodeName>("\"-bad\"").is_err());
    }
}
