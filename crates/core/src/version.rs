//! Controller version triple.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A `major.minor.patch` version.
///
/// On the wire this is encoded as a three-element array, which is how peers
/// exchange their versions before a shipping session is negotiated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "[u32; 3]", into = "[u32; 3]")]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Version of this build.
    pub fn current() -> Self {
        env!("CARGO_PKG_VERSION")
            .parse()
            .unwrap_or(Self::new(0, 0, 0))
    }

    /// Two peers may ship backups to each other only when their versions match exactly.
    pub fn is_compatible_with(&self, other: &Version) -> bool {
        self == other
    }
}

impl From<[u32; 3]> for Version {
    fn from(v: [u32; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }
}

impl From<Version> for [u32; 3] {
    fn from(v: Version) -> Self {
        [v.major, v.minor, v.patch]
    }
}

impl FromStr for Version {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        // Ignore pre-release / build suffixes such as "1.2.3-rc.1".
        let core = s.split(['-', '+']).next().unwrap_or(s);
        let parts: Vec<&str> = core.split('.').collect();
        if parts.len() != 3 {
            return Err(crate::Error::InvalidVersion(s.to_string()));
        }
        let mut nums = [0u32; 3];
        for (slot, part) in nums.iter_mut().zip(parts) {
            *slot = part
                .parse()
                .map_err(|_| crate::Error::InvalidVersion(s.to_string()))?;
        }
        Ok(nums.into())
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
