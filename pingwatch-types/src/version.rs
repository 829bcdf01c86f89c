//! Format version of the state file.

use std::fmt;

use crate::SCHEMA_VERSION;

/// Version stamp written at the top of the state file.
///
/// Files from before the stamp existed have none and read as [`CURRENT`].
/// Only the major number decides whether a file can be loaded.
///
/// [`CURRENT`]: SchemaVersion::CURRENT
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SchemaVersion {
    pub major: u32,
    /// Bumped for additive fields that older readers can ignore.
    pub minor: u32,
}

impl SchemaVersion {
    /// The version this crate writes.
    pub const CURRENT: SchemaVersion = SchemaVersion::new(SCHEMA_VERSION, 0);

    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Whether a file stamped with this version can be loaded.
    pub fn is_compatible(&self) -> bool {
        self.major == Self::CURRENT.major
    }
}

impl Default for SchemaVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minor_bumps_stay_loadable() {
        assert!(SchemaVersion::CURRENT.is_compatible());
        assert!(SchemaVersion::new(SCHEMA_VERSION, 7).is_compatible());
    }

    #[test]
    fn other_major_is_rejected() {
        assert!(!SchemaVersion::new(SCHEMA_VERSION + 1, 0).is_compatible());
        assert!(!SchemaVersion::new(0, 3).is_compatible());
    }

    #[test]
    fn displays_dotted() {
        assert_eq!(SchemaVersion::new(2, 5).to_string(), "2.5");
    }
}
