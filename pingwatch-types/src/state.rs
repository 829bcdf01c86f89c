//! The durable record written to the state file.

use std::collections::BTreeMap;

use crate::{AggregateBucket, Gap, SchemaVersion};

/// Durable fields of one target.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase", default))]
pub struct PersistedTarget {
    /// Aggregate buckets in ascending start order.
    pub aggregated_data: Vec<AggregateBucket>,
    /// Every loss gap recorded for the target.
    pub gaps: Vec<Gap>,
    /// Probes answered.
    pub received: u64,
    /// Probes lost.
    pub lost: u64,
    /// Last assigned logical sequence number.
    ///
    /// Absent in files written before this field existed; the last bucket's
    /// sequence number stands in for it then.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub last_seq: Option<u64>,
}

/// The whole state file.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PersistedState {
    /// Format version.
    pub version: SchemaVersion,
    /// Per-target state keyed by target name.
    pub targets: BTreeMap<String, PersistedTarget>,
}

#[cfg(all(test, feature = "serde"))]
mod tests {
    use super::*;

    #[test]
    fn reads_file_without_version() {
        let json = r#"{"targets":{"1.1.1.1":{"aggregatedData":[],"gaps":[],"received":5,"lost":1}}}"#;
        let state: PersistedState = serde_json::from_str(json).unwrap();
        assert!(state.version.is_compatible());
        assert_eq!(state.targets["1.1.1.1"].received, 5);
        assert_eq!(state.targets["1.1.1.1"].last_seq, None);
    }
}
