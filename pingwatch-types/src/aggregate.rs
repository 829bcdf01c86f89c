//! Time-aligned summaries that replace samples once they leave the window.

use crate::{Sample, TimestampMs};

/// Summary of one aggregation interval for one target.
///
/// `timestamp` is the interval start, aligned to the aggregation interval.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AggregateBucket {
    /// Representative logical sequence number for the interval.
    pub seq: u64,

    /// Mean round-trip time of the answered probes, if any.
    pub rtt: Option<f64>,

    /// Interval start.
    pub timestamp: TimestampMs,

    /// Always `true`; lets viewers tell buckets from raw samples.
    pub aggregated: bool,

    /// Number of answered probes folded into `rtt`.
    #[cfg_attr(feature = "serde", serde(default = "legacy_sample_count"))]
    pub samples: u32,
}

#[cfg(feature = "serde")]
fn legacy_sample_count() -> u32 {
    1
}

impl AggregateBucket {
    /// Create a bucket starting at `start`.
    pub fn new(start: TimestampMs, seq: u64, rtt: Option<f64>, samples: u32) -> Self {
        Self {
            seq,
            rtt,
            timestamp: start,
            aggregated: true,
            samples,
        }
    }

    /// Interval start.
    pub fn start(&self) -> TimestampMs {
        self.timestamp
    }
}

/// One entry of a target's combined history.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum HistoryPoint {
    /// A downsampled interval.
    Aggregate(AggregateBucket),
    /// A raw sample still inside the sliding window.
    Sample(Sample),
}

impl HistoryPoint {
    /// Logical sequence number of the point.
    pub fn seq(&self) -> u64 {
        match self {
            HistoryPoint::Aggregate(b) => b.seq,
            HistoryPoint::Sample(s) => s.seq,
        }
    }

    /// Timestamp of the point (interval start for buckets).
    pub fn timestamp(&self) -> TimestampMs {
        match self {
            HistoryPoint::Aggregate(b) => b.timestamp,
            HistoryPoint::Sample(s) => s.timestamp,
        }
    }
}

impl From<AggregateBucket> for HistoryPoint {
    fn from(bucket: AggregateBucket) -> Self {
        HistoryPoint::Aggregate(bucket)
    }
}

impl From<Sample> for HistoryPoint {
    fn from(sample: Sample) -> Self {
        HistoryPoint::Sample(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_point_accessors() {
        let bucket: HistoryPoint = AggregateBucket::new(600_000, 10, Some(11.0), 4).into();
        let sample: HistoryPoint = Sample::unreachable(12, 650_000).into();

        assert_eq!(bucket.seq(), 10);
        assert_eq!(bucket.timestamp(), 600_000);
        assert_eq!(sample.seq(), 12);
        assert_eq!(sample.timestamp(), 650_000);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn legacy_bucket_without_sample_count_reads_as_one() {
        let json = r#"{"seq":40,"rtt":12.5,"timestamp":600000,"aggregated":true}"#;
        let bucket: AggregateBucket = serde_json::from_str(json).unwrap();
        assert_eq!(bucket.samples, 1);
        assert_eq!(bucket.start(), 600_000);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn untagged_history_point_distinguishes_buckets() {
        let bucket: HistoryPoint =
            serde_json::from_str(r#"{"seq":1,"rtt":null,"timestamp":0,"aggregated":true}"#)
                .unwrap();
        let sample: HistoryPoint =
            serde_json::from_str(r#"{"seq":2,"rtt":3.5,"timestamp":10}"#).unwrap();

        assert!(matches!(bucket, HistoryPoint::Aggregate(_)));
        assert!(matches!(sample, HistoryPoint::Sample(_)));
    }
}
