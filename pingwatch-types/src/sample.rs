//! Raw probe samples and loss gaps.

use crate::TimestampMs;

/// One probe outcome at a logical sequence number.
///
/// Immutable once created. `rtt` is `None` when the target did not answer.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Sample {
    /// Logical sequence number.
    pub seq: u64,

    /// Round-trip time in milliseconds.
    pub rtt: Option<f64>,

    /// When the monitor observed this probe.
    pub timestamp: TimestampMs,
}

impl Sample {
    /// A probe that was answered.
    pub fn reply(seq: u64, rtt: f64, timestamp: TimestampMs) -> Self {
        Self {
            seq,
            rtt: Some(rtt),
            timestamp,
        }
    }

    /// A probe that went unanswered.
    pub fn unreachable(seq: u64, timestamp: TimestampMs) -> Self {
        Self {
            seq,
            rtt: None,
            timestamp,
        }
    }

    /// Whether the target answered.
    pub fn is_reply(&self) -> bool {
        self.rtt.is_some()
    }
}

/// A maximal run of logical sequence numbers with no reply.
///
/// Bounds are inclusive; `count == to - from + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Gap {
    /// First missing sequence number.
    pub from: u64,

    /// Last missing sequence number.
    pub to: u64,

    /// Number of missing sequence numbers.
    pub count: u64,
}

impl Gap {
    /// Create a gap covering `from..=to`.
    ///
    /// # Panics
    ///
    /// Panics in debug builds if `to < from`.
    pub fn new(from: u64, to: u64) -> Self {
        debug_assert!(to >= from, "gap bounds reversed: {from}..={to}");
        Self {
            from,
            to,
            count: to - from + 1,
        }
    }

    /// A gap of a single sequence number.
    pub fn single(seq: u64) -> Self {
        Self::new(seq, seq)
    }

    /// Grow the gap so it ends at `to`.
    pub fn extend_to(&mut self, to: u64) {
        if to > self.to {
            self.to = to;
            self.count = self.to - self.from + 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gap_count_matches_bounds() {
        assert_eq!(Gap::new(3, 3).count, 1);
        assert_eq!(Gap::new(10, 14).count, 5);
        assert_eq!(Gap::single(7), Gap::new(7, 7));
    }

    #[test]
    fn gap_extend_keeps_count_consistent() {
        let mut gap = Gap::new(5, 6);
        gap.extend_to(9);
        assert_eq!(gap, Gap::new(5, 9));

        // Shrinking is ignored
        gap.extend_to(4);
        assert_eq!(gap.count, 5);
    }

    #[test]
    fn sample_constructors() {
        assert!(Sample::reply(1, 9.5, 0).is_reply());
        assert!(!Sample::unreachable(1, 0).is_reply());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn unreachable_sample_serializes_null_rtt() {
        let json = serde_json::to_string(&Sample::unreachable(5, 1000)).unwrap();
        assert_eq!(json, r#"{"seq":5,"rtt":null,"timestamp":1000}"#);
    }
}
