//! Folding of raw samples into time-aligned aggregate buckets.
//!
//! Buckets are keyed by interval start. Folding a batch into an interval
//! that already has a bucket merges into it, so running the fold twice over
//! the same interval never produces two buckets with the same start.

use std::collections::BTreeMap;
use std::time::Duration;

use pingwatch_types::{AggregateBucket, Sample, TimestampMs};

/// Start of the aggregation interval containing `timestamp`.
///
/// # Panics
///
/// Panics if `interval_ms` is zero.
pub fn interval_start(timestamp: TimestampMs, interval_ms: u64) -> TimestampMs {
    timestamp - timestamp % interval_ms
}

/// Round to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Outcome of one aggregation pass over a ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregationReport {
    /// Samples moved from the window into buckets.
    pub folded: usize,
    /// Buckets created.
    pub created: usize,
    /// Buckets merged into.
    pub merged: usize,
}

impl AggregationReport {
    /// Whether the pass changed anything.
    pub fn is_empty(&self) -> bool {
        self.folded == 0
    }

    pub(crate) fn absorb(&mut self, other: AggregationReport) {
        self.folded += other.folded;
        self.created += other.created;
        self.merged += other.merged;
    }
}

/// Fold `samples` into `aggregates`, one bucket per interval.
///
/// `aggregates` must be sorted by start with unique starts; it stays that
/// way. A bucket takes the sequence number of the first sample of the most
/// recent batch folded into it.
pub fn fold_samples<I>(
    aggregates: &mut Vec<AggregateBucket>,
    samples: I,
    interval: Duration,
) -> AggregationReport
where
    I: IntoIterator<Item = Sample>,
{
    let interval_ms = interval.as_millis().max(1) as u64;

    let mut batches: BTreeMap<TimestampMs, Vec<Sample>> = BTreeMap::new();
    for sample in samples {
        batches
            .entry(interval_start(sample.timestamp, interval_ms))
            .or_default()
            .push(sample);
    }

    let mut report = AggregationReport::default();
    for (start, batch) in batches {
        report.folded += batch.len();
        match aggregates.binary_search_by_key(&start, AggregateBucket::start) {
            Ok(idx) => {
                aggregates[idx] = merge_bucket(&aggregates[idx], &batch);
                report.merged += 1;
            }
            Err(pos) => {
                aggregates.insert(pos, new_bucket(start, &batch));
                report.created += 1;
            }
        }
    }
    report
}

fn batch_rtts(batch: &[Sample]) -> (f64, u32) {
    batch
        .iter()
        .filter_map(|s| s.rtt)
        .fold((0.0, 0), |(sum, n), rtt| (sum + rtt, n + 1))
}

fn new_bucket(start: TimestampMs, batch: &[Sample]) -> AggregateBucket {
    let seq = batch.first().map_or(0, |s| s.seq);
    let (sum, n) = batch_rtts(batch);
    let rtt = (n > 0).then(|| round2(sum / n as f64));
    AggregateBucket::new(start, seq, rtt, n)
}

/// Merge a batch into an existing bucket, weighting the existing mean by the
/// number of samples it already stands for.
fn merge_bucket(existing: &AggregateBucket, batch: &[Sample]) -> AggregateBucket {
    let (batch_sum, batch_n) = batch_rtts(batch);
    let (prior_sum, prior_n) = match existing.rtt {
        Some(rtt) => {
            let weight = existing.samples.max(1);
            (rtt * weight as f64, weight)
        }
        None => (0.0, 0),
    };

    let n = prior_n + batch_n;
    let rtt = (n > 0).then(|| round2((prior_sum + batch_sum) / n as f64));
    let seq = batch.first().map_or(existing.seq, |s| s.seq);

    AggregateBucket::new(existing.timestamp, seq, rtt, n)
}
