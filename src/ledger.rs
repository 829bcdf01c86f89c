//! Per-target loss, latency and history accounting.

use std::collections::VecDeque;
use std::time::Duration;

use pingwatch_types::{
    AggregateBucket, Gap, HistoryPoint, LiveUpdate, PersistedTarget, Sample, StreamEvent,
    TargetHistory, TimestampMs,
};

use crate::aggregator::{fold_samples, interval_start, round2, AggregationReport};
use crate::parser::ProbeLine;
use crate::reconciler::SequenceReconciler;

/// Time spans that shape a ledger's retained history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerConfig {
    /// How long raw samples stay in the window.
    pub window_span: Duration,
    /// Width of an aggregate bucket.
    pub aggregation_interval: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            window_span: Duration::from_secs(10 * 60),
            aggregation_interval: Duration::from_secs(10 * 60),
        }
    }
}

/// Mutable state of one target.
///
/// Only [`record`](Self::record) and [`aggregate`](Self::aggregate) change
/// the sample, gap and bucket collections. Callers serialize access, so the
/// window and the aggregates never disagree about a sample.
#[derive(Debug, Clone)]
pub struct TargetLedger {
    name: String,
    config: LedgerConfig,
    reconciler: SequenceReconciler,
    last_seq: Option<u64>,
    received: u64,
    lost: u64,
    gaps: Vec<Gap>,
    window: VecDeque<Sample>,
    aggregates: Vec<AggregateBucket>,
    last_aggregated_boundary: Option<TimestampMs>,
}

impl TargetLedger {
    /// Create an empty ledger.
    pub fn new(name: impl Into<String>, config: LedgerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            reconciler: SequenceReconciler::new(),
            last_seq: None,
            received: 0,
            lost: 0,
            gaps: Vec::new(),
            window: VecDeque::new(),
            aggregates: Vec::new(),
            last_aggregated_boundary: None,
        }
    }

    /// Restore durable fields from a previous run.
    ///
    /// Buckets are re-sorted and de-duplicated by start in case the file was
    /// edited by hand.
    pub fn hydrate(&mut self, persisted: PersistedTarget) {
        let mut aggregates = persisted.aggregated_data;
        aggregates.sort_by_key(AggregateBucket::start);
        aggregates.dedup_by_key(|b| b.start());

        self.last_seq = persisted.last_seq.or_else(|| aggregates.last().map(|b| b.seq));
        self.last_aggregated_boundary = aggregates.last().map(AggregateBucket::start);
        self.aggregates = aggregates;

        self.gaps = persisted.gaps;
        self.received = persisted.received;
        self.lost = persisted.lost;
        self.reconciler = SequenceReconciler::new();
    }

    /// The probe process was respawned; rebase its numbering on the next event.
    pub fn probe_restarted(&mut self) {
        self.reconciler.reset();
    }

    /// Apply one parsed probe line observed at `now`.
    ///
    /// Returns the live update to broadcast, or `None` for lines that are
    /// not probe results and for repeats of a probe already accounted.
    pub fn record(&mut self, line: ProbeLine, now: TimestampMs) -> Option<StreamEvent> {
        let tool_seq = line.seq()?;
        let prior = self.last_seq;
        let seq = self.reconciler.reconcile(tool_seq, prior)?;

        if let Some(prior) = prior {
            if seq > prior + 1 {
                self.push_gap(Gap::new(prior + 1, seq - 1));
            }
        }
        self.last_seq = Some(seq);

        let point = match line {
            ProbeLine::Reply { rtt, .. } => {
                self.received += 1;
                Sample::reply(seq, rtt, now)
            }
            _ => {
                self.push_gap(Gap::single(seq));
                Sample::unreachable(seq, now)
            }
        };
        self.window.push_back(point);
        self.evict_expired(now);

        let update = self.live_update(point);
        Some(if point.is_reply() {
            StreamEvent::Ping(update)
        } else {
            StreamEvent::Loss(update)
        })
    }

    /// Fold every window sample from a closed interval into the aggregates.
    ///
    /// Intervals skipped by missed passes are folded too. Running this twice
    /// without new samples changes nothing.
    pub fn aggregate(&mut self, now: TimestampMs) -> AggregationReport {
        let interval_ms = self.interval_ms();
        let current_start = interval_start(now, interval_ms);

        let closed = self.drain_window_before(current_start);
        if closed.is_empty() {
            return AggregationReport::default();
        }

        let report = fold_samples(
            &mut self.aggregates,
            closed,
            self.config.aggregation_interval,
        );
        let previous_start = current_start.saturating_sub(interval_ms);
        self.last_aggregated_boundary = Some(
            self.last_aggregated_boundary
                .map_or(previous_start, |b| b.max(previous_start)),
        );
        report
    }

    /// Drop window samples older than the sliding horizon, folding them into
    /// their buckets first.
    fn evict_expired(&mut self, now: TimestampMs) {
        let horizon = now.saturating_sub(self.config.window_span.as_millis() as u64);
        let expired = self.drain_window_before(horizon);
        if !expired.is_empty() {
            fold_samples(
                &mut self.aggregates,
                expired,
                self.config.aggregation_interval,
            );
        }
    }

    fn drain_window_before(&mut self, cutoff: TimestampMs) -> Vec<Sample> {
        if !self.window.iter().any(|s| s.timestamp < cutoff) {
            return Vec::new();
        }
        let (old, keep): (Vec<Sample>, Vec<Sample>) = self
            .window
            .drain(..)
            .partition(|s| s.timestamp < cutoff);
        self.window = keep.into();
        old
    }

    /// Record `gap` as lost, extending the last gap when adjacent.
    fn push_gap(&mut self, gap: Gap) {
        self.lost += gap.count;
        match self.gaps.last_mut() {
            Some(last) if last.to + 1 == gap.from => last.extend_to(gap.to),
            _ => self.gaps.push(gap),
        }
    }

    fn interval_ms(&self) -> u64 {
        (self.config.aggregation_interval.as_millis() as u64).max(1)
    }

    fn live_update(&self, point: Sample) -> LiveUpdate {
        LiveUpdate {
            target: self.name.clone(),
            received: self.received,
            lost: self.lost,
            loss_percent: self.loss_percent(),
            avg_rtt: self.mean_rtt(),
            gaps: self.gaps.clone(),
            point,
        }
    }

    /// Mean RTT over buckets and window samples, rounded to two places.
    ///
    /// Each bucket contributes its mean once.
    pub fn mean_rtt(&self) -> Option<f64> {
        let (sum, n) = self
            .aggregates
            .iter()
            .filter_map(|b| b.rtt)
            .chain(self.window.iter().filter_map(|s| s.rtt))
            .fold((0.0, 0u64), |(sum, n), rtt| (sum + rtt, n + 1));
        (n > 0).then(|| round2(sum / n as f64))
    }

    /// Percentage of accounted probes that were lost.
    pub fn loss_percent(&self) -> f64 {
        let total = self.received + self.lost;
        if total == 0 {
            0.0
        } else {
            self.lost as f64 / total as f64 * 100.0
        }
    }

    /// Aggregates and window samples in time order.
    pub fn history(&self) -> Vec<HistoryPoint> {
        let mut points: Vec<HistoryPoint> = self
            .aggregates
            .iter()
            .copied()
            .map(HistoryPoint::from)
            .chain(self.window.iter().copied().map(HistoryPoint::from))
            .collect();
        points.sort_by_key(|p| (p.timestamp(), p.seq()));
        points
    }

    /// Everything a new viewer needs for this target.
    pub fn target_history(&self) -> TargetHistory {
        TargetHistory {
            history_data: self.history(),
            gaps: self.gaps.clone(),
            received: self.received,
            lost: self.lost,
            avg_rtt: self.mean_rtt(),
        }
    }

    /// Durable fields for the state file.
    pub fn persisted(&self) -> PersistedTarget {
        PersistedTarget {
            aggregated_data: self.aggregates.clone(),
            gaps: self.gaps.clone(),
            received: self.received,
            lost: self.lost,
            last_seq: self.last_seq,
        }
    }

    /// Target name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Last assigned logical sequence number.
    pub fn last_seq(&self) -> Option<u64> {
        self.last_seq
    }

    /// Offset currently applied to tool-local sequence numbers.
    pub fn seq_offset(&self) -> u64 {
        self.reconciler.offset()
    }

    /// Probes answered.
    pub fn received(&self) -> u64 {
        self.received
    }

    /// Probes lost.
    pub fn lost(&self) -> u64 {
        self.lost
    }

    /// Loss gaps in sequence order.
    pub fn gaps(&self) -> &[Gap] {
        &self.gaps
    }

    /// Raw samples inside the sliding window.
    pub fn window(&self) -> impl Iterator<Item = &Sample> {
        self.window.iter()
    }

    /// Aggregate buckets in start order.
    pub fn aggregates(&self) -> &[AggregateBucket] {
        &self.aggregates
    }

    /// Start of the most recent interval folded by an aggregation pass.
    pub fn last_aggregated_boundary(&self) -> Option<TimestampMs> {
        self.last_aggregated_boundary
    }
}
