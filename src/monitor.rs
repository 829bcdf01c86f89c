//! The set of monitored targets and the event path through them.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use pingwatch_types::{PersistedState, StreamEvent, TimestampMs};
use tracing::{debug, info, warn};

use crate::aggregator::AggregationReport;
use crate::hub::{encode_frame, Hub, Subscription};
use crate::ledger::{LedgerConfig, TargetLedger};
use crate::parser::parse_line;

/// Default per-subscriber queue length.
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 256;

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> TimestampMs {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Owns one ledger per target and the hub that fans their updates out.
///
/// Each ledger has its own lock. A probe update and its broadcast happen
/// under that lock, so viewers see updates for a target in the order they
/// were applied.
#[derive(Debug)]
pub struct Monitor {
    ledgers: BTreeMap<String, Arc<Mutex<TargetLedger>>>,
    hub: Arc<Hub>,
    subscriber_buffer: usize,
}

impl Monitor {
    /// Create a monitor for a fixed set of targets.
    pub fn new<I, S>(targets: I, config: LedgerConfig) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ledgers = targets
            .into_iter()
            .map(Into::into)
            .map(|name: String| {
                let ledger = TargetLedger::new(name.clone(), config);
                (name, Arc::new(Mutex::new(ledger)))
            })
            .collect();

        Self {
            ledgers,
            hub: Arc::new(Hub::new()),
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
        }
    }

    /// Set the per-subscriber queue length.
    pub fn with_subscriber_buffer(mut self, buffer: usize) -> Self {
        self.subscriber_buffer = buffer.max(1);
        self
    }

    /// Target names in sorted order.
    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.ledgers.keys().map(String::as_str)
    }

    /// The broadcast hub.
    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// Shared handle to one target's ledger.
    pub fn ledger(&self, target: &str) -> Option<Arc<Mutex<TargetLedger>>> {
        self.ledgers.get(target).cloned()
    }

    /// Restore persisted state. Unknown targets in `state` are ignored.
    pub fn hydrate(&self, state: PersistedState) {
        for (name, persisted) in state.targets {
            match self.ledgers.get(&name) {
                Some(ledger) => {
                    let mut ledger = ledger.lock();
                    ledger.hydrate(persisted);
                    info!(
                        target_name = %name,
                        last_seq = ?ledger.last_seq(),
                        buckets = ledger.aggregates().len(),
                        "restored target state"
                    );
                }
                None => warn!(target_name = %name, "ignoring state for unconfigured target"),
            }
        }
    }

    /// Feed one raw probe output line for `target`, observed now.
    pub fn handle_line(&self, target: &str, line: &str) -> Option<StreamEvent> {
        self.handle_line_at(target, line, now_ms())
    }

    /// Feed one raw probe output line for `target`, observed at `now`.
    ///
    /// Returns the event that was broadcast, if the line was a probe result.
    pub fn handle_line_at(&self, target: &str, line: &str, now: TimestampMs) -> Option<StreamEvent> {
        let Some(ledger) = self.ledgers.get(target) else {
            warn!(target_name = %target, "line for unknown target");
            return None;
        };

        let parsed = parse_line(line);
        let mut ledger = ledger.lock();
        let Some(event) = ledger.record(parsed, now) else {
            debug!(target_name = %target, line, "line ignored");
            return None;
        };
        self.hub.publish(&event);
        Some(event)
    }

    /// The probe process for `target` was respawned.
    pub fn probe_restarted(&self, target: &str) {
        if let Some(ledger) = self.ledgers.get(target) {
            ledger.lock().probe_restarted();
        }
    }

    /// Run an aggregation pass over every target.
    pub fn aggregate_all(&self, now: TimestampMs) -> AggregationReport {
        let mut total = AggregationReport::default();
        for (name, ledger) in &self.ledgers {
            let report = ledger.lock().aggregate(now);
            if !report.is_empty() {
                debug!(
                    target_name = %name,
                    folded = report.folded,
                    created = report.created,
                    merged = report.merged,
                    "aggregated window"
                );
            }
            total.absorb(report);
        }
        total
    }

    /// Point-in-time copy of every ledger's durable fields.
    pub fn persisted_state(&self) -> PersistedState {
        PersistedState {
            targets: self
                .ledgers
                .iter()
                .map(|(name, ledger)| (name.clone(), ledger.lock().persisted()))
                .collect(),
            ..Default::default()
        }
    }

    /// Full history of every target.
    pub fn history(&self) -> StreamEvent {
        let guards: Vec<_> = self.ledgers.values().map(|l| l.lock()).collect();
        Self::history_from(&guards)
    }

    fn history_from(ledgers: &[parking_lot::MutexGuard<'_, TargetLedger>]) -> StreamEvent {
        StreamEvent::History {
            targets: ledgers
                .iter()
                .map(|l| (l.name().to_string(), l.target_history()))
                .collect(),
        }
    }

    /// Register a new viewer.
    ///
    /// The first frame on the subscription is the `history` event; after it
    /// come only updates applied after the snapshot was taken.
    pub fn subscribe(&self) -> crate::Result<Subscription> {
        // Ledgers are locked in key order; update paths only ever hold one
        let guards: Vec<_> = self.ledgers.values().map(|l| l.lock()).collect();
        let history = encode_frame(&Self::history_from(&guards))?;
        let subscription = self.hub.subscribe(self.subscriber_buffer, &[history]);
        drop(guards);
        Ok(subscription)
    }
}
