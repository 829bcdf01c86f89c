//! Messages delivered over the live event stream.

use std::collections::BTreeMap;

use crate::{Gap, HistoryPoint, Sample};

/// Incremental update for one target after one probe.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct LiveUpdate {
    /// Target name.
    pub target: String,
    /// Probes answered so far.
    pub received: u64,
    /// Probes lost so far.
    pub lost: u64,
    /// `lost / (received + lost) * 100`, or 0 before any probe.
    pub loss_percent: f64,
    /// Mean round-trip time over the whole retained history.
    pub avg_rtt: Option<f64>,
    /// Every loss gap recorded for the target.
    pub gaps: Vec<Gap>,
    /// The sample that triggered this update.
    pub point: Sample,
}

/// Full state of one target, sent when a viewer subscribes.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct TargetHistory {
    /// Aggregates followed by window samples, in time order.
    pub history_data: Vec<HistoryPoint>,
    /// Every loss gap recorded for the target.
    pub gaps: Vec<Gap>,
    /// Probes answered so far.
    pub received: u64,
    /// Probes lost so far.
    pub lost: u64,
    /// Mean round-trip time over the whole retained history.
    pub avg_rtt: Option<f64>,
}

/// A message on the live event stream.
///
/// Serialized with a `type` tag: `history`, `ping` or `loss`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "type", rename_all = "lowercase"))]
pub enum StreamEvent {
    /// Snapshot of every target, sent once per subscription.
    History {
        /// Per-target history keyed by target name.
        targets: BTreeMap<String, TargetHistory>,
    },
    /// A probe was answered.
    Ping(LiveUpdate),
    /// A probe was lost.
    Loss(LiveUpdate),
}

impl StreamEvent {
    /// The event's `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::History { .. } => "history",
            StreamEvent::Ping(_) => "ping",
            StreamEvent::Loss(_) => "loss",
        }
    }

    /// The live update carried by a `ping` or `loss` event.
    pub fn update(&self) -> Option<&LiveUpdate> {
        match self {
            StreamEvent::Ping(u) | StreamEvent::Loss(u) => Some(u),
            StreamEvent::History { .. } => None,
        }
    }
}
