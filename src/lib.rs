//! # pingwatch
//!
//! Continuous reachability monitoring for a fixed set of hosts.
//!
//! One probe process runs per target. Its output lines are classified,
//! numbered on a sequence that survives probe restarts, and accounted as
//! replies or losses. Recent samples are kept raw; older ones are folded
//! into fixed-width aggregate buckets. Every update is pushed to connected
//! viewers, and state is written to disk periodically.
//!
//! ```text
//!  probe stdout ──▶ parser ──▶ Monitor ──▶ TargetLedger (reconciler, window, buckets)
//!                                 │
//!                                 ├──▶ Hub ──▶ /events subscribers
//!                                 └──▶ StateFile (periodic, atomic)
//! ```
//!
//! - [`parser`]: classify one line of probe output
//! - [`reconciler`]: map tool-local sequence numbers onto a monotonic sequence
//! - [`ledger`]: per-target counters, gaps, window and aggregates
//! - [`aggregator`]: fold samples into interval buckets
//! - [`hub`]: fan encoded events out to subscribers
//! - [`monitor`]: the set of ledgers plus the hub
//! - [`persist`], [`scheduler`], [`probe`], [`server`], [`config`]: the
//!   service around the engine
//!
//! ## Example
//!
//! ```
//! use pingwatch::{LedgerConfig, Monitor};
//!
//! let monitor = Monitor::new(["1.1.1.1"], LedgerConfig::default());
//! let mut viewer = monitor.subscribe().unwrap();
//!
//! monitor.handle_line("1.1.1.1", "64 bytes from 1.1.1.1: icmp_seq=1 ttl=57 time=10.4 ms");
//!
//! let history = viewer.try_recv().unwrap();
//! assert!(history.starts_with(b"data: {\"type\":\"history\""));
//! let update = viewer.try_recv().unwrap();
//! assert!(update.starts_with(b"data: {\"type\":\"ping\""));
//! ```

pub mod aggregator;
pub mod config;
pub mod duration;
pub mod error;
pub mod hub;
pub mod ledger;
pub mod monitor;
pub mod parser;
pub mod persist;
pub mod probe;
pub mod reconciler;
pub mod scheduler;
pub mod server;

pub use config::Settings;
pub use error::{PingwatchError, Result};
pub use hub::{EventSink, Hub, Subscription};
pub use ledger::{LedgerConfig, TargetLedger};
pub use monitor::Monitor;
pub use parser::{parse_line, ProbeLine};
pub use persist::StateFile;
pub use probe::ProbeCommand;
pub use reconciler::SequenceReconciler;
pub use scheduler::Schedule;

pub use pingwatch_types::{
    AggregateBucket, Gap, HistoryPoint, LiveUpdate, PersistedState, PersistedTarget, Sample,
    StreamEvent, TargetHistory,
};
