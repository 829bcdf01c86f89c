//! # pingwatch-types
//!
//! Wire and persistence types for pingwatch. These describe what a viewer
//! receives over the live event stream and what the monitor writes to its
//! state file, independent of how the monitor computes them.
//!
//! ## Features
//!
//! - `serde`: JSON serialization matching the event stream and state file
//!   formats
//!
//! ## Example
//!
//! ```rust
//! use pingwatch_types::{Gap, Sample};
//!
//! let point = Sample::reply(42, 12.5, 1_700_000_000_000);
//! assert!(point.is_reply());
//!
//! let gap = Gap::new(3, 5);
//! assert_eq!(gap.count, 3);
//! ```

mod aggregate;
mod event;
mod sample;
mod state;
mod version;

pub use aggregate::*;
pub use event::*;
pub use sample::*;
pub use state::*;
pub use version::*;

/// Current state file schema version.
///
/// Increment this when making breaking changes to the persisted format.
pub const SCHEMA_VERSION: u32 = 1;

/// Milliseconds since the Unix epoch.
pub type TimestampMs = u64;
