//! Versioning contract types
//!
//! These types express how committed state is ordered and retained:
//!
//! - `timestamp`: logical commit timestamps and the clock that issues them
//! - `history`: bounded history of prior committed values for one cell
//!
//! ## Usage
//!
//! ```
//! use acimem_core::contract::{LogicalTimestamp, MonotonicClock, RetentionHorizon, VersionHistory};
//!
//! let clock = MonotonicClock::new();
//! let first = clock.next();
//! let mut history = VersionHistory::new();
//! history.record_if_needed("a", first, RetentionHorizon::new(1, Some(first)));
//! assert_eq!(*history.value_at(first).unwrap(), "a");
//! assert!(first > LogicalTimestamp::GENESIS);
//! ```

pub mod history;
pub mod timestamp;

// Re-exports
pub use history::{RetentionHorizon, VersionHistory, DEFAULT_PRUNE_THRESHOLD};
pub use timestamp::{LogicalTimestamp, MonotonicClock};
