//! Logical timestamps ("memory versions")
//!
//! Every commit is stamped with a value drawn from a [`MonotonicClock`].
//! Timestamps order commits and decide snapshot visibility; they carry no
//! wall-clock meaning.
//!
//! ## Invariants
//!
//! - A clock never returns the same value twice from `next()`
//! - Values returned by `next()` are strictly increasing
//! - `GENESIS` precedes every issued value, so state stamped with it is
//!   visible to every snapshot

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque, totally ordered commit timestamp
///
/// Snapshots and commits are compared through this type only. Never expose
/// raw arithmetic; use the clock to advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LogicalTimestamp(u64);

impl LogicalTimestamp {
    /// The timestamp that precedes every issued timestamp
    pub const GENESIS: LogicalTimestamp = LogicalTimestamp(0);

    /// Largest representable timestamp
    pub const MAX: LogicalTimestamp = LogicalTimestamp(u64::MAX);

    /// Create a timestamp from its raw counter value
    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        LogicalTimestamp(raw)
    }

    /// Raw counter value
    #[inline]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// True for the genesis timestamp
    #[inline]
    pub const fn is_genesis(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for LogicalTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl From<LogicalTimestamp> for u64 {
    fn from(ts: LogicalTimestamp) -> u64 {
        ts.0
    }
}

/// Issues strictly increasing logical timestamps
///
/// One clock exists per memory runtime. `current()` returns the last issued
/// value without advancing; transactions take their snapshot from it.
#[derive(Debug)]
pub struct MonotonicClock {
    last: AtomicU64,
}

impl MonotonicClock {
    /// Create a clock positioned at [`LogicalTimestamp::GENESIS`]
    pub fn new() -> Self {
        Self::starting_at(LogicalTimestamp::GENESIS)
    }

    /// Create a clock whose last issued value is `last`
    ///
    /// Used when a runtime is rebuilt around state that already carries
    /// timestamps; the next issued value is `last + 1`.
    pub fn starting_at(last: LogicalTimestamp) -> Self {
        MonotonicClock {
            last: AtomicU64::new(last.0),
        }
    }

    /// Last issued timestamp
    pub fn current(&self) -> LogicalTimestamp {
        LogicalTimestamp(self.last.load(Ordering::SeqCst))
    }

    /// Issue the next timestamp
    pub fn next(&self) -> LogicalTimestamp {
        LogicalTimestamp(self.last.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}
