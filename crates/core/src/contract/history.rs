//! Version history for a single cell
//!
//! `VersionHistory<T>` keeps prior committed states of one cell, ordered
//! oldest to newest, so that a transaction whose snapshot predates a newer
//! commit can still read the value it is entitled to see.
//!
//! Retention is driven by the set of in-flight transactions:
//! - With no transaction in flight nobody can observe the past, so the
//!   history is dropped entirely.
//! - Once the history grows past the prune threshold, entries older than the
//!   oldest in-flight snapshot are discarded, keeping the newest entry at or
//!   before that boundary so every live snapshot can still be served.

use super::LogicalTimestamp;
use crate::error::{Error, Result};

/// Length above which [`VersionHistory::record_if_needed`] prunes
pub const DEFAULT_PRUNE_THRESHOLD: usize = 3;

/// What the in-flight transaction set looks like at commit time
///
/// `oldest_start` is the snapshot timestamp of the oldest transaction still
/// running; it bounds how far back the history must reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetentionHorizon {
    /// Number of transactions currently in flight
    pub in_flight: usize,
    /// Snapshot timestamp of the oldest in-flight transaction
    pub oldest_start: Option<LogicalTimestamp>,
}

impl RetentionHorizon {
    /// Horizon with the given in-flight count and oldest snapshot
    pub fn new(in_flight: usize, oldest_start: Option<LogicalTimestamp>) -> Self {
        Self {
            in_flight,
            oldest_start,
        }
    }

    /// Horizon with nothing in flight
    pub fn idle() -> Self {
        Self::default()
    }

    /// True when no transaction is in flight
    pub fn is_idle(&self) -> bool {
        self.in_flight == 0
    }
}

#[derive(Debug, Clone, PartialEq)]
struct HistoryEntry<T> {
    at: LogicalTimestamp,
    value: T,
}

/// Prior committed states of one cell, oldest first
#[derive(Debug, Clone)]
pub struct VersionHistory<T> {
    entries: Vec<HistoryEntry<T>>,
    prune_threshold: usize,
}

impl<T> VersionHistory<T> {
    /// Create an empty history with the default prune threshold
    pub fn new() -> Self {
        Self::with_prune_threshold(DEFAULT_PRUNE_THRESHOLD)
    }

    /// Create an empty history that prunes once it holds more than `threshold` entries
    pub fn with_prune_threshold(threshold: usize) -> Self {
        Self {
            entries: Vec::new(),
            prune_threshold: threshold.max(1),
        }
    }

    /// Number of retained entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is retained
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Timestamp of the oldest retained entry
    pub fn oldest(&self) -> Option<LogicalTimestamp> {
        self.entries.first().map(|e| e.at)
    }

    /// Timestamp of the newest retained entry
    pub fn newest(&self) -> Option<LogicalTimestamp> {
        self.entries.last().map(|e| e.at)
    }

    /// Timestamps of all retained entries, oldest first
    pub fn timestamps(&self) -> Vec<LogicalTimestamp> {
        self.entries.iter().map(|e| e.at).collect()
    }

    /// Drop every retained entry
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Record the state a commit is about to replace
    ///
    /// # Arguments
    /// * `prior` - the value being replaced
    /// * `prior_at` - the timestamp that value was committed at
    /// * `horizon` - in-flight transactions at commit time
    ///
    /// With nothing in flight the whole history is cleared instead.
    pub fn record_if_needed(
        &mut self,
        prior: T,
        prior_at: LogicalTimestamp,
        horizon: RetentionHorizon,
    ) {
        if horizon.is_idle() {
            if !self.entries.is_empty() {
                self.entries.clear();
            }
            return;
        }

        self.entries.push(HistoryEntry {
            at: prior_at,
            value: prior,
        });

        if self.entries.len() > self.prune_threshold {
            if let Some(boundary) = horizon.oldest_start {
                self.prune(boundary);
            }
        }
    }

    /// Value visible to a snapshot taken at `at`
    ///
    /// Scans newest to oldest and returns the first entry committed at or
    /// before `at`.
    ///
    /// # Errors
    ///
    /// `Error::HistoryUnderflow` when `at` predates every retained entry. That
    /// means pruning discarded state a live snapshot still needed.
    pub fn value_at(&self, at: LogicalTimestamp) -> Result<&T> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.at <= at)
            .map(|e| &e.value)
            .ok_or(Error::HistoryUnderflow {
                requested: at,
                oldest: self.oldest(),
            })
    }

    fn prune(&mut self, boundary: LogicalTimestamp) {
        if let Some(keep_from) = self.entries.iter().rposition(|e| e.at <= boundary) {
            if keep_from > 0 {
                tracing::trace!(
                    target: "acimem::history",
                    dropped = keep_from,
                    boundary = %boundary,
                    "Pruned version history"
                );
                self.entries.drain(..keep_from);
            }
        }
    }
}

impl<T> Default for VersionHistory<T> {
    fn default() -> Self {
        Self::new()
    }
}
