//! Error types for acimem
//!
//! This module defines the error taxonomy shared by every layer.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! ## Propagation
//!
//! - `Conflict` and `ScopeMisuse` surface to the caller of the transactional
//!   function and are recoverable (retry at the caller's discretion, or
//!   automatically under the `Retry` conflict policy).
//! - `HistoryUnderflow` is an invariant violation; callers must not swallow it.
//! - `Observer` is only ever constructed for logging. Observer and listener
//!   failures never reach the committing caller.

use crate::contract::LogicalTimestamp;
use thiserror::Error;

/// Result type alias for acimem operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for acimem
#[derive(Debug, Error)]
pub enum Error {
    /// Concurrent writes to the same cell were detected at commit
    ///
    /// The rejected transaction applied zero writes.
    #[error("Transaction {transaction} had conflicting writes with {conflicting}. {transaction} was reverted")]
    Conflict {
        /// Name of the rejected transaction (`"unnamed"` when unlabelled)
        transaction: String,
        /// Name of the transaction (or write source) it conflicted with
        conflicting: String,
    },

    /// A snapshot read asked for state older than anything retained
    #[error("History underflow: no value retained at or before {requested} (oldest retained: {oldest:?})")]
    HistoryUnderflow {
        /// Snapshot timestamp that was requested
        requested: LogicalTimestamp,
        /// Oldest retained entry, if any
        oldest: Option<LogicalTimestamp>,
    },

    /// The transactional API was used outside the scope it supports
    #[error("Scope misuse: {0}")]
    ScopeMisuse(String),

    /// An observer or batch listener failed
    #[error("Observer failed: {0}")]
    Observer(String),

    /// A durability backend failed during a durable section
    #[error("Durability error: {0}")]
    Durability(String),

    /// Configuration could not be parsed or was out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Build a conflict error, substituting `"unnamed"` for missing labels
    pub fn conflict(transaction: Option<&str>, conflicting: Option<&str>) -> Self {
        Error::Conflict {
            transaction: transaction.unwrap_or("unnamed").to_string(),
            conflicting: conflicting.unwrap_or("unnamed").to_string(),
        }
    }

    /// Build a scope misuse error
    pub fn scope_misuse(message: impl Into<String>) -> Self {
        Error::ScopeMisuse(message.into())
    }

    /// True for commit-time write conflicts
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict { .. })
    }

    /// True for scope misuse
    pub fn is_scope_misuse(&self) -> bool {
        matches!(self, Error::ScopeMisuse(_))
    }

    /// True for errors that indicate a broken internal invariant
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::HistoryUnderflow { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
