//! Transactions over versioned cells
//!
//! This crate implements the runtime half of acimem:
//! - [`Memory`]: clock, id allocation and the in-flight transaction set
//! - [`VersionedCell`]: a value with version history and snapshot reads
//! - [`ObservableCell`]: post-commit subscriptions
//! - `tx` / `tx_async`: snapshot-isolated transactions with first-committer-wins
//!   conflict detection, optional retry, and durable sections
//!
//! Everything here is single-threaded. The ambient transaction travels in the
//! [`acimem_context::Context`] of the running code, so interleaved async tasks
//! on one thread each see their own.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cell;
pub mod durable;
pub mod manager;
pub mod memory;
pub mod metrics;
pub mod observable;
mod registry;
pub mod transaction;
pub mod validation;

pub use cell::VersionedCell;
pub use durable::DurableBinding;
pub use memory::Memory;
pub use metrics::TransactionMetrics;
pub use observable::{Change, ObservableCell, Subscription};
pub use transaction::{CommitSummary, Transaction, TransactionStatus, TxOptions};
pub use validation::{ConflictType, ValidationResult, UNTRACKED_WRITE_SOURCE};
