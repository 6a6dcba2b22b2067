//! Core types and traits for acimem
//!
//! This crate defines the foundational pieces every other layer builds on:
//! - LogicalTimestamp / MonotonicClock: commit ordering ("memory versions")
//! - VersionHistory: per-cell ring of prior committed states
//! - Event: the kind of change a transaction made to a cell
//! - CellId, TxnId, MemoryId, ModelKey: stable identities
//! - Error: the error taxonomy shared by all crates
//! - Config: history, conflict and retry configuration
//! - Traits: the storage resolver boundary consumed from durability backends

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod contract;
pub mod error;
pub mod event;
pub mod query;
pub mod traits;
pub mod types;

pub use config::{ConflictPolicy, MemoryConfig, RetryConfig};
pub use contract::{LogicalTimestamp, MonotonicClock, RetentionHorizon, VersionHistory};
pub use error::{Error, Result};
pub use event::Event;
pub use query::{ReadQuery, Row, WriteOp, WriteQuery};
pub use traits::StorageResolver;
pub use types::{CellId, MemoryId, ModelKey, TxnId};
