//! Model Integration Tests
//!
//! Relational models on a configured `Runtime`: change batching, persistence
//! through a storage resolver, and keyed subscriptions.

#[path = "../common/mod.rs"]
mod common;

mod coalescing;
mod persistence;
mod subscriptions;
