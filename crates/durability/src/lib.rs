//! Durability layer for acimem
//!
//! This crate connects committed model changes to storage backends:
//!
//! - Batcher: coalesces creates, updates and deletes per scheduling turn
//!   and delivers them to flush listeners
//! - Turns: what "the next scheduling turn" means (tokio local tasks, or
//!   explicitly driven)
//! - Resolver: an in-memory `StorageResolver` with staged durable sections

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod batcher;
pub mod resolver;
pub mod turns;

pub use batcher::{BatchEntry, ChangeBatch, ChangeBatcher, ListenerId, PersistableModel};
pub use resolver::{InMemoryResolver, ResolverStats};
pub use turns::{ManualTurns, TokioTurns, TurnScheduler, TurnTask};
