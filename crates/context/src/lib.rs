//! Implicit context propagation for acimem
//!
//! This crate carries an immutable key/value [`Context`] through synchronous
//! calls, spawned local tasks, timers and future continuations without
//! threading it through every signature. The transaction layer stores the
//! ambient transaction here.
//!
//! - `context`: the persistent key/value map and its typed keys
//! - `scope`: the per-thread current binding and its restoring guard
//! - `future`: futures that re-enter their context on every poll
//! - `task`: the four task kinds (callback, microtask, timer, continuation)
//!
//! Everything here is single-threaded: contexts hold `Rc` values and are
//! `!Send`. Async work runs on a current-thread runtime, with spawned tasks
//! inside a `tokio::task::LocalSet`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod context;
pub mod future;
pub mod scope;
pub mod task;

pub use context::{Context, ContextKey};
pub use future::{PropagateContext, PropagatingFuture};
pub use scope::ContextGuard;
pub use task::{bind, bind_fn, queue_microtask, set_timeout, sleep, spawn_local, then};
