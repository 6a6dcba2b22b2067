//! Context-carrying task kinds
//!
//! Each scheduling primitive captures the context current when the work is
//! *scheduled* and restores it when the work *runs*:
//!
//! | kind         | function                                   |
//! |--------------|--------------------------------------------|
//! | callback     | [`bind`], [`bind_fn`]                      |
//! | microtask    | [`spawn_local`], [`queue_microtask`]       |
//! | timer        | [`set_timeout`], [`sleep`]                 |
//! | continuation | [`then`]                                   |
//!
//! Spawning functions call `tokio::task::spawn_local` and must run inside a
//! `tokio::task::LocalSet`.

use crate::context::Context;
use crate::future::{PropagateContext, PropagatingFuture};
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::trace;

/// Capture the current context into a one-shot callback
pub fn bind<F, R>(f: F) -> impl FnOnce() -> R
where
    F: FnOnce() -> R,
{
    let context = Context::current();
    move || context.run(f)
}

/// Capture the current context into a reusable callback
pub fn bind_fn<F, R>(f: F) -> impl Fn() -> R
where
    F: Fn() -> R,
{
    let context = Context::current();
    move || context.run(&f)
}

/// Spawn a future on the local task set, running in the current context
pub fn spawn_local<F>(future: F) -> JoinHandle<F::Output>
where
    F: Future + 'static,
    F::Output: 'static,
{
    let future = future.in_current_context();
    trace!(
        target: "acimem::context",
        depth = future.context().depth(),
        "Spawning local task"
    );
    tokio::task::spawn_local(future)
}

/// Run `f` on the local task set at its next turn, in the current context
pub fn queue_microtask<F>(f: F) -> JoinHandle<()>
where
    F: FnOnce() + 'static,
{
    spawn_local(async move { f() })
}

/// Run `f` after `delay` on the local task set, in the current context
pub fn set_timeout<F, R>(delay: Duration, f: F) -> JoinHandle<R>
where
    F: FnOnce() -> R + 'static,
    R: 'static,
{
    spawn_local(async move {
        tokio::time::sleep(delay).await;
        f()
    })
}

/// Wait for `delay`, resuming in the context current now
pub fn sleep(delay: Duration) -> PropagatingFuture<tokio::time::Sleep> {
    tokio::time::sleep(delay).in_current_context()
}

/// Chain `f` after `future`, running `f` in the context current now
///
/// `future` itself is polled in whatever context awaits the result.
pub fn then<Fut, F, R>(future: Fut, f: F) -> impl Future<Output = R>
where
    Fut: Future,
    F: FnOnce(Fut::Output) -> R,
{
    let context = Context::current();
    async move {
        let output = future.await;
        context.run(move || f(output))
    }
}
