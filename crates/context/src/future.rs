//! Context propagation through futures
//!
//! A future only runs while it is polled, and between polls the executor may
//! run any other task. [`PropagatingFuture`] captures a context when it is
//! built and re-enters it for the duration of every poll, so code after an
//! `.await` sees the same context as code before it.

use crate::context::Context;
use std::future::Future;
use std::pin::Pin;
use std::task::Poll;

/// Future wrapper that makes a captured context current on every poll
pub struct PropagatingFuture<F> {
    inner: Pin<Box<F>>,
    context: Context,
}

impl<F: Future> PropagatingFuture<F> {
    /// Wrap `future` so it always runs with `context` current
    pub fn new(future: F, context: Context) -> Self {
        Self {
            inner: Box::pin(future),
            context,
        }
    }

    /// The context this future runs in
    pub fn context(&self) -> &Context {
        &self.context
    }
}

impl<F: Future> Future for PropagatingFuture<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let _guard = this.context.enter();
        this.inner.as_mut().poll(cx)
    }
}

/// Extension trait for attaching a context to any future
pub trait PropagateContext: Future + Sized {
    /// Run this future with `context` current
    fn in_context(self, context: Context) -> PropagatingFuture<Self> {
        PropagatingFuture::new(self, context)
    }

    /// Run this future with the context current at the call site
    fn in_current_context(self) -> PropagatingFuture<Self> {
        PropagatingFuture::new(self, Context::current())
    }
}

impl<F: Future> PropagateContext for F {}
