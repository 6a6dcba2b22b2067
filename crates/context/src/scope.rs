//! Current-context binding for synchronous code
//!
//! Each thread has exactly one current [`Context`]. Entering a context swaps
//! it in and hands back a [`ContextGuard`] that swaps the previous one back
//! on drop, so nested scopes unwind in LIFO order even when the body panics.

use crate::context::Context;
use std::cell::RefCell;
use std::marker::PhantomData;

thread_local! {
    static CURRENT: RefCell<Context> = RefCell::new(Context::root());
}

impl Context {
    /// The context bound to the running code
    pub fn current() -> Context {
        CURRENT.with(|current| current.borrow().clone())
    }

    /// Make this context current until the returned guard is dropped
    pub fn enter(&self) -> ContextGuard {
        let previous = CURRENT.with(|current| current.replace(self.clone()));
        ContextGuard {
            previous: Some(previous),
            _not_send: PhantomData,
        }
    }

    /// Run `f` with this context current, restoring the previous one after
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.enter();
        f()
    }
}

/// Restores the previously current context when dropped
///
/// Guards must be dropped in the reverse order they were created; keeping
/// them on the stack guarantees that.
#[must_use = "the context is exited as soon as the guard is dropped"]
pub struct ContextGuard {
    previous: Option<Context>,
    _not_send: PhantomData<*const ()>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            // The slot is gone during thread teardown; nothing left to restore.
            let _ = CURRENT.try_with(|current| {
                *current.borrow_mut() = previous;
            });
        }
    }
}
