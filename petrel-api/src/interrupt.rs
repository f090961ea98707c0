//! Interruption token for waking blocked worker threads.
//!
//! There is no way to interrupt an arbitrary OS thread, so the pool gives
//! each worker an [`Interrupt`] token. Raising the token sets a flag and
//! wakes whatever wait target the thread registered before blocking; queue
//! waits observe the flag, consume it, and return
//! [`Interrupted`](crate::errors::Interrupted) so the worker re-checks pool
//! state.
//!
//! Workers additionally install their token in a thread local, which lets
//! task bodies poll [`requested`] for cooperative cancellation after an
//! immediate shutdown.

use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// A wait target that can be woken by an interrupter.
///
/// Implementations must serialize `wake` with the waiter's own flag check so
/// a raise landing between that check and the wait is never lost; for a
/// condvar-based queue this means locking the queue before notifying.
pub trait Wake: Send + Sync {
    fn wake(&self);
}

struct State {
    raised: AtomicBool,
    blocker: Mutex<Option<Arc<dyn Wake>>>,
}

/// Per-thread interruption token.
///
/// Cloning yields another handle to the same token.
#[derive(Clone)]
pub struct Interrupt {
    inner: Arc<State>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(State {
                raised: AtomicBool::new(false),
                blocker: Mutex::new(None),
            }),
        }
    }

    /// Raises the token and wakes the registered wait target, if any.
    pub fn raise(&self) {
        self.inner.raised.store(true, Ordering::Release);
        let target = self.inner.blocker.lock().unwrap().clone();
        if let Some(target) = target {
            target.wake();
        }
    }

    /// Whether the token is currently raised.
    pub fn is_raised(&self) -> bool {
        self.inner.raised.load(Ordering::Acquire)
    }

    /// Consumes the raised flag, returning whether it was set.
    pub fn consume(&self) -> bool {
        self.inner.raised.swap(false, Ordering::AcqRel)
    }

    /// Registers `target` as the wait target for the imminent blocking wait.
    ///
    /// The registration is dropped with the returned guard. Callers must
    /// re-check [`is_raised`](Self::is_raised) under the wait target's own
    /// lock after registering, before actually blocking.
    pub fn wait_in(&self, target: Arc<dyn Wake>) -> WaitGuard<'_> {
        *self.inner.blocker.lock().unwrap() = Some(target);
        WaitGuard { token: self }
    }
}

impl Default for Interrupt {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Interrupt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interrupt")
            .field("raised", &self.is_raised())
            .finish()
    }
}

/// Clears the wait-target registration on drop.
pub struct WaitGuard<'a> {
    token: &'a Interrupt,
}

impl Drop for WaitGuard<'_> {
    fn drop(&mut self) {
        *self.token.inner.blocker.lock().unwrap() = None;
    }
}

thread_local! {
    static CURRENT: RefCell<Option<Interrupt>> = RefCell::new(None);
}

/// Installs `token` as the calling thread's interrupt token until the
/// returned guard drops. Used by worker threads at startup.
pub fn install(token: Interrupt) -> InstallGuard {
    CURRENT.with(|current| *current.borrow_mut() = Some(token));
    InstallGuard { _private: () }
}

/// Whether the calling thread's interrupt token has been raised.
///
/// Returns `false` on threads without an installed token. Long-running task
/// bodies poll this to honour an immediate shutdown.
pub fn requested() -> bool {
    CURRENT.with(|current| {
        current
            .borrow()
            .as_ref()
            .map(|token| token.is_raised())
            .unwrap_or(false)
    })
}

/// Removes the thread-local token on drop.
pub struct InstallGuard {
    _private: (),
}

impl Drop for InstallGuard {
    fn drop(&mut self) {
        CURRENT.with(|current| *current.borrow_mut() = None);
    }
}
