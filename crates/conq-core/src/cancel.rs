//! Cancellation token for cooperative cancellation
//!
//! Blocking queue operations take a token by reference and return
//! `Err(QueueError::Cancelled)` once it fires. Tokens can be linked to form
//! parent-child relationships.
//!
//! Unlike a bare flag, a token also knows which [`Signal`]s its waiters are
//! currently sleeping on, so `cancel()` wakes them instead of leaving them
//! blocked until some unrelated event arrives.

use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::{QueueError, QueueResult};
use crate::signal::Signal;

/// Token for checking and triggering cancellation
///
/// Cloning shares state: cancelling any clone cancels them all.
#[derive(Clone)]
pub struct CancellationToken {
    inner: CancellationInner,
}

#[derive(Clone)]
enum CancellationInner {
    /// Heap-allocated token
    Owned(Arc<OwnedCancellation>),
    /// Dummy token that never cancels
    Dummy,
}

struct OwnedCancellation {
    cancelled: AtomicBool,

    parent: Option<CancellationToken>,

    /// Signals that blocked waiters are sleeping on, keyed by registration id
    waiters: Mutex<Vec<(u64, Arc<Signal>)>>,

    next_id: AtomicU64,
}

impl OwnedCancellation {
    fn add_waiter(&self, signal: &Arc<Signal>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.waiters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::clone(signal)));
        id
    }

    fn remove_waiter(&self, id: u64) {
        let mut waiters = self.waiters.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(pos) = waiters.iter().position(|(wid, _)| *wid == id) {
            waiters.swap_remove(pos);
        }
    }

    fn wake_waiters(&self) {
        let waiters = self.waiters.lock().unwrap_or_else(PoisonError::into_inner);
        for (_, signal) in waiters.iter() {
            signal.nudge();
        }
    }
}

impl CancellationToken {
    /// Create a new independent cancellation token
    pub fn new() -> Self {
        Self::owned(None)
    }

    /// Create a dummy token that never cancels
    ///
    /// Does not allocate. Useful for callers that never cancel.
    pub fn dummy() -> Self {
        Self {
            inner: CancellationInner::Dummy,
        }
    }

    /// Create a child token linked to this one
    ///
    /// If this token is cancelled, the child observes it too, and anything
    /// blocked on the child is woken.
    pub fn child(&self) -> Self {
        Self::owned(Some(self.clone()))
    }

    fn owned(parent: Option<CancellationToken>) -> Self {
        Self {
            inner: CancellationInner::Owned(Arc::new(OwnedCancellation {
                cancelled: AtomicBool::new(false),
                parent,
                waiters: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(0),
            })),
        }
    }

    /// Check if cancellation was requested
    ///
    /// Also checks parent tokens recursively.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        match &self.inner {
            CancellationInner::Owned(arc) => {
                if arc.cancelled.load(Ordering::Acquire) {
                    return true;
                }
                if let Some(ref parent) = arc.parent {
                    return parent.is_cancelled();
                }
                false
            }
            CancellationInner::Dummy => false,
        }
    }

    /// Request cancellation
    ///
    /// Sets this token's flag (not the parent's) and wakes every waiter
    /// registered on this token or any of its children.
    pub fn cancel(&self) {
        if let CancellationInner::Owned(arc) = &self.inner {
            arc.cancelled.store(true, Ordering::Release);
            // Waiters register before checking the flag under the signal's
            // own lock, so waking after the store cannot be missed.
            arc.wake_waiters();
        }
    }

    /// Check if cancelled and return error if so
    ///
    /// ```ignore
    /// loop {
    ///     token.check()?;  // Returns Err(Cancelled) if cancelled
    ///     // ... do work ...
    /// }
    /// ```
    #[inline]
    pub fn check(&self) -> QueueResult<()> {
        if self.is_cancelled() {
            Err(QueueError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Reset cancellation (for token reuse)
    ///
    /// Does not affect child tokens or parent tokens.
    pub fn reset(&self) {
        if let CancellationInner::Owned(arc) = &self.inner {
            arc.cancelled.store(false, Ordering::Release);
        }
    }

    /// Register `signal` so that cancelling this token (or any ancestor)
    /// nudges it. The registration is undone when the returned guard drops.
    pub(crate) fn register(&self, signal: &Arc<Signal>) -> Registration {
        let mut entries = Vec::new();
        let mut current = Some(self);
        while let Some(token) = current {
            match &token.inner {
                CancellationInner::Owned(arc) => {
                    let id = arc.add_waiter(signal);
                    entries.push((Arc::clone(arc), id));
                    current = arc.parent.as_ref();
                }
                CancellationInner::Dummy => current = None,
            }
        }
        Registration { entries }
    }

    #[cfg(test)]
    fn waiter_count(&self) -> usize {
        match &self.inner {
            CancellationInner::Owned(arc) => arc
                .waiters
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .len(),
            CancellationInner::Dummy => 0,
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Guard that unregisters a waiting signal from a token chain on drop
pub(crate) struct Registration {
    entries: Vec<(Arc<OwnedCancellation>, u64)>,
}

impl Drop for Registration {
    fn drop(&mut self) {
        for (owner, id) in self.entries.drain(..) {
            owner.remove_waiter(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_cancellation() {
        let token = CancellationToken::new();

        assert!(!token.is_cancelled());
        assert!(token.check().is_ok());

        token.cancel();

        assert!(token.is_cancelled());
        assert_eq!(token.check(), Err(QueueError::Cancelled));
    }

    #[test]
    fn test_child_token() {
        let parent = CancellationToken::new();
        let child = parent.child();

        assert!(!child.is_cancelled());

        parent.cancel();
        assert!(child.is_cancelled());
    }

    #[test]
    fn test_child_independent_cancel() {
        let parent = CancellationToken::new();
        let child = parent.child();

        child.cancel();
        assert!(child.is_cancelled());
        assert!(!parent.is_cancelled());
    }

    #[test]
    fn test_reset() {
        let token = CancellationToken::new();
        token.cancel();
        assert!(token.is_cancelled());

        token.reset();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_clone_shares_state() {
        let token1 = CancellationToken::new();
        let token2 = token1.clone();

        token1.cancel();
        assert!(token2.is_cancelled());
    }

    #[test]
    fn test_dummy_token() {
        let token = CancellationToken::dummy();
        assert!(!token.is_cancelled());
        token.cancel(); // no-op
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_registration_spans_parents() {
        let root = CancellationToken::new();
        let child = root.child();
        let signal = Arc::new(Signal::new());

        {
            let _reg = child.register(&signal);
            assert_eq!(child.waiter_count(), 1);
            assert_eq!(root.waiter_count(), 1);
        }

        assert_eq!(child.waiter_count(), 0);
        assert_eq!(root.waiter_count(), 0);
    }
}
