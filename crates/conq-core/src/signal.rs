//! One-shot wakeup signal
//!
//! A `Signal` starts open and is closed exactly once. Closing wakes every
//! thread blocked in [`Signal::wait`]; a closed signal never reopens, so a
//! waiter that arrives late returns immediately. Broadcasters hand out a
//! fresh signal per round instead of reusing one.
//!
//! `wait` is a three-way wait: the signal closing, the caller's
//! cancellation token firing, or an optional deadline passing.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Instant;

use crate::cancel::CancellationToken;

/// Why a [`Signal::wait`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    /// The signal was closed
    Closed,
    /// The cancellation token fired
    Cancelled,
    /// The deadline passed before anything else happened
    TimedOut,
}

/// Closable wakeup channel
pub struct Signal {
    /// true once closed
    closed: Mutex<bool>,
    cond: Condvar,
}

impl Signal {
    /// Create an open signal
    pub fn new() -> Self {
        Self {
            closed: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    /// Close the signal, waking all current and future waiters
    pub fn close(&self) {
        {
            let mut closed = self.closed.lock().unwrap_or_else(PoisonError::into_inner);
            *closed = true;
        }
        self.cond.notify_all();
    }

    /// Check whether the signal has been closed
    pub fn is_closed(&self) -> bool {
        *self.closed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wake waiters so they re-check their wake conditions, without closing
    pub(crate) fn nudge(&self) {
        let _closed = self.closed.lock().unwrap_or_else(PoisonError::into_inner);
        self.cond.notify_all();
    }

    /// Block until the signal closes, `token` is cancelled, or `deadline`
    /// passes (`None` waits without a deadline)
    ///
    /// Cancellation is reported ahead of a simultaneous close.
    pub fn wait(self: &Arc<Self>, token: &CancellationToken, deadline: Option<Instant>) -> Wake {
        let _registration = token.register(self);
        let mut closed = self.closed.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if token.is_cancelled() {
                return Wake::Cancelled;
            }
            if *closed {
                return Wake::Closed;
            }
            match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Wake::TimedOut;
                    }
                    closed = self
                        .cond
                        .wait_timeout(closed, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
                None => {
                    closed = self.cond.wait(closed).unwrap_or_else(PoisonError::into_inner);
                }
            }
        }
    }
}

impl Default for Signal {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("closed", &self.is_closed())
            .finish()
    }
}
