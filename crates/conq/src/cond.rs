//! Lock-coupled broadcast condition
//!
//! A `Broadcast` lives inside the state its mutex protects and holds the
//! current one-shot [`Signal`]. Both operations take the mutex guard by
//! value: the caller must hold the lock to call them, and the lock is
//! always released by the call, never by the caller afterwards.
//!
//! Handing out the signal under the lock and then releasing it closes the
//! window in which a broadcast could slip between "unlock" and "start
//! waiting": a waiter that grabbed the signal before a broadcast sees it
//! closed, however late it actually blocks.

use std::mem;
use std::sync::{Arc, MutexGuard};

use conq_core::Signal;

pub(crate) struct Broadcast {
    signal: Arc<Signal>,
}

impl Broadcast {
    pub(crate) fn new() -> Self {
        Self {
            signal: Arc::new(Signal::new()),
        }
    }

    /// Wake everyone waiting on the current signal
    ///
    /// Installs a fresh signal, releases `guard`, then closes the old one.
    pub(crate) fn broadcast<S>(
        mut guard: MutexGuard<'_, S>,
        select: impl FnOnce(&mut S) -> &mut Broadcast,
    ) {
        let old = mem::replace(&mut select(&mut *guard).signal, Arc::new(Signal::new()));
        drop(guard);
        old.close();
    }

    /// Take the current signal to block on, releasing `guard`
    pub(crate) fn wait_channel<S>(
        guard: MutexGuard<'_, S>,
        select: impl FnOnce(&S) -> &Broadcast,
    ) -> Arc<Signal> {
        let signal = Arc::clone(&select(&*guard).signal);
        drop(guard);
        signal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conq_core::{CancellationToken, Wake};
    use std::sync::Mutex;
    use std::thread;
    use std::time::{Duration, Instant};

    struct State {
        cond: Broadcast,
        value: u32,
    }

    #[test]
    fn test_broadcast_releases_lock() {
        let state = Mutex::new(State { cond: Broadcast::new(), value: 0 });

        let guard = state.lock().unwrap();
        Broadcast::broadcast(guard, |s| &mut s.cond);
        assert!(state.try_lock().is_ok());

        let guard = state.lock().unwrap();
        let _signal = Broadcast::wait_channel(guard, |s| &s.cond);
        assert!(state.try_lock().is_ok());
    }

    #[test]
    fn test_waiter_taken_before_broadcast_sees_it() {
        let state = Mutex::new(State { cond: Broadcast::new(), value: 0 });

        let signal = Broadcast::wait_channel(state.lock().unwrap(), |s| &s.cond);

        let mut guard = state.lock().unwrap();
        guard.value = 1;
        Broadcast::broadcast(guard, |s| &mut s.cond);

        // Blocking only now still observes the earlier broadcast.
        assert!(signal.is_closed());
        assert_eq!(signal.wait(&CancellationToken::dummy(), None), Wake::Closed);
    }

    #[test]
    fn test_new_round_after_broadcast() {
        let state = Mutex::new(State { cond: Broadcast::new(), value: 0 });
        Broadcast::broadcast(state.lock().unwrap(), |s| &mut s.cond);

        let signal = Broadcast::wait_channel(state.lock().unwrap(), |s| &s.cond);
        assert!(!signal.is_closed());
        let wake = signal.wait(
            &CancellationToken::new(),
            Some(Instant::now() + Duration::from_millis(20)),
        );
        assert_eq!(wake, Wake::TimedOut);
    }

    #[test]
    fn test_broadcast_wakes_blocked_threads() {
        let state = Arc::new(Mutex::new(State { cond: Broadcast::new(), value: 0 }));
        let mut handles = vec![];

        for _ in 0..3 {
            let state = Arc::clone(&state);
            handles.push(thread::spawn(move || loop {
                let guard = state.lock().unwrap();
                if guard.value > 0 {
                    return guard.value;
                }
                let signal = Broadcast::wait_channel(guard, |s| &s.cond);
                signal.wait(&CancellationToken::dummy(), None);
            }));
        }

        thread::sleep(Duration::from_millis(50));
        let mut guard = state.lock().unwrap();
        guard.value = 7;
        Broadcast::broadcast(guard, |s| &mut s.cond);

        for h in handles {
            assert_eq!(h.join().unwrap(), 7);
        }
    }
}
