//! Lock-free unbounded MPMC FIFO queue
//!
//! Singly linked list with atomic head and tail, after Michael and Scott.
//! No mutex anywhere: producers and consumers make progress by retrying
//! compare-and-swap loops.
//!
//! # Invariants
//!
//! - `head` always points at a sentinel whose value is already consumed
//!   (or was never set). The first live element is `head.next`.
//! - `tail` points at a node reachable from `head`. It can lag the real
//!   last node briefly, between a producer linking its node and swinging
//!   `tail` to it.
//!
//! # Progress
//!
//! A producer that finds `tail.next` already set just retries; it does not
//! help advance `tail`, since the producer that linked the node always does
//! that itself right after. CAS failures are never reported, they only
//! cause a retry. There is no bound on retries, so under pathological
//! contention a caller can see long (but not infinite) latency.
//!
//! # Reclamation
//!
//! Unlinked sentinels cannot be freed eagerly: another thread may still be
//! reading them. They are retired through `crossbeam-epoch` and freed once
//! every thread that could have seen them has unpinned.

use core::mem::MaybeUninit;
use core::sync::atomic::Ordering::{Acquire, Relaxed, Release};
use std::fmt;

use crossbeam_epoch::{self as epoch, Atomic, Guard, Owned, Shared};
use crossbeam_utils::CachePadded;

use conq_core::error::{QueueError, QueueResult};

struct Node<T> {
    /// Uninitialized in the sentinel; moved out when a node becomes one
    value: MaybeUninit<T>,
    next: Atomic<Node<T>>,
}

/// Unbounded lock-free FIFO queue
///
/// # Example
///
/// ```ignore
/// let q = LinkedQueue::new();
/// q.enqueue(1);
/// q.enqueue(2);
/// assert_eq!(q.dequeue(), Ok(1));
/// ```
pub struct LinkedQueue<T> {
    head: CachePadded<Atomic<Node<T>>>,
    tail: CachePadded<Atomic<Node<T>>>,
}

// Safety: values are only ever moved between threads, never shared.
unsafe impl<T: Send> Send for LinkedQueue<T> {}
unsafe impl<T: Send> Sync for LinkedQueue<T> {}

impl<T> LinkedQueue<T> {
    /// Create an empty queue (a lone sentinel)
    pub fn new() -> Self {
        let queue = Self {
            head: CachePadded::new(Atomic::null()),
            tail: CachePadded::new(Atomic::null()),
        };
        let sentinel = Owned::new(Node {
            value: MaybeUninit::uninit(),
            next: Atomic::null(),
        });
        // Safety: nobody else can see the queue yet.
        unsafe {
            let guard = epoch::unprotected();
            let sentinel = sentinel.into_shared(guard);
            queue.head.store(sentinel, Relaxed);
            queue.tail.store(sentinel, Relaxed);
        }
        queue
    }

    /// Append a value. Never blocks and never fails.
    pub fn enqueue(&self, value: T) {
        let guard = &epoch::pin();
        let new = Owned::new(Node {
            value: MaybeUninit::new(value),
            next: Atomic::null(),
        })
        .into_shared(guard);

        loop {
            let tail = self.tail.load(Acquire, guard);
            // Safety: tail is never null, and nodes reachable while pinned
            // are not freed until we unpin.
            let tail_ref = unsafe { tail.deref() };
            let next = tail_ref.next.load(Acquire, guard);
            if !next.is_null() {
                // Someone linked past this tail and will swing it themselves.
                core::hint::spin_loop();
                continue;
            }
            if tail_ref
                .next
                .compare_exchange(Shared::null(), new, Release, Relaxed, guard)
                .is_ok()
            {
                // Best effort; failure means tail already moved on.
                let _ = self.tail.compare_exchange(tail, new, Release, Relaxed, guard);
                return;
            }
        }
    }

    /// Remove the oldest value, or `Err(Empty)`. Never blocks.
    ///
    /// Emptiness is decided at the instant `head == tail` is observed; a
    /// producer that has linked a node but not yet swung `tail` is treated
    /// as not finished.
    pub fn dequeue(&self) -> QueueResult<T> {
        let guard = &epoch::pin();
        self.pop(guard).ok_or(QueueError::Empty)
    }

    /// Whether the queue is empty, under the same rule as `dequeue`
    pub fn is_empty(&self) -> bool {
        let guard = &epoch::pin();
        self.head.load(Acquire, guard) == self.tail.load(Acquire, guard)
    }

    fn pop(&self, guard: &Guard) -> Option<T> {
        loop {
            let head = self.head.load(Acquire, guard);
            let tail = self.tail.load(Acquire, guard);
            if head == tail {
                return None;
            }
            // Safety: head is never null; see enqueue.
            let next = unsafe { head.deref() }.next.load(Acquire, guard);
            if next.is_null() {
                // head moved between the two loads; start over
                continue;
            }
            if self
                .head
                .compare_exchange(head, next, Release, Relaxed, guard)
                .is_ok()
            {
                // Safety: winning the CAS makes us the only reader of
                // next.value, and next is now the sentinel so nobody reads
                // it again. The old sentinel is unreachable for new pins.
                unsafe {
                    guard.defer_destroy(head);
                    return Some(next.deref().value.as_ptr().read());
                }
            }
        }
    }
}

impl<T> Default for LinkedQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for LinkedQueue<T> {
    fn drop(&mut self) {
        // Safety: &mut self, so no other thread is inside the queue. Walk
        // next pointers rather than trusting tail.
        unsafe {
            let guard = epoch::unprotected();
            let mut node = self.head.load(Relaxed, guard);
            let mut is_sentinel = true;
            while !node.is_null() {
                let next = node.deref().next.load(Relaxed, guard);
                let mut owned = node.into_owned();
                if !is_sentinel {
                    owned.value.assume_init_drop();
                }
                is_sentinel = false;
                node = next;
            }
        }
    }
}

impl<T> fmt::Debug for LinkedQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkedQueue")
            .field("empty", &self.is_empty())
            .finish()
    }
}
