//! Binary min-heap priority queue
//!
//! Array-backed heap ordered by a caller-supplied three-way comparator.
//! The element that compares smallest is at the root and comes out first.
//!
//! # Bounded vs unbounded
//!
//! - `capacity > 0`: the backing store is allocated once and never resized;
//!   enqueue past the ceiling fails with [`QueueFull`].
//! - `capacity == 0`: the store grows on demand and, after every dequeue,
//!   is offered to [`shrink`] so that a burst does not pin memory forever.
//!
//! # Layout
//!
//! Elements live at `data[0..len]`. Position `i` here is heap position
//! `i + 1` in the textbook 1-indexed layout, so the parent of `i` is
//! `(i - 1) / 2` and its children are `2i + 1` and `2i + 2`. The heap
//! invariant is `compare(data[i], data[parent(i)]) != Less` for all `i > 0`.
//!
//! # Complexity
//!
//! - Enqueue: O(log n)
//! - Dequeue: O(log n), plus an O(n) copy when a shrink is due
//! - Peek: O(1)
//!
//! Not internally synchronized. Share it behind a lock
//! (as [`DelayQueue`](crate::DelayQueue) does).

use std::cmp::Ordering;
use std::fmt;

use conq_core::error::{QueueError, QueueFull, QueueResult};

use crate::config::PriorityQueueConfig;
use crate::shrink::{shrink, ShrinkPolicy};

/// Plain function comparator, as used by [`PriorityQueue::ordered`]
pub type CompareFn<T> = fn(&T, &T) -> Ordering;

/// Binary-heap priority queue
pub struct PriorityQueue<T, C> {
    compare: C,
    /// Ceiling; 0 = unbounded
    capacity: usize,
    data: Vec<T>,
    shrink: ShrinkPolicy,
}

impl<T: Ord> PriorityQueue<T, CompareFn<T>> {
    /// Queue ordered by `T`'s own `Ord`, smallest first
    pub fn ordered(capacity: usize) -> Self {
        Self::new(capacity, T::cmp)
    }
}

impl<T, C> PriorityQueue<T, C>
where
    C: Fn(&T, &T) -> Ordering,
{
    /// Create a queue; `capacity == 0` means unbounded
    pub fn new(capacity: usize, compare: C) -> Self {
        Self::from_config(PriorityQueueConfig::default().capacity(capacity), compare)
    }

    /// Create a queue from a full configuration
    pub fn from_config(config: PriorityQueueConfig, compare: C) -> Self {
        let reserve = if config.is_boundless() {
            config.initial_capacity
        } else {
            config.capacity
        };
        Self {
            compare,
            capacity: config.capacity,
            data: Vec::with_capacity(reserve),
            shrink: config.shrink,
        }
    }

    /// Number of queued elements
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Configured ceiling; 0 for an unbounded queue
    #[inline]
    pub fn cap(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Whether the queue has no ceiling
    #[inline]
    pub fn is_boundless(&self) -> bool {
        self.capacity == 0
    }

    #[inline]
    fn is_full(&self) -> bool {
        !self.is_boundless() && self.data.len() >= self.capacity
    }

    /// Current size of the backing store (not the ceiling)
    pub fn backing_capacity(&self) -> usize {
        self.data.capacity()
    }

    /// The smallest element, without removing it
    pub fn peek(&self) -> QueueResult<&T> {
        self.data.first().ok_or(QueueError::Empty)
    }

    /// Insert an element
    ///
    /// Fails with the element handed back if the queue is bounded and full.
    pub fn enqueue(&mut self, value: T) -> Result<(), QueueFull<T>> {
        if self.is_full() {
            return Err(QueueFull(value));
        }
        self.data.push(value);
        self.sift_up(self.data.len() - 1);
        Ok(())
    }

    /// Remove and return the smallest element
    pub fn dequeue(&mut self) -> QueueResult<T> {
        if self.data.is_empty() {
            return Err(QueueError::Empty);
        }
        // Last element takes the root slot; the old root comes back to us.
        let top = self.data.swap_remove(0);
        self.shrink_if_necessary();
        self.sift_down(0);
        Ok(top)
    }

    fn shrink_if_necessary(&mut self) {
        if self.is_boundless() {
            self.data = shrink(std::mem::take(&mut self.data), &self.shrink);
        }
    }

    fn sift_up(&mut self, mut node: usize) {
        while node > 0 {
            let parent = (node - 1) / 2;
            if (self.compare)(&self.data[node], &self.data[parent]) != Ordering::Less {
                break;
            }
            self.data.swap(node, parent);
            node = parent;
        }
    }

    fn sift_down(&mut self, mut node: usize) {
        let n = self.data.len();
        loop {
            let mut min_pos = node;
            let left = 2 * node + 1;
            let right = left + 1;
            if left < n && (self.compare)(&self.data[left], &self.data[min_pos]) == Ordering::Less {
                min_pos = left;
            }
            if right < n && (self.compare)(&self.data[right], &self.data[min_pos]) == Ordering::Less {
                min_pos = right;
            }
            if min_pos == node {
                break;
            }
            self.data.swap(node, min_pos);
            node = min_pos;
        }
    }

    #[cfg(test)]
    fn assert_heap(&self) {
        for i in 1..self.data.len() {
            let parent = (i - 1) / 2;
            assert_ne!(
                (self.compare)(&self.data[i], &self.data[parent]),
                Ordering::Less,
                "heap violated at {}",
                i
            );
        }
    }
}

impl<T, C> fmt::Debug for PriorityQueue<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PriorityQueue")
            .field("len", &self.data.len())
            .field("capacity", &self.capacity)
            .field("backing_capacity", &self.data.capacity())
            .finish()
    }
}
