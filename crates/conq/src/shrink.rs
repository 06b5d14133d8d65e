//! Backing-store shrinking for unbounded queues
//!
//! The sizing decision is a pure function of the store's current capacity
//! and length. It never looks at element values and never proposes a
//! capacity below the current length.

use conq_core::constants::{SHRINK_LARGE_CAPACITY, SHRINK_MIN_CAPACITY};
use conq_core::ktrace;

/// Thresholds for [`shrink`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShrinkPolicy {
    /// Capacities at or below this are left alone
    pub min_capacity: usize,
    /// Capacities above this shrink to 5/8 once less than half used;
    /// capacities at or below it shrink to 1/2 once less than a quarter used
    pub large_capacity: usize,
}

impl Default for ShrinkPolicy {
    fn default() -> Self {
        Self {
            min_capacity: SHRINK_MIN_CAPACITY,
            large_capacity: SHRINK_LARGE_CAPACITY,
        }
    }
}

impl ShrinkPolicy {
    /// Capacity to shrink to, or `None` to keep the store as is
    pub fn target(&self, capacity: usize, len: usize) -> Option<usize> {
        if capacity <= self.min_capacity {
            return None;
        }
        // An empty store counts as one element so the ratio stays defined.
        let ratio = capacity / len.max(1);
        if capacity > self.large_capacity && ratio >= 2 {
            return Some(capacity / 8 * 5 + capacity % 8 * 5 / 8);
        }
        if capacity <= self.large_capacity && ratio >= 4 {
            return Some(capacity / 2);
        }
        None
    }
}

/// Shrink `store` according to `policy`, preserving order and contents
///
/// Returns the store unchanged when no shrink is due.
pub fn shrink<T>(mut store: Vec<T>, policy: &ShrinkPolicy) -> Vec<T> {
    if let Some(target) = policy.target(store.capacity(), store.len()) {
        ktrace!(
            "shrink backing store: capacity {} -> {} (len {})",
            store.capacity(),
            target,
            store.len()
        );
        store.shrink_to(target);
    }
    store
}
