//! # conq - concurrent queue primitives
//!
//! Building blocks for producer/consumer pipelines:
//!
//! - [`LinkedQueue`] - unbounded lock-free MPMC FIFO (Michael-Scott style,
//!   epoch-reclaimed nodes). Never blocks.
//! - [`PriorityQueue`] - binary min-heap with a pluggable comparator,
//!   optional capacity ceiling, and shrink-on-dequeue when unbounded.
//!   Not synchronized; wrap it in a lock to share it.
//! - [`DelayQueue`] - priority queue keyed by remaining delay. Blocks
//!   consumers until the head is due and producers while full; every
//!   blocking call is cancellable.
//!
//! ## Quick Start
//!
//! ```ignore
//! use conq::{CancellationToken, DelayQueue, DelayedItem, LinkedQueue, PriorityQueue};
//! use std::time::Duration;
//!
//! let fifo = LinkedQueue::new();
//! fifo.enqueue(1);
//! assert_eq!(fifo.dequeue(), Ok(1));
//!
//! let mut heap = PriorityQueue::ordered(2);
//! heap.enqueue(5).unwrap();
//! heap.enqueue(3).unwrap();
//! assert_eq!(heap.peek(), Ok(&3));
//!
//! let delayed = DelayQueue::new(0);
//! let token = CancellationToken::new();
//! delayed.enqueue(DelayedItem::new("later", Duration::from_millis(50)), &token)?;
//! let item = delayed.dequeue(&token)?;
//! ```
//!
//! ## Errors
//!
//! All queues report through [`QueueError`]: `Empty` and `Full` are
//! ordinary outcomes of the non-blocking queues, `Cancelled` ends a blocked
//! delay-queue call, and `Internal` flags a broken invariant and is logged
//! at error level before it is returned.

pub mod config;
pub mod shrink;
pub mod priority;
pub mod linked;
pub mod delay;
mod cond;

pub use config::PriorityQueueConfig;
pub use shrink::{shrink, ShrinkPolicy};
pub use priority::{CompareFn, PriorityQueue};
pub use linked::LinkedQueue;
pub use delay::{DelayQueue, Delayed, DelayedItem};

// Re-export core types for convenience
pub use conq_core::{CancellationToken, QueueError, QueueFull, QueueResult};
