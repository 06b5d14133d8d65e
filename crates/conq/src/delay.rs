//! Blocking delay queue
//!
//! A priority queue ordered by remaining delay. `dequeue` only ever hands
//! out an element whose delay has run out, blocking until one is ready;
//! `enqueue` blocks while a bounded queue is full. Both take a
//! [`CancellationToken`] and return `Err(Cancelled)` promptly once it fires,
//! without having changed the queue.
//!
//! # Coordination
//!
//! One mutex guards the heap and two [`Broadcast`] conditions:
//!
//! - `enqueued` - closed whenever an element goes in (a new, possibly
//!   earlier, head may exist)
//! - `dequeued` - closed whenever an element comes out (a slot freed up)
//!
//! No call holds the mutex while it sleeps. Every wait goes through
//! `Broadcast::wait_channel`, which releases the lock as it hands out the
//! signal.
//!
//! # Precision
//!
//! Waits are deadline-based condvar sleeps, so readiness is detected
//! within the OS timer resolution, typically well under a millisecond but
//! with no hard guarantee. Not suitable where sub-millisecond accuracy
//! matters.

use std::cmp::Ordering;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use conq_core::error::{QueueError, QueueFull, QueueResult};
use conq_core::{kdebug, kerror, ktrace, CancellationToken, Wake};

use crate::cond::Broadcast;
use crate::config::PriorityQueueConfig;
use crate::priority::{CompareFn, PriorityQueue};

/// Elements of a [`DelayQueue`]
///
/// Together `delay` and `overdue` form a signed remaining delay: the queue
/// orders pending elements by `delay` and ready ones by `overdue`, longest
/// overdue first.
pub trait Delayed {
    /// Time left until the element may be dequeued.
    /// `Duration::ZERO` means ready.
    fn delay(&self) -> Duration;

    /// Time since the element became ready; `Duration::ZERO` while pending.
    fn overdue(&self) -> Duration {
        Duration::ZERO
    }
}

/// A value paired with the instant it becomes ready
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelayedItem<T> {
    value: T,
    /// `None` past the clock's range: never ready
    deadline: Option<Instant>,
}

impl<T> DelayedItem<T> {
    /// Ready `delay` from now. A delay the clock cannot represent never
    /// becomes ready.
    pub fn new(value: T, delay: Duration) -> Self {
        Self {
            value,
            deadline: Instant::now().checked_add(delay),
        }
    }

    /// Ready at `deadline`
    pub fn at(value: T, deadline: Instant) -> Self {
        Self {
            value,
            deadline: Some(deadline),
        }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T> Delayed for DelayedItem<T> {
    fn delay(&self) -> Duration {
        match self.deadline {
            Some(deadline) => deadline.saturating_duration_since(Instant::now()),
            None => Duration::MAX,
        }
    }

    fn overdue(&self) -> Duration {
        match self.deadline {
            Some(deadline) => Instant::now().saturating_duration_since(deadline),
            None => Duration::ZERO,
        }
    }
}

fn compare_delay<T: Delayed>(a: &T, b: &T) -> Ordering {
    let (left, right) = (a.delay(), b.delay());
    if left.is_zero() && right.is_zero() {
        b.overdue().cmp(&a.overdue())
    } else {
        left.cmp(&right)
    }
}

struct Shared<T> {
    heap: PriorityQueue<T, CompareFn<T>>,
    enqueued: Broadcast,
    dequeued: Broadcast,
}

/// Blocking, cancellable delay queue
///
/// # Example
///
/// ```ignore
/// let q = DelayQueue::new(0);
/// let token = CancellationToken::new();
///
/// q.enqueue(DelayedItem::new("job", Duration::from_millis(50)), &token)?;
/// let job = q.dequeue(&token)?; // returns after ~50ms
/// ```
pub struct DelayQueue<T> {
    shared: Mutex<Shared<T>>,
}

impl<T: Delayed> DelayQueue<T> {
    /// Create a delay queue; `capacity == 0` means unbounded
    pub fn new(capacity: usize) -> Self {
        Self::from_config(PriorityQueueConfig::default().capacity(capacity))
    }

    /// Create a delay queue from a priority queue configuration
    pub fn from_config(config: PriorityQueueConfig) -> Self {
        let compare: CompareFn<T> = compare_delay::<T>;
        Self {
            shared: Mutex::new(Shared {
                heap: PriorityQueue::from_config(config, compare),
                enqueued: Broadcast::new(),
                dequeued: Broadcast::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Shared<T>> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of queued elements, ready or not
    pub fn len(&self) -> usize {
        self.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().heap.is_empty()
    }

    /// Configured ceiling; 0 for an unbounded queue
    pub fn cap(&self) -> usize {
        self.lock().heap.cap()
    }

    /// Insert an element, waiting for space while the queue is full
    pub fn enqueue(&self, value: T, token: &CancellationToken) -> QueueResult<()> {
        let mut value = value;
        loop {
            token.check()?;
            let mut shared = self.lock();
            match shared.heap.enqueue(value) {
                Ok(()) => {
                    Broadcast::broadcast(shared, |s| &mut s.enqueued);
                    return Ok(());
                }
                Err(QueueFull(rejected)) => {
                    value = rejected;
                    let signal = Broadcast::wait_channel(shared, |s| &s.dequeued);
                    ktrace!("delay queue full; enqueue waiting for a dequeue");
                    if signal.wait(token, None) == Wake::Cancelled {
                        kdebug!("delay queue enqueue cancelled while full");
                        return Err(QueueError::Cancelled);
                    }
                }
            }
        }
    }

    /// Remove the element with the least remaining delay once that delay
    /// has run out, blocking until then
    pub fn dequeue(&self, token: &CancellationToken) -> QueueResult<T> {
        loop {
            token.check()?;
            let shared = self.lock();
            let head_delay = shared.heap.peek().map(|head| head.delay());
            match head_delay {
                Ok(delay) if delay.is_zero() => return self.take_head(shared),
                Ok(delay) => {
                    // Too far out for the clock: wait without a deadline.
                    let deadline = Instant::now().checked_add(delay);
                    let signal = Broadcast::wait_channel(shared, |s| &s.enqueued);
                    ktrace!("delay queue head not ready; waiting up to {:?}", delay);
                    match signal.wait(token, deadline) {
                        Wake::Cancelled => return Err(self.cancelled()),
                        // Something new went in; re-evaluate from the top.
                        Wake::Closed => continue,
                        Wake::TimedOut => {
                            // Another consumer may have taken the head while
                            // we slept. Check once; do not spin.
                            let shared = self.lock();
                            let ready = matches!(shared.heap.peek(), Ok(head) if head.delay().is_zero());
                            if ready {
                                return self.take_head(shared);
                            }
                        }
                    }
                }
                Err(QueueError::Empty) => {
                    let signal = Broadcast::wait_channel(shared, |s| &s.enqueued);
                    ktrace!("delay queue empty; dequeue waiting for an enqueue");
                    if signal.wait(token, None) == Wake::Cancelled {
                        return Err(self.cancelled());
                    }
                }
                Err(err) => {
                    drop(shared);
                    kerror!("delay queue peek failed unexpectedly: {}", err);
                    return Err(QueueError::Internal("delay queue peek failed"));
                }
            }
        }
    }

    fn take_head(&self, mut shared: MutexGuard<'_, Shared<T>>) -> QueueResult<T> {
        match shared.heap.dequeue() {
            Ok(value) => {
                Broadcast::broadcast(shared, |s| &mut s.dequeued);
                Ok(value)
            }
            Err(err) => {
                drop(shared);
                kerror!("delay queue lost a peeked head: {}", err);
                Err(QueueError::Internal("peeked head missing on dequeue"))
            }
        }
    }

    fn cancelled(&self) -> QueueError {
        kdebug!("delay queue dequeue cancelled while waiting");
        QueueError::Cancelled
    }
}

impl<T> std::fmt::Debug for DelayQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shared = self.shared.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("DelayQueue")
            .field("heap", &shared.heap)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    type Item = DelayedItem<u32>;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_ready_element_returns_immediately() {
        let q = DelayQueue::new(0);
        let token = CancellationToken::new();

        q.enqueue(Item::new(1, Duration::ZERO), &token).unwrap();
        let start = Instant::now();
        assert_eq!(q.dequeue(&token).unwrap().into_inner(), 1);
        assert!(start.elapsed() < ms(500));
        assert!(q.is_empty());
    }

    #[test]
    fn test_never_returned_early() {
        let q = DelayQueue::new(0);
        let token = CancellationToken::new();
        let start = Instant::now();

        q.enqueue(Item::new(7, ms(50)), &token).unwrap();
        let item = q.dequeue(&token).unwrap();

        assert_eq!(*item.value(), 7);
        assert!(Instant::now() >= item.deadline().unwrap());
        assert!(start.elapsed() >= ms(50));
        assert!(start.elapsed() < ms(1000));
    }

    #[test]
    fn test_ready_items_in_deadline_order() {
        let q = DelayQueue::new(0);
        let token = CancellationToken::new();
        let base = Instant::now();

        for (v, offset) in [(3, 30), (1, 10), (2, 20)] {
            q.enqueue(Item::at(v, base + ms(offset)), &token).unwrap();
        }
        let order: Vec<u32> = (0..3).map(|_| q.dequeue(&token).unwrap().into_inner()).collect();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn test_more_overdue_comes_out_first() {
        let q = DelayQueue::new(0);
        let token = CancellationToken::new();
        let now = Instant::now();
        let ago = |n| now.checked_sub(ms(n)).unwrap();

        q.enqueue(DelayedItem::at("less_overdue", ago(10)), &token).unwrap();
        q.enqueue(DelayedItem::at("more_overdue", ago(30)), &token).unwrap();

        assert_eq!(q.dequeue(&token).unwrap().into_inner(), "more_overdue");
        assert_eq!(q.dequeue(&token).unwrap().into_inner(), "less_overdue");
    }

    #[test]
    fn test_late_consumer_drains_in_deadline_order() {
        let q = DelayQueue::new(0);
        let token = CancellationToken::new();
        let base = Instant::now();

        for (v, offset) in [(2, 10), (4, 25), (1, 5), (3, 15)] {
            q.enqueue(Item::at(v, base + ms(offset)), &token).unwrap();
        }
        q.enqueue(Item::new(5, Duration::from_secs(60)), &token).unwrap();

        // Every short deadline has passed before anyone asks.
        thread::sleep(ms(60));

        let order: Vec<u32> = (0..4).map(|_| q.dequeue(&token).unwrap().into_inner()).collect();
        assert_eq!(order, vec![1, 2, 3, 4]);
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn test_ready_elements_ordered_by_overdue() {
        struct Ready(Duration);

        impl Delayed for Ready {
            fn delay(&self) -> Duration {
                Duration::ZERO
            }

            fn overdue(&self) -> Duration {
                self.0
            }
        }

        let (a, b) = (Ready(ms(30)), Ready(ms(10)));
        assert_eq!(compare_delay(&a, &b), Ordering::Less);
        assert_eq!(compare_delay(&b, &a), Ordering::Greater);
        assert_eq!(compare_delay(&a, &Ready(ms(30))), Ordering::Equal);
    }

    #[test]
    fn test_unrepresentable_delay_waits_until_cancelled() {
        struct Unscheduled;

        impl Delayed for Unscheduled {
            fn delay(&self) -> Duration {
                Duration::MAX
            }
        }

        let q = Arc::new(DelayQueue::new(0));
        let token = CancellationToken::new();
        q.enqueue(Unscheduled, &token).unwrap();

        let consumer = {
            let q = Arc::clone(&q);
            let token = token.clone();
            thread::spawn(move || q.dequeue(&token).map(|_| ()))
        };

        thread::sleep(ms(50));
        assert!(!consumer.is_finished());
        token.cancel();

        assert_eq!(consumer.join().unwrap(), Err(QueueError::Cancelled));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn test_item_beyond_clock_range_never_ready() {
        let item = DelayedItem::new(1u32, Duration::MAX);
        assert_eq!(item.deadline(), None);
        assert_eq!(item.delay(), Duration::MAX);
        assert_eq!(item.overdue(), Duration::ZERO);

        let soon = Item::new(2, ms(1));
        assert_eq!(compare_delay(&soon, &item), Ordering::Less);
    }

    #[test]
    fn test_shorter_delay_preempts_waiting_consumer() {
        let q = Arc::new(DelayQueue::new(0));
        let token = CancellationToken::new();

        q.enqueue(Item::new(0xA, ms(50)), &token).unwrap();

        let consumer = {
            let q = Arc::clone(&q);
            let token = token.clone();
            thread::spawn(move || {
                let first = q.dequeue(&token).unwrap().into_inner();
                let second = q.dequeue(&token).unwrap().into_inner();
                (first, second)
            })
        };

        thread::sleep(ms(5));
        q.enqueue(Item::new(0xB, ms(10)), &token).unwrap();

        assert_eq!(consumer.join().unwrap(), (0xB, 0xA));
    }

    #[test]
    fn test_cancel_while_empty() {
        let q: Arc<DelayQueue<Item>> = Arc::new(DelayQueue::new(0));
        let token = CancellationToken::new();

        let consumer = {
            let q = Arc::clone(&q);
            let token = token.clone();
            thread::spawn(move || q.dequeue(&token))
        };

        thread::sleep(ms(50));
        token.cancel();

        assert_eq!(consumer.join().unwrap(), Err(QueueError::Cancelled));
        assert!(q.is_empty());
    }

    #[test]
    fn test_cancel_while_head_pending_leaves_heap() {
        let q = Arc::new(DelayQueue::new(0));
        let token = CancellationToken::new();
        q.enqueue(Item::new(9, Duration::from_secs(60)), &CancellationToken::dummy())
            .unwrap();

        let consumer = {
            let q = Arc::clone(&q);
            let token = token.clone();
            thread::spawn(move || q.dequeue(&token))
        };

        thread::sleep(ms(50));
        let start = Instant::now();
        token.cancel();

        assert_eq!(consumer.join().unwrap(), Err(QueueError::Cancelled));
        assert!(start.elapsed() < Duration::from_secs(5));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn test_precancelled_token() {
        let q = DelayQueue::new(0);
        let token = CancellationToken::new();
        token.cancel();

        assert_eq!(q.enqueue(Item::new(1, Duration::ZERO), &token), Err(QueueError::Cancelled));
        assert!(q.is_empty());

        q.enqueue(Item::new(1, Duration::ZERO), &CancellationToken::dummy()).unwrap();
        assert_eq!(q.dequeue(&token), Err(QueueError::Cancelled));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn test_full_enqueue_waits_for_dequeue() {
        let q = Arc::new(DelayQueue::new(1));
        let token = CancellationToken::new();
        assert_eq!(q.cap(), 1);

        q.enqueue(Item::new(1, Duration::ZERO), &token).unwrap();

        let producer = {
            let q = Arc::clone(&q);
            let token = token.clone();
            thread::spawn(move || q.enqueue(Item::new(2, Duration::ZERO), &token))
        };

        thread::sleep(ms(50));
        assert!(!producer.is_finished());
        assert_eq!(q.len(), 1);

        assert_eq!(q.dequeue(&token).unwrap().into_inner(), 1);
        assert_eq!(producer.join().unwrap(), Ok(()));
        assert_eq!(q.dequeue(&token).unwrap().into_inner(), 2);
    }

    #[test]
    fn test_full_enqueue_cancelled() {
        let q = Arc::new(DelayQueue::new(1));
        q.enqueue(Item::new(1, Duration::from_secs(60)), &CancellationToken::dummy())
            .unwrap();
        let token = CancellationToken::new();

        let producer = {
            let q = Arc::clone(&q);
            let token = token.clone();
            thread::spawn(move || q.enqueue(Item::new(2, Duration::ZERO), &token))
        };

        thread::sleep(ms(50));
        token.cancel();

        assert_eq!(producer.join().unwrap(), Err(QueueError::Cancelled));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn test_many_consumers_each_item_once() {
        const ITEMS: u32 = 200;
        const CONSUMERS: usize = 4;

        let q = Arc::new(DelayQueue::<Item>::new(16));
        let token = CancellationToken::new();
        let mut consumers = vec![];

        for _ in 0..CONSUMERS {
            let q = Arc::clone(&q);
            let token = token.clone();
            consumers.push(thread::spawn(move || {
                let mut got = Vec::new();
                while let Ok(item) = q.dequeue(&token) {
                    assert!(item.delay().is_zero(), "item returned early");
                    got.push(item.into_inner());
                }
                got
            }));
        }

        for v in 0..ITEMS {
            q.enqueue(Item::new(v, ms(u64::from(v % 7))), &token).unwrap();
        }

        // Drain, then release the consumers blocked on an empty queue.
        let deadline = Instant::now() + Duration::from_secs(10);
        while !q.is_empty() && Instant::now() < deadline {
            thread::sleep(ms(10));
        }
        thread::sleep(ms(20));
        token.cancel();

        let mut seen = HashSet::new();
        for h in consumers {
            for v in h.join().unwrap() {
                assert!(seen.insert(v), "duplicate {}", v);
            }
        }
        assert_eq!(seen.len(), ITEMS as usize);
    }
}
