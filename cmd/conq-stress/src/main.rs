//! Stress test - conq queues under producer/consumer load
//!
//! Usage: conq-stress [items-per-producer] [threads]
//!
//! Runs three phases:
//! 1. LinkedQueue vs crossbeam SegQueue, MPMC throughput
//! 2. PriorityQueue behind a Mutex, ordered drain check
//! 3. DelayQueue pipeline, lateness of delivered items

use conq::{CancellationToken, DelayQueue, Delayed, DelayedItem, LinkedQueue, PriorityQueue};
use crossbeam_queue::SegQueue;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Minimal interface shared by the two MPMC queues being compared
trait Mpmc<T>: Send + Sync {
    fn push(&self, value: T);
    fn pop(&self) -> Option<T>;
}

impl<T: Send> Mpmc<T> for LinkedQueue<T> {
    fn push(&self, value: T) {
        self.enqueue(value);
    }
    fn pop(&self) -> Option<T> {
        self.dequeue().ok()
    }
}

impl<T: Send> Mpmc<T> for SegQueue<T> {
    fn push(&self, value: T) {
        SegQueue::push(self, value);
    }
    fn pop(&self) -> Option<T> {
        SegQueue::pop(self)
    }
}

fn run_mpmc<Q: Mpmc<usize> + 'static>(name: &str, queue: Arc<Q>, per_producer: usize, threads: usize) {
    let total = per_producer * threads;
    let taken = Arc::new(AtomicUsize::new(0));
    let sum = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();

    let mut handles = Vec::with_capacity(threads * 2);
    for p in 0..threads {
        let queue = Arc::clone(&queue);
        handles.push(thread::spawn(move || {
            for i in 0..per_producer {
                queue.push(p * per_producer + i);
            }
        }));
    }
    for _ in 0..threads {
        let queue = Arc::clone(&queue);
        let taken = Arc::clone(&taken);
        let sum = Arc::clone(&sum);
        handles.push(thread::spawn(move || {
            while taken.load(Ordering::Relaxed) < total {
                match queue.pop() {
                    Some(v) => {
                        sum.fetch_add(v, Ordering::Relaxed);
                        taken.fetch_add(1, Ordering::Relaxed);
                    }
                    None => thread::yield_now(),
                }
            }
        }));
    }
    for h in handles {
        h.join().expect("worker panicked");
    }

    let elapsed = start.elapsed();
    let expected = total * (total.saturating_sub(1)) / 2;
    println!(
        "  {:<12} {:>10} items in {:>10.2?}  ({:.0} ops/sec)  checksum {}",
        name,
        total,
        elapsed,
        total as f64 / elapsed.as_secs_f64(),
        if sum.load(Ordering::Relaxed) == expected { "ok" } else { "MISMATCH" }
    );
}

fn run_priority(items: usize, threads: usize) {
    let heap = Arc::new(Mutex::new(PriorityQueue::ordered(0)));
    let start = Instant::now();

    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let heap = Arc::clone(&heap);
            thread::spawn(move || {
                // Cheap deterministic scatter so producers interleave keys
                let mut x = (t as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15);
                for _ in 0..items {
                    x ^= x << 13;
                    x ^= x >> 7;
                    x ^= x << 17;
                    let _ = heap.lock().expect("heap lock poisoned").enqueue(x);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().expect("producer panicked");
    }

    let mut heap = heap.lock().expect("heap lock poisoned");
    let peak = heap.backing_capacity();
    let mut last = 0u64;
    let mut ordered = true;
    let mut drained = 0usize;
    while let Ok(v) = heap.dequeue() {
        ordered &= v >= last;
        last = v;
        drained += 1;
    }

    println!(
        "  {:<12} {:>10} items in {:>10.2?}  ordered {}  backing {} -> {}",
        "priority",
        drained,
        start.elapsed(),
        ordered,
        peak,
        heap.backing_capacity()
    );
}

fn run_delay(items: usize, threads: usize) {
    let queue = Arc::new(DelayQueue::<DelayedItem<usize>>::new(1024));
    let token = CancellationToken::new();
    let delivered = Arc::new(AtomicUsize::new(0));
    let worst_late_us = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();

    let consumers: Vec<_> = (0..threads)
        .map(|_| {
            let queue = Arc::clone(&queue);
            let token = token.clone();
            let delivered = Arc::clone(&delivered);
            let worst = Arc::clone(&worst_late_us);
            thread::spawn(move || {
                while let Ok(item) = queue.dequeue(&token) {
                    let late = item.overdue();
                    worst.fetch_max(late.as_micros() as usize, Ordering::Relaxed);
                    delivered.fetch_add(1, Ordering::Relaxed);
                }
            })
        })
        .collect();

    let producers: Vec<_> = (0..threads)
        .map(|t| {
            let queue = Arc::clone(&queue);
            let token = token.clone();
            thread::spawn(move || {
                for i in 0..items {
                    let delay = Duration::from_micros(((t * 31 + i * 17) % 5_000) as u64);
                    if queue.enqueue(DelayedItem::new(i, delay), &token).is_err() {
                        return;
                    }
                }
            })
        })
        .collect();
    for h in producers {
        h.join().expect("producer panicked");
    }

    let total = items * threads;
    let give_up = Instant::now() + Duration::from_secs(30);
    while delivered.load(Ordering::Relaxed) < total && Instant::now() < give_up {
        thread::sleep(Duration::from_millis(5));
    }
    token.cancel();
    for h in consumers {
        h.join().expect("consumer panicked");
    }

    println!(
        "  {:<12} {:>10} items in {:>10.2?}  delivered {}  worst lateness {}us",
        "delay",
        total,
        start.elapsed(),
        delivered.load(Ordering::Relaxed),
        worst_late_us.load(Ordering::Relaxed)
    );
}

fn main() {
    println!("=== conq Stress Test ===\n");

    let mut args = std::env::args().skip(1);
    let per_producer: usize = args.next().and_then(|s| s.parse().ok()).unwrap_or(100_000);
    let threads: usize = args
        .next()
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| thread::available_parallelism().map(|n| n.get()).unwrap_or(4).min(8));

    println!("Producers/consumers: {} each, {} items per producer\n", threads, per_producer);

    println!("MPMC FIFO:");
    run_mpmc("linked", Arc::new(LinkedQueue::new()), per_producer, threads);
    run_mpmc("segqueue", Arc::new(SegQueue::new()), per_producer, threads);

    println!("\nPriority:");
    run_priority(per_producer, threads);

    println!("\nDelay:");
    run_delay((per_producer / 10).max(1), threads);
}
