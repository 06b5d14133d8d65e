//! # conq-core
//!
//! Core types shared by the conq queue primitives.
//!
//! This crate holds everything that is not a queue: the error type, the
//! cancellation token blocking calls accept, the one-shot wakeup signal
//! those calls sleep on, and the ambient helpers (logging, env config).
//!
//! ## Modules
//!
//! - `error` - Error types
//! - `cancel` - Cancellation token that wakes blocked waiters
//! - `signal` - One-shot closable wakeup signal with a three-way wait
//! - `kprint` - Kernel-style logging macros
//! - `env` - Environment variable utilities

pub mod error;
pub mod cancel;
pub mod signal;
pub mod kprint;
pub mod env;

// Re-exports for convenience
pub use error::{QueueError, QueueFull, QueueResult};
pub use cancel::CancellationToken;
pub use signal::{Signal, Wake};
pub use env::{env_get, env_get_bool, env_get_opt, env_get_str, env_is_set};

/// Shared constants
pub mod constants {
    /// Initial backing capacity of an unbounded priority queue
    pub const DEFAULT_INITIAL_CAPACITY: usize = 64;

    /// Backing capacity at or below which the shrink helper never shrinks
    pub const SHRINK_MIN_CAPACITY: usize = 64;

    /// Backing capacity above which the shrink helper shrinks aggressively
    pub const SHRINK_LARGE_CAPACITY: usize = 2048;
}
