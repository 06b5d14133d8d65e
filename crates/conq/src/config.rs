//! Priority queue configuration
//!
//! Library defaults with optional environment overrides, in builder style.
//!
//! ```rust,ignore
//! use conq::config::PriorityQueueConfig;
//!
//! // Defaults plus any CONQ_* overrides
//! let config = PriorityQueueConfig::from_env();
//!
//! // Or set programmatically
//! let config = PriorityQueueConfig::default()
//!     .capacity(1024)
//!     .initial_capacity(256);
//! ```

use conq_core::constants::DEFAULT_INITIAL_CAPACITY;
use conq_core::env::env_get;

use crate::shrink::ShrinkPolicy;

/// Configuration for a [`PriorityQueue`](crate::PriorityQueue)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorityQueueConfig {
    /// Maximum number of elements; 0 means unbounded
    pub capacity: usize,
    /// Backing capacity allocated up front when unbounded
    pub initial_capacity: usize,
    /// When to give memory back after dequeues (unbounded only)
    pub shrink: ShrinkPolicy,
}

impl Default for PriorityQueueConfig {
    fn default() -> Self {
        Self {
            capacity: 0,
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
            shrink: ShrinkPolicy::default(),
        }
    }
}

impl PriorityQueueConfig {
    /// Defaults with environment overrides applied.
    ///
    /// Environment variables (all optional):
    /// - `CONQ_PQ_CAPACITY` - Capacity ceiling (0 = unbounded)
    /// - `CONQ_PQ_INITIAL_CAPACITY` - Initial backing capacity when unbounded
    /// - `CONQ_SHRINK_MIN_CAPACITY` - Never shrink at or below this capacity
    /// - `CONQ_SHRINK_LARGE_CAPACITY` - Aggressive-shrink threshold
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            capacity: env_get("CONQ_PQ_CAPACITY", defaults.capacity),
            initial_capacity: env_get("CONQ_PQ_INITIAL_CAPACITY", defaults.initial_capacity),
            shrink: ShrinkPolicy {
                min_capacity: env_get("CONQ_SHRINK_MIN_CAPACITY", defaults.shrink.min_capacity),
                large_capacity: env_get("CONQ_SHRINK_LARGE_CAPACITY", defaults.shrink.large_capacity),
            },
        }
    }

    /// Set the capacity ceiling (0 = unbounded)
    pub fn capacity(mut self, n: usize) -> Self {
        self.capacity = n;
        self
    }

    /// Set the initial backing capacity for an unbounded queue
    pub fn initial_capacity(mut self, n: usize) -> Self {
        self.initial_capacity = n;
        self
    }

    /// Set the shrink policy
    pub fn shrink(mut self, policy: ShrinkPolicy) -> Self {
        self.shrink = policy;
        self
    }

    /// Whether this configuration describes an unbounded queue
    pub fn is_boundless(&self) -> bool {
        self.capacity == 0
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.is_boundless() && self.initial_capacity == 0 {
            return Err("initial_capacity must be at least 1 for an unbounded queue");
        }
        if self.shrink.large_capacity < self.shrink.min_capacity {
            return Err("shrink large_capacity must not be below min_capacity");
        }
        Ok(())
    }
}
