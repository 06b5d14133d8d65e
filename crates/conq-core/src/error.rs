//! Error types for the conq queues

use core::fmt;

/// Result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

/// Errors that can occur in queue operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// Nothing available to dequeue or peek
    Empty,

    /// Bounded queue is at capacity
    Full,

    /// Operation was cancelled via CancellationToken while blocked
    Cancelled,

    /// The underlying heap reported a condition that should be impossible
    /// under the queue's own locking. Report it upstream.
    Internal(&'static str),
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueError::Empty => write!(f, "queue empty"),
            QueueError::Full => write!(f, "queue full"),
            QueueError::Cancelled => write!(f, "operation cancelled"),
            QueueError::Internal(what) => write!(f, "unexpected internal error: {}", what),
        }
    }
}

impl std::error::Error for QueueError {}

/// Error returned when enqueueing into a full bounded queue
///
/// Hands the rejected element back so the caller can retry without cloning.
#[derive(Clone, PartialEq, Eq)]
pub struct QueueFull<T>(pub T);

impl<T> QueueFull<T> {
    /// Recover the element that could not be enqueued
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Debug for QueueFull<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("QueueFull(..)")
    }
}

impl<T> fmt::Display for QueueFull<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "queue full")
    }
}

impl<T> std::error::Error for QueueFull<T> {}

impl<T> From<QueueFull<T>> for QueueError {
    fn from(_: QueueFull<T>) -> Self {
        QueueError::Full
    }
}
