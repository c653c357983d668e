use std::fmt;

use thiserror::Error;

/// Error returned by the put paths of [`BoundedQueue`](super::BoundedQueue).
///
/// The rejected item is handed back to the caller.
#[derive(Error, Clone, PartialEq, Eq)]
pub enum QueueError<T> {
    /// Queue is at capacity (non-waiting put).
    #[error("queue full")]
    Full(T),

    /// Queue stayed at capacity for the whole wait bound.
    #[error("queue full until timeout")]
    Timeout(T),

    /// Queue was closed.
    #[error("queue closed")]
    Closed(T),
}

impl<T> QueueError<T> {
    /// Returns the rejected item.
    pub fn into_inner(self) -> T {
        match self {
            QueueError::Full(t) | QueueError::Timeout(t) | QueueError::Closed(t) => t,
        }
    }

    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            QueueError::Full(_) => "queue_full",
            QueueError::Timeout(_) => "queue_timeout",
            QueueError::Closed(_) => "queue_closed",
        }
    }
}

impl<T> fmt::Debug for QueueError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueError::Full(_) => f.write_str("Full(..)"),
            QueueError::Timeout(_) => f.write_str("Timeout(..)"),
            QueueError::Closed(_) => f.write_str("Closed(..)"),
        }
    }
}

/// Error returned by the take paths of [`BoundedQueue`](super::BoundedQueue).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TakeError {
    /// Queue is empty (non-waiting take).
    #[error("queue empty")]
    Empty,

    /// Queue stayed empty for the whole wait bound.
    #[error("queue empty until timeout")]
    Timeout,

    /// Queue was closed and fully drained.
    #[error("queue closed")]
    Closed,
}
