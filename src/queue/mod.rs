//! Bounded FIFO queue used between pipeline stages.
//!
//! - [`BoundedQueue`] the queue itself (put/take with parking, hand-off, close)
//! - [`QueueError`], [`TakeError`] failures of the put and take paths

mod bounded;
mod error;

pub use bounded::BoundedQueue;
pub use error::{QueueError, TakeError};
