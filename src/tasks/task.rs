//! # Task abstraction.
//!
//! This module defines the [`Task`] trait: the work a pool worker or a
//! pipeline stage performs on one input. The common handle type is
//! [`TaskRef`], an `Arc<dyn Task>` suitable for sharing across workers.
//!
//! A task receives a [`CancellationToken`] and should check it to stop
//! cooperatively when its deadline passes or the pool is destroyed.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::TaskError;

/// Boxed future returned by [`Task::spawn`].
pub type BoxTaskFuture<O> = Pin<Box<dyn Future<Output = Result<O, TaskError>> + Send + 'static>>;

/// Shared handle to a task.
pub type TaskRef<I, O> = Arc<dyn Task<Input = I, Output = O>>;

/// # Asynchronous, cancelable unit of work.
///
/// A `Task` has a stable [`name`](Task::name) and produces a fresh future per
/// input via [`spawn`](Task::spawn). The same task instance is shared by every
/// worker of a pool (or every runner of a stage), so per-call state belongs in
/// the future, not in `self`.
///
/// # Example
/// ```
/// use tokio_util::sync::CancellationToken;
/// use poolvisor::{BoxTaskFuture, Task, TaskError};
///
/// struct Square;
///
/// impl Task for Square {
///     type Input = u64;
///     type Output = u64;
///
///     fn name(&self) -> &str { "square" }
///
///     fn spawn(&self, n: u64, ctx: CancellationToken) -> BoxTaskFuture<u64> {
///         Box::pin(async move {
///             if ctx.is_cancelled() {
///                 return Err(TaskError::Canceled);
///             }
///             Ok(n * n)
///         })
///     }
/// }
/// ```
pub trait Task: Send + Sync + 'static {
    /// Payload handed to each execution.
    type Input: Send + 'static;
    /// Value produced by a successful execution.
    type Output: Send + 'static;

    /// Returns a stable, human-readable task name.
    fn name(&self) -> &str;

    /// Creates the future processing `input`.
    ///
    /// `ctx` is cancelled when the execution's deadline passes or its owner shuts down.
    fn spawn(&self, input: Self::Input, ctx: CancellationToken) -> BoxTaskFuture<Self::Output>;
}
