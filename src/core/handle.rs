//! Submission-side types: task ids, per-task options and result handles.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::oneshot;

use crate::error::PoolError;

/// Pool-unique, monotonically increasing task identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Per-submission overrides.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SubmitOptions {
    /// Deadline for this task; `None` uses the pool's `task_timeout`.
    ///
    /// `Some(Duration::ZERO)` disables the deadline for this task.
    pub timeout: Option<Duration>,
}

impl SubmitOptions {
    /// Options with an explicit deadline.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }
}

/// Pending result of a submitted task.
///
/// Resolves exactly once with the task's output or a [`PoolError`]. Dropping
/// the handle does not cancel the task.
#[must_use = "a task handle does nothing unless awaited"]
pub struct TaskHandle<O> {
    id: TaskId,
    rx: oneshot::Receiver<Result<O, PoolError>>,
}

impl<O> TaskHandle<O> {
    pub(crate) fn new(id: TaskId, rx: oneshot::Receiver<Result<O, PoolError>>) -> Self {
        Self { id, rx }
    }

    /// Returns the id assigned at submission.
    pub fn id(&self) -> TaskId {
        self.id
    }
}

impl<O> fmt::Debug for TaskHandle<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle").field("id", &self.id).finish()
    }
}

impl<O> Future for TaskHandle<O> {
    type Output = Result<O, PoolError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|answer| match answer {
            Ok(res) => res,
            // coordinator went away without answering
            Err(_) => Err(PoolError::PoolDestroyed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_with_the_sent_result() {
        let (tx, rx) = oneshot::channel();
        let handle = TaskHandle::new(TaskId(4), rx);
        assert_eq!(handle.id().to_string(), "task-4");
        tx.send(Ok::<_, PoolError>("done")).unwrap();
        assert_eq!(handle.await, Ok("done"));
    }

    #[tokio::test]
    async fn dropped_sender_reads_as_destroyed() {
        let (tx, rx) = oneshot::channel::<Result<(), PoolError>>();
        drop(tx);
        assert_eq!(TaskHandle::new(TaskId(1), rx).await, Err(PoolError::PoolDestroyed));
    }
}
