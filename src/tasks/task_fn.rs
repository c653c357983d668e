//! # Function-backed task (`TaskFn`)
//!
//! [`TaskFn`] wraps a closure `F: Fn(I, CancellationToken) -> Fut`, producing a fresh
//! future per input. No state is shared between executions unless the closure
//! captures an `Arc<...>` explicitly.
//!
//! ## Example
//! ```rust
//! use tokio_util::sync::CancellationToken;
//! use poolvisor::{TaskFn, TaskRef, TaskError};
//!
//! let t: TaskRef<String, usize> = TaskFn::arc("word-count", |text: String, _ctx: CancellationToken| async move {
//!     Ok::<_, TaskError>(text.split_whitespace().count())
//! });
//!
//! assert_eq!(t.name(), "word-count");
//! ```

use std::borrow::Cow;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::TaskError;
use crate::tasks::task::{BoxTaskFuture, Task};

/// Function-backed task implementation.
pub struct TaskFn<F, I, O> {
    name: Cow<'static, str>,
    f: F,
    _io: PhantomData<fn(I) -> O>,
}

impl<F, Fut, I, O> TaskFn<F, I, O>
where
    F: Fn(I, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, TaskError>> + Send + 'static,
{
    /// Creates a new function-backed task.
    ///
    /// Prefer [`TaskFn::arc`] when you immediately need a [`TaskRef`](crate::TaskRef).
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
            _io: PhantomData,
        }
    }

    /// Creates the task and returns it as a shared handle.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

impl<F, Fut, I, O> Task for TaskFn<F, I, O>
where
    F: Fn(I, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, TaskError>> + Send + 'static,
    I: Send + 'static,
    O: Send + 'static,
{
    type Input = I;
    type Output = O;

    fn name(&self) -> &str {
        &self.name
    }

    fn spawn(&self, input: I, ctx: CancellationToken) -> BoxTaskFuture<O> {
        Box::pin((self.f)(input, ctx))
    }
}

impl<F, I, O> std::fmt::Debug for TaskFn<F, I, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskFn").field("name", &self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::TaskRef;

    #[tokio::test]
    async fn each_spawn_gets_its_own_input() {
        let t: TaskRef<u32, u32> = TaskFn::arc("double", |n: u32, _ctx: CancellationToken| async move {
            Ok::<_, TaskError>(n * 2)
        });
        let a = t.spawn(2, CancellationToken::new());
        let b = t.spawn(5, CancellationToken::new());
        assert_eq!(b.await, Ok(10));
        assert_eq!(a.await, Ok(4));
    }

    #[tokio::test]
    async fn sees_cancellation() {
        let t = TaskFn::arc("watch", |_: (), ctx: CancellationToken| async move {
            ctx.cancelled().await;
            Err::<(), _>(TaskError::Canceled)
        });
        let ctx = CancellationToken::new();
        let fut = t.spawn((), ctx.clone());
        ctx.cancel();
        assert_eq!(fut.await, Err(TaskError::Canceled));
    }
}
