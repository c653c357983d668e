//! # Worker actor: executes assignments one at a time.
//!
//! Each worker slot is backed by one spawned actor owning the receiving end of
//! a small assignment channel. For each assignment the actor runs one
//! execution of the pool's [`Task`] and reports the outcome to the coordinator.
//!
//! ## Execution
//! ```text
//! recv(Assignment) ─► child token ─► catch_unwind(task.spawn(input, child))
//!                                        │
//!                                        ▼
//!                           Done(out) | Failed(err) | Panicked(msg)
//!                                        │
//!                                        └─► WorkerEvent { slot, generation, task_id, outcome }
//! ```
//!
//! ## Rules
//! - At most **one** event per assignment.
//! - On any outcome other than `Done` the actor exits; the coordinator replaces the slot.
//! - Deadlines belong to the coordinator: on expiry it cancels the actor's
//!   token and aborts it, then discards any late report by generation.

use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::handle::TaskId;
use crate::error::TaskError;
use crate::subscribers::panic_message;
use crate::tasks::{Task, TaskRef};

/// One unit of work handed to a worker.
pub(crate) struct Assignment<I> {
    pub task_id: TaskId,
    pub input: I,
}

/// How one execution ended.
#[derive(Debug)]
pub(super) enum Outcome<O> {
    Done(O),
    Failed(TaskError),
    Panicked(String),
}

impl<O> Outcome<O> {
    fn is_done(&self) -> bool {
        matches!(self, Outcome::Done(_))
    }
}

/// Outcome report sent to the coordinator.
pub(super) struct WorkerEvent<O> {
    pub slot: usize,
    pub generation: u64,
    pub task_id: TaskId,
    pub outcome: Outcome<O>,
}

/// Everything one worker actor owns.
pub(super) struct Worker<I, O> {
    pub slot: usize,
    pub generation: u64,
    pub task: TaskRef<I, O>,
    pub rx: mpsc::Receiver<Assignment<I>>,
    pub events: mpsc::UnboundedSender<WorkerEvent<O>>,
    pub token: CancellationToken,
}

impl<I, O> Worker<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    /// Serves assignments until cancelled, the channel closes, or an execution fails.
    pub async fn run(mut self) {
        loop {
            let assignment = tokio::select! {
                biased;
                _ = self.token.cancelled() => break,
                next = self.rx.recv() => match next {
                    Some(a) => a,
                    None => break,
                },
            };

            let task_id = assignment.task_id;
            let outcome = execute(&*self.task, assignment.input, &self.token).await;
            let done = outcome.is_done();
            let report = WorkerEvent {
                slot: self.slot,
                generation: self.generation,
                task_id,
                outcome,
            };
            if self.events.send(report).is_err() || !done {
                break;
            }
        }
    }
}

/// Runs one execution of `task` under a child of `parent`, isolating panics.
pub(super) async fn execute<I, O>(
    task: &dyn Task<Input = I, Output = O>,
    input: I,
    parent: &CancellationToken,
) -> Outcome<O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    let ctx = parent.child_token();
    let res = AssertUnwindSafe(async move { task.spawn(input, ctx).await })
        .catch_unwind()
        .await;

    match res {
        Ok(Ok(out)) => Outcome::Done(out),
        Ok(Err(e)) => Outcome::Failed(e),
        Err(panic) => Outcome::Panicked(panic_message(&*panic)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::TaskFn;

    fn echo() -> TaskRef<i32, i32> {
        TaskFn::arc("echo", |n: i32, ctx: CancellationToken| async move {
            match n {
                n if n < 0 => Err(TaskError::fail(format!("negative {n}"))),
                0 => panic!("zero"),
                1000.. => {
                    ctx.cancelled().await;
                    Err(TaskError::Canceled)
                }
                n => Ok(n),
            }
        })
    }

    #[tokio::test]
    async fn outcomes_are_classified() {
        let task = echo();
        let token = CancellationToken::new();
        assert!(matches!(execute(&*task, 5, &token).await, Outcome::Done(5)));
        assert!(matches!(
            execute(&*task, -1, &token).await,
            Outcome::Failed(TaskError::Fail { .. })
        ));
        match execute(&*task, 0, &token).await {
            Outcome::Panicked(msg) => assert_eq!(msg, "zero"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancelling_the_actor_reaches_the_task() {
        let task = echo();
        let token = CancellationToken::new();
        let run = execute(&*task, 1000, &token);
        tokio::pin!(run);
        assert!(futures::poll!(&mut run).is_pending());
        token.cancel();
        assert!(matches!(run.await, Outcome::Failed(TaskError::Canceled)));
    }

    #[tokio::test]
    async fn actor_stops_after_a_failure() {
        let (tx, rx) = mpsc::channel(1);
        let (events_tx, mut events) = mpsc::unbounded_channel();
        let worker = Worker {
            slot: 2,
            generation: 4,
            task: echo(),
            rx,
            events: events_tx,
            token: CancellationToken::new(),
        };
        let join = tokio::spawn(worker.run());

        tx.send(Assignment { task_id: TaskId(1), input: 7 }).await.unwrap();
        let ev = events.recv().await.unwrap();
        assert_eq!((ev.slot, ev.generation, ev.task_id), (2, 4, TaskId(1)));
        assert!(matches!(ev.outcome, Outcome::Done(7)));

        tx.send(Assignment { task_id: TaskId(2), input: -3 }).await.unwrap();
        let ev = events.recv().await.unwrap();
        assert!(matches!(ev.outcome, Outcome::Failed(_)));

        join.await.unwrap();
        assert!(tx.is_closed());
    }
}
