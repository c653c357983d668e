//! Worker slot table entries.
//!
//! A slot moves through a small state machine; replacement swaps the whole
//! entry for a fresh one at the same index and bumps its generation.
//!
//! ```text
//!   Idle ──dispatch──► Busy ──completed──► Idle
//!                       │
//!                       └──error/panic/timeout──► Failed ──replace──► Idle (generation + 1)
//! ```

use std::fmt;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::handle::TaskId;
use super::worker::Assignment;
use crate::backpressure::CreditPermit;
use crate::error::PoolError;

/// Stable index of a worker slot; survives replacement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(pub usize);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// Lifecycle state of a worker slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerState {
    /// Ready for the next task.
    Idle,
    /// Executing a task.
    Busy,
    /// Failed and awaiting replacement.
    Failed,
}

/// Point-in-time view of one worker slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkerSnapshot {
    /// Slot index.
    pub id: WorkerId,
    /// Number of times this slot was (re)created, starting at 0.
    pub generation: u64,
    /// Current state.
    pub state: WorkerState,
    /// Tasks completed by the current generation.
    pub completed: u64,
    /// Task being executed, if any.
    pub current: Option<TaskId>,
}

/// Point in time at which an in-flight task is failed with `TaskTimeout`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) struct Deadline {
    pub at: Instant,
    pub timeout: Duration,
}

impl Deadline {
    /// Deadline `timeout` from now; a zero duration means none.
    pub fn after(timeout: Option<Duration>) -> Option<Self> {
        timeout.filter(|d| !d.is_zero()).map(|timeout| Self {
            at: Instant::now() + timeout,
            timeout,
        })
    }
}

/// Task handed to a worker and awaiting its outcome.
pub(super) struct InFlight<O> {
    pub id: TaskId,
    pub reply: oneshot::Sender<Result<O, PoolError>>,
    pub credit: Option<CreditPermit>,
    pub deadline: Option<Deadline>,
}

impl<O> InFlight<O> {
    /// Returns the deadline if it has passed at `now`.
    pub fn expired(&self, now: Instant) -> Option<Deadline> {
        self.deadline.filter(|d| d.at <= now)
    }

    /// Resolves the caller, returning the credit first.
    pub fn resolve(self, res: Result<O, PoolError>) {
        drop(self.credit);
        let _ = self.reply.send(res);
    }
}

/// Coordinator-side record of one worker actor.
pub(super) struct WorkerSlot<I, O> {
    pub id: WorkerId,
    pub generation: u64,
    pub state: WorkerState,
    pub completed: u64,
    pub current: Option<InFlight<O>>,
    pub tx: mpsc::Sender<Assignment<I>>,
    pub token: CancellationToken,
    pub join: JoinHandle<()>,
}

impl<I, O> WorkerSlot<I, O> {
    pub fn snapshot(&self) -> WorkerSnapshot {
        WorkerSnapshot {
            id: self.id,
            generation: self.generation,
            state: self.state,
            completed: self.completed,
            current: self.current.as_ref().map(|job| job.id),
        }
    }

    /// Stops the actor; the in-flight task, if any, is returned to the caller.
    pub fn retire(&mut self) -> Option<InFlight<O>> {
        self.state = WorkerState::Failed;
        self.token.cancel();
        self.join.abort();
        self.current.take()
    }
}
