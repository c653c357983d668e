//! # Coordinator: owns the task queue and the worker slot table.
//!
//! One coordinator task runs per pool. It is the only place that touches the
//! queue, the slots and the counters; everything else talks to it through
//! channels.
//!
//! ## Loop
//! ```text
//! loop {
//!   select! (biased) {
//!     token.cancelled()        ─► break
//!     sleep_until(deadline)    ─► TaskTimeout + replace slot   (earliest in-flight deadline)
//!     worker_events.recv()     ─► complete / fail + replace slot
//!     commands.recv()          ─► push_back(task)  (None = all pool handles dropped ─► break)
//!   }
//!   dispatch():  while queue non-empty and some slot Idle:
//!                  first Idle slot (stable order) ◄── oldest task
//!   publish stats (watch)
//! }
//! teardown():
//!   close admission ─► fail queued + in-flight with PoolDestroyed
//!   ─► stop workers ─► publish PoolDestroyed ─► stop subscriber listener
//! ```
//!
//! ## Rules
//! - A task is resolved **exactly once**: by its worker's outcome, by a
//!   failure of its worker, or by teardown.
//! - Replacement is remove-and-reinsert at the same index; the pool size never changes.
//! - A worker found dead at dispatch is replaced and the task goes back to the
//!   **front** of the queue.
//! - Outcomes from an older generation of a slot are ignored.
//! - Deadlines are enforced here, not by the worker, so a task that never
//!   yields still times out on schedule. Expired deadlines are checked before
//!   any worker outcome is applied; a result arriving after its deadline is dropped.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use super::handle::TaskId;
use super::slot::{Deadline, InFlight, WorkerId, WorkerSlot, WorkerSnapshot, WorkerState};
use super::worker::{Assignment, Outcome, Worker, WorkerEvent};
use crate::backpressure::{CreditGate, CreditPermit};
use crate::error::PoolError;
use crate::events::{Bus, Event, EventKind};
use crate::tasks::TaskRef;

/// Counters snapshot of a pool.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Worker slots (constant for the pool's lifetime, 0 after destroy).
    pub total_workers: usize,
    /// Slots currently executing a task.
    pub busy_workers: usize,
    /// Tasks waiting for a worker.
    pub queue_length: usize,
    /// Tasks that finished successfully.
    pub total_completed: u64,
    /// Tasks failed by their worker (error, panic or timeout).
    pub total_failed: u64,
    /// Worker slots replaced after a failure.
    pub replacements: u64,
}

/// Task waiting in the queue.
pub(super) struct QueuedTask<I, O> {
    pub id: TaskId,
    pub input: I,
    pub timeout: Option<Duration>,
    pub enqueued: Instant,
    pub reply: oneshot::Sender<Result<O, PoolError>>,
    pub credit: Option<CreditPermit>,
    pub slot_permit: OwnedSemaphorePermit,
}

/// Messages from pool handles to the coordinator.
pub(super) enum Command<I, O> {
    Submit(QueuedTask<I, O>),
}

/// Channels and shared handles the coordinator is started with.
pub(super) struct CoordinatorParts<I, O> {
    pub name: Arc<str>,
    pub task: TaskRef<I, O>,
    pub workers: usize,
    pub bus: Bus,
    pub token: CancellationToken,
    pub admission: Arc<Semaphore>,
    pub credits: Option<CreditGate>,
    pub commands: mpsc::UnboundedReceiver<Command<I, O>>,
    pub stats: watch::Sender<PoolStats>,
    pub workers_view: watch::Sender<Vec<WorkerSnapshot>>,
    pub listener: Option<(JoinHandle<()>, CancellationToken)>,
}

pub(super) struct Coordinator<I, O> {
    name: Arc<str>,
    task: TaskRef<I, O>,
    bus: Bus,
    token: CancellationToken,
    admission: Arc<Semaphore>,
    credits: Option<CreditGate>,
    commands: mpsc::UnboundedReceiver<Command<I, O>>,
    events_tx: mpsc::UnboundedSender<WorkerEvent<O>>,
    events_rx: mpsc::UnboundedReceiver<WorkerEvent<O>>,
    stats_tx: watch::Sender<PoolStats>,
    workers_tx: watch::Sender<Vec<WorkerSnapshot>>,
    listener: Option<(JoinHandle<()>, CancellationToken)>,

    queue: VecDeque<QueuedTask<I, O>>,
    slots: Vec<WorkerSlot<I, O>>,
    completed: u64,
    failed: u64,
    replacements: u64,
}

impl<I, O> Coordinator<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    /// Creates the coordinator and spawns the initial worker actors.
    pub fn new(parts: CoordinatorParts<I, O>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let mut this = Self {
            name: parts.name,
            task: parts.task,
            bus: parts.bus,
            token: parts.token,
            admission: parts.admission,
            credits: parts.credits,
            commands: parts.commands,
            events_tx,
            events_rx,
            stats_tx: parts.stats,
            workers_tx: parts.workers_view,
            listener: parts.listener,
            queue: VecDeque::new(),
            slots: Vec::with_capacity(parts.workers),
            completed: 0,
            failed: 0,
            replacements: 0,
        };
        for index in 0..parts.workers {
            let slot = this.spawn_slot(index, 0);
            this.slots.push(slot);
        }
        this.publish_stats();
        this
    }

    /// Drives the pool until it is destroyed or every pool handle is dropped.
    pub async fn run(mut self) {
        loop {
            let deadline = self.next_deadline();
            tokio::select! {
                biased;
                _ = self.token.cancelled() => break,
                _ = time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.expire_deadlines();
                }
                Some(ev) = self.events_rx.recv() => self.on_worker_event(ev),
                cmd = self.commands.recv() => match cmd {
                    Some(Command::Submit(task)) => self.queue.push_back(task),
                    None => break,
                },
            }
            self.dispatch();
            self.publish_stats();
        }
        self.teardown().await;
    }

    fn spawn_slot(&self, index: usize, generation: u64) -> WorkerSlot<I, O> {
        let (tx, rx) = mpsc::channel(1);
        let token = self.token.child_token();
        let worker = Worker {
            slot: index,
            generation,
            task: Arc::clone(&self.task),
            rx,
            events: self.events_tx.clone(),
            token: token.clone(),
        };
        WorkerSlot {
            id: WorkerId(index),
            generation,
            state: WorkerState::Idle,
            completed: 0,
            current: None,
            tx,
            token,
            join: tokio::spawn(worker.run()),
        }
    }

    /// Tears down the slot at `index` and puts a fresh one in its place.
    ///
    /// Returns the task the old worker was running, if any.
    fn replace(&mut self, index: usize, reason: &str) -> Option<InFlight<O>> {
        let generation = self.slots[index].generation + 1;
        let job = self.slots[index].retire();
        let fresh = self.spawn_slot(index, generation);
        self.slots[index] = fresh;
        self.replacements += 1;

        tracing::debug!(pool = %self.name, worker = index, generation, reason, "worker replaced");
        self.bus.publish(
            Event::new(EventKind::WorkerReplaced)
                .with_source(Arc::clone(&self.name))
                .with_worker(index)
                .with_reason(reason),
        );
        job
    }

    /// Assigns queued tasks to idle slots, oldest task to the first idle slot.
    fn dispatch(&mut self) {
        while !self.queue.is_empty() {
            let Some(index) = self.slots.iter().position(|s| s.state == WorkerState::Idle) else {
                return;
            };
            let Some(task) = self.queue.pop_front() else {
                return;
            };
            let QueuedTask {
                id,
                input,
                timeout,
                enqueued,
                reply,
                credit,
                slot_permit,
            } = task;

            let assignment = Assignment { task_id: id, input };
            match self.slots[index].tx.try_send(assignment) {
                Ok(()) => {
                    drop(slot_permit);
                    let slot = &mut self.slots[index];
                    slot.state = WorkerState::Busy;
                    slot.current = Some(InFlight {
                        id,
                        reply,
                        credit,
                        deadline: Deadline::after(timeout),
                    });
                    self.bus.publish(
                        Event::new(EventKind::TaskDispatched)
                            .with_source(Arc::clone(&self.name))
                            .with_task_id(id.0)
                            .with_worker(index)
                            .with_timeout(enqueued.elapsed()),
                    );
                }
                Err(err) => {
                    let Assignment { input, .. } = err.into_inner();
                    self.queue.push_front(QueuedTask {
                        id,
                        input,
                        timeout,
                        enqueued,
                        reply,
                        credit,
                        slot_permit,
                    });
                    tracing::warn!(pool = %self.name, worker = index, "worker unreachable at dispatch");
                    // an idle slot holds no task
                    let _ = self.replace(index, "worker channel closed");
                }
            }
        }
    }

    /// Earliest deadline among in-flight tasks.
    fn next_deadline(&self) -> Option<Instant> {
        self.slots
            .iter()
            .filter_map(|s| s.current.as_ref()?.deadline)
            .map(|d| d.at)
            .min()
    }

    /// Fails every in-flight task whose deadline has passed and replaces its worker.
    fn expire_deadlines(&mut self) {
        let now = Instant::now();
        for index in 0..self.slots.len() {
            let Some(job) = &self.slots[index].current else {
                continue;
            };
            let Some(Deadline { timeout, .. }) = job.expired(now) else {
                continue;
            };
            let task_id = job.id;

            tracing::debug!(pool = %self.name, worker = index, task = %task_id, ?timeout, "task deadline hit");
            self.bus.publish(
                Event::new(EventKind::TimeoutHit)
                    .with_source(Arc::clone(&self.name))
                    .with_task_id(task_id.0)
                    .with_worker(index)
                    .with_timeout(timeout),
            );
            self.fail_current(
                index,
                task_id,
                PoolError::TaskTimeout { timeout },
                format!("timed out after {timeout:?}"),
            );
        }
    }

    /// Counts a failure of the slot's current task, replaces the worker and resolves the task.
    fn fail_current(&mut self, index: usize, task_id: TaskId, err: PoolError, reason: String) {
        self.failed += 1;
        self.bus.publish(
            Event::new(EventKind::TaskFailed)
                .with_source(Arc::clone(&self.name))
                .with_task_id(task_id.0)
                .with_worker(index)
                .with_reason(reason.as_str()),
        );
        if let Some(job) = self.replace(index, &reason) {
            job.resolve(Err(err));
        }
    }

    fn on_worker_event(&mut self, ev: WorkerEvent<O>) {
        self.expire_deadlines();

        let Some(slot) = self.slots.get_mut(ev.slot) else {
            return;
        };
        if slot.generation != ev.generation || slot.current.as_ref().map(|j| j.id) != Some(ev.task_id) {
            return;
        }
        let worker = slot.id;

        let (err, reason) = match ev.outcome {
            Outcome::Done(out) => {
                slot.state = WorkerState::Idle;
                slot.completed += 1;
                self.completed += 1;
                if let Some(job) = slot.current.take() {
                    job.resolve(Ok(out));
                }
                self.bus.publish(
                    Event::new(EventKind::TaskCompleted)
                        .with_source(Arc::clone(&self.name))
                        .with_task_id(ev.task_id.0)
                        .with_worker(ev.slot),
                );
                return;
            }
            Outcome::Failed(e) => {
                let msg = e.to_string();
                (
                    PoolError::WorkerError {
                        worker,
                        error: msg.clone(),
                    },
                    msg,
                )
            }
            Outcome::Panicked(msg) => {
                let msg = format!("panicked: {msg}");
                (
                    PoolError::WorkerError {
                        worker,
                        error: msg.clone(),
                    },
                    msg,
                )
            }
        };
        self.fail_current(ev.slot, ev.task_id, err, reason);
    }

    fn publish_stats(&self) {
        let busy = self
            .slots
            .iter()
            .filter(|s| s.state == WorkerState::Busy)
            .count();
        self.stats_tx.send_replace(PoolStats {
            total_workers: self.slots.len(),
            busy_workers: busy,
            queue_length: self.queue.len(),
            total_completed: self.completed,
            total_failed: self.failed,
            replacements: self.replacements,
        });
        self.workers_tx
            .send_replace(self.slots.iter().map(WorkerSlot::snapshot).collect());
    }

    /// Fails everything still pending and stops every worker.
    async fn teardown(mut self) {
        self.admission.close();
        if let Some(gate) = &self.credits {
            gate.close();
        }

        self.commands.close();
        while let Ok(Command::Submit(task)) = self.commands.try_recv() {
            self.queue.push_back(task);
        }
        let dropped = self.queue.len();
        for task in self.queue.drain(..) {
            drop(task.credit);
            let _ = task.reply.send(Err(PoolError::PoolDestroyed));
        }
        let mut interrupted = 0usize;
        for slot in &mut self.slots {
            if let Some(job) = slot.retire() {
                interrupted += 1;
                job.resolve(Err(PoolError::PoolDestroyed));
            }
        }
        self.slots.clear();
        self.publish_stats();

        tracing::debug!(pool = %self.name, dropped, interrupted, "pool destroyed");
        self.bus.publish(
            Event::new(EventKind::PoolDestroyed)
                .with_source(Arc::clone(&self.name))
                .with_reason(format!("{dropped} queued, {interrupted} running")),
        );

        if let Some((join, token)) = self.listener.take() {
            token.cancel();
            let _ = join.await;
        }
    }
}
