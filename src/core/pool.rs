//! # WorkerPool: bounded queue + fixed worker set behind one coordinator.
//!
//! The [`WorkerPool`] is the public face of the pool. Handles are cheap to
//! clone; all clones submit into the same queue.
//!
//! ## Submission path
//! ```text
//! submit(input)
//!   ├─► destroyed? ───────────────────────────► Err(PoolShutdown)
//!   ├─► credit gate (max_in_flight > 0)        (FIFO; credit held until the handle resolves)
//!   ├─► queue slot: Semaphore(queue_capacity)  (FIFO; bounded by submit_timeout ─► Err(QueueTimeout))
//!   └─► Command::Submit ──► Coordinator ──► dispatch ──► Worker
//!                                                          │
//!   TaskHandle ◄──────────── Result<O, PoolError> ◄────────┘
//! ```
//!
//! ## Destroy path
//! ```text
//! destroy()
//!   ├─► mark destroyed (later submits fail with PoolShutdown)
//!   ├─► close queue-slot semaphore and credit gate (parked submitters wake with PoolShutdown)
//!   ├─► cancel pool token ─► coordinator teardown:
//!   │       queued + in-flight tasks ─► Err(PoolDestroyed), workers aborted,
//!   │       PoolDestroyed event, subscriber listener flushed
//!   └─► wait until the coordinator is gone
//! ```
//! Dropping the last handle runs the same teardown without waiting for it.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//! use poolvisor::{PoolConfig, TaskError, TaskFn, WorkerPool};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let task = TaskFn::arc("square", |n: u64, _ctx: CancellationToken| async move {
//!         Ok::<_, TaskError>(n * n)
//!     });
//!     let pool = WorkerPool::new(task, PoolConfig { workers: 2, ..PoolConfig::default() });
//!
//!     let handle = pool.submit(7).await.unwrap();
//!     assert_eq!(handle.await, Ok(49));
//!
//!     pool.destroy().await;
//!     assert!(pool.submit(1).await.is_err());
//! }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Semaphore, TryAcquireError, broadcast, mpsc, oneshot, watch};
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use super::builder::PoolBuilder;
use super::config::PoolConfig;
use super::dispatcher::{Command, PoolStats, QueuedTask};
use super::handle::{SubmitOptions, TaskHandle, TaskId};
use super::slot::WorkerSnapshot;
use crate::backpressure::{CreditGate, CreditPermit, CreditStats};
use crate::error::{CreditError, PoolError};
use crate::events::{Bus, Event, EventKind};
use crate::tasks::TaskRef;

/// State shared by every clone of a pool handle.
pub(super) struct PoolShared<I, O> {
    pub name: Arc<str>,
    pub cfg: PoolConfig,
    pub bus: Bus,
    pub token: CancellationToken,
    pub admission: Arc<Semaphore>,
    pub credits: Option<CreditGate>,
    pub commands: mpsc::UnboundedSender<Command<I, O>>,
    pub stats: watch::Receiver<PoolStats>,
    pub workers: watch::Receiver<Vec<WorkerSnapshot>>,
    pub destroyed: AtomicBool,
    pub next_id: AtomicU64,
}

impl<I, O> Drop for PoolShared<I, O> {
    fn drop(&mut self) {
        self.admission.close();
        self.token.cancel();
    }
}

/// Fixed-size worker pool fed from a bounded FIFO queue.
pub struct WorkerPool<I, O> {
    shared: Arc<PoolShared<I, O>>,
}

impl<I, O> Clone for WorkerPool<I, O> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<I, O> std::fmt::Debug for WorkerPool<I, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.shared.name)
            .field("stats", &*self.shared.stats.borrow())
            .finish()
    }
}

impl<I, O> WorkerPool<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    /// Returns a builder for a pool running `task`.
    pub fn builder(task: TaskRef<I, O>) -> PoolBuilder<I, O> {
        PoolBuilder::new(task)
    }

    /// Creates a pool without subscribers. Must be called inside a tokio runtime.
    pub fn new(task: TaskRef<I, O>, cfg: PoolConfig) -> Self {
        PoolBuilder::new(task).with_config(cfg).build()
    }

    pub(super) fn from_shared(shared: Arc<PoolShared<I, O>>) -> Self {
        Self { shared }
    }

    /// Submits a task with the pool's default deadline.
    ///
    /// Waits while the queue is full (up to `submit_timeout`) and while no
    /// credit is free (when `max_in_flight` is set).
    pub async fn submit(&self, input: I) -> Result<TaskHandle<O>, PoolError> {
        self.submit_with(input, SubmitOptions::default()).await
    }

    /// Submits a task with per-task options.
    pub async fn submit_with(&self, input: I, opts: SubmitOptions) -> Result<TaskHandle<O>, PoolError> {
        self.ensure_active()?;
        let credit = match &self.shared.credits {
            Some(gate) => Some(gate.acquire().await.map_err(|_| PoolError::PoolShutdown)?),
            None => None,
        };
        let slot_permit = self.acquire_slot().await?;
        self.enqueue(input, opts, credit, slot_permit)
    }

    /// Submits without waiting; fails with [`PoolError::QueueFull`] when the
    /// queue (or the credit gate) has no room.
    pub fn try_submit(&self, input: I) -> Result<TaskHandle<O>, PoolError> {
        self.ensure_active()?;
        let credit = match &self.shared.credits {
            Some(gate) => Some(gate.try_acquire().map_err(|e| match e {
                CreditError::Closed => PoolError::PoolShutdown,
                _ => PoolError::QueueFull,
            })?),
            None => None,
        };
        let slot_permit = Arc::clone(&self.shared.admission)
            .try_acquire_owned()
            .map_err(|e| match e {
                TryAcquireError::NoPermits => PoolError::QueueFull,
                TryAcquireError::Closed => PoolError::PoolShutdown,
            })?;
        self.enqueue(input, SubmitOptions::default(), credit, slot_permit)
    }

    /// Submits a task and waits for its result.
    pub async fn execute(&self, input: I) -> Result<O, PoolError> {
        self.submit(input).await?.await
    }

    /// Returns the latest counters snapshot (non-blocking).
    pub fn stats(&self) -> PoolStats {
        *self.shared.stats.borrow()
    }

    /// Returns a receiver notified on every counters change.
    pub fn watch_stats(&self) -> watch::Receiver<PoolStats> {
        self.shared.stats.clone()
    }

    /// Returns per-slot state, in slot order.
    pub fn worker_stats(&self) -> Vec<WorkerSnapshot> {
        self.shared.workers.borrow().clone()
    }

    /// Returns the credit gate counters when `max_in_flight` is set.
    pub fn credit_stats(&self) -> Option<CreditStats> {
        self.shared.credits.as_ref().map(CreditGate::stats)
    }

    /// Subscribes to the pool's runtime events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.shared.bus.subscribe()
    }

    /// Returns the pool name used as event source.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Returns the configuration the pool was built with.
    pub fn config(&self) -> &PoolConfig {
        &self.shared.cfg
    }

    /// Returns `true` once [`destroy`](Self::destroy) was called.
    pub fn is_destroyed(&self) -> bool {
        self.shared.destroyed.load(Ordering::Acquire)
    }

    /// Shuts the pool down immediately. Idempotent.
    ///
    /// Queued and running tasks fail with [`PoolError::PoolDestroyed`]; parked
    /// and later submissions fail with [`PoolError::PoolShutdown`]. Returns
    /// once the coordinator has finished its teardown.
    pub async fn destroy(&self) {
        if !self.shared.destroyed.swap(true, Ordering::AcqRel) {
            self.shared.admission.close();
            if let Some(gate) = &self.shared.credits {
                gate.close();
            }
            self.shared.token.cancel();
        }
        let mut stats = self.shared.stats.clone();
        while stats.changed().await.is_ok() {}
    }

    fn ensure_active(&self) -> Result<(), PoolError> {
        if self.is_destroyed() {
            Err(PoolError::PoolShutdown)
        } else {
            Ok(())
        }
    }

    async fn acquire_slot(&self) -> Result<tokio::sync::OwnedSemaphorePermit, PoolError> {
        let admission = Arc::clone(&self.shared.admission);
        match self.shared.cfg.submit_wait() {
            None => admission
                .acquire_owned()
                .await
                .map_err(|_| PoolError::PoolShutdown),
            Some(wait) => match time::timeout(wait, admission.acquire_owned()).await {
                Ok(Ok(permit)) => Ok(permit),
                Ok(Err(_closed)) => Err(PoolError::PoolShutdown),
                Err(_elapsed) => {
                    self.publish_queue_timeout(wait);
                    Err(PoolError::QueueTimeout { waited: wait })
                }
            },
        }
    }

    fn enqueue(
        &self,
        input: I,
        opts: SubmitOptions,
        credit: Option<CreditPermit>,
        slot_permit: tokio::sync::OwnedSemaphorePermit,
    ) -> Result<TaskHandle<O>, PoolError> {
        let id = TaskId(self.shared.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let timeout = match opts.timeout {
            Some(d) if d == Duration::ZERO => None,
            Some(d) => Some(d),
            None => self.shared.cfg.default_timeout(),
        };
        let (reply, rx) = oneshot::channel();
        let task = QueuedTask {
            id,
            input,
            timeout,
            enqueued: Instant::now(),
            reply,
            credit,
            slot_permit,
        };
        if self.shared.commands.is_closed() {
            return Err(PoolError::PoolShutdown);
        }
        // TaskSubmitted must precede the task's TaskDispatched
        self.shared.bus.publish(
            Event::new(EventKind::TaskSubmitted)
                .with_source(Arc::clone(&self.shared.name))
                .with_task_id(id.0),
        );
        self.shared
            .commands
            .send(Command::Submit(task))
            .map_err(|_| PoolError::PoolShutdown)?;
        Ok(TaskHandle::new(id, rx))
    }

    fn publish_queue_timeout(&self, wait: Duration) {
        self.shared.bus.publish(
            Event::new(EventKind::QueueTimeout)
                .with_source(Arc::clone(&self.shared.name))
                .with_timeout(wait),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TaskError;
    use crate::tasks::TaskFn;

    fn sleeper() -> TaskRef<u64, u64> {
        TaskFn::arc("sleeper", |ms: u64, _ctx: CancellationToken| async move {
            time::sleep(Duration::from_millis(ms)).await;
            Ok::<_, TaskError>(ms)
        })
    }

    fn cfg(workers: usize, queue_capacity: usize) -> PoolConfig {
        PoolConfig {
            workers,
            queue_capacity,
            ..PoolConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn submit_timeout_when_queue_stays_full() {
        let pool = WorkerPool::new(
            sleeper(),
            PoolConfig {
                submit_timeout: Duration::from_millis(20),
                ..cfg(1, 1)
            },
        );
        let running = pool.submit(1_000).await.unwrap();
        // let the coordinator move it to the worker, freeing the queue slot
        while pool.stats().busy_workers == 0 {
            tokio::task::yield_now().await;
        }
        let _queued = pool.submit(1_000).await.unwrap();
        let err = pool.submit(1_000).await.unwrap_err();
        assert_eq!(
            err,
            PoolError::QueueTimeout {
                waited: Duration::from_millis(20)
            }
        );
        assert!(err.is_retryable());
        assert_eq!(running.await, Ok(1_000));
    }

    #[tokio::test(start_paused = true)]
    async fn try_submit_reports_full_queue() {
        let pool = WorkerPool::new(sleeper(), cfg(1, 1));
        let _a = pool.try_submit(100).unwrap();
        assert_eq!(pool.try_submit(100).unwrap_err(), PoolError::QueueFull);
    }

    #[tokio::test(start_paused = true)]
    async fn per_task_timeout_overrides_default() {
        let pool = WorkerPool::new(sleeper(), cfg(1, 4));
        let h = pool
            .submit_with(500, SubmitOptions::with_timeout(Duration::from_millis(50)))
            .await
            .unwrap();
        assert_eq!(
            h.await,
            Err(PoolError::TaskTimeout {
                timeout: Duration::from_millis(50)
            })
        );
        assert_eq!(pool.execute(10).await, Ok(10));
    }

    #[tokio::test(start_paused = true)]
    async fn credit_gate_bounds_unresolved_tasks() {
        let pool = WorkerPool::new(
            sleeper(),
            PoolConfig {
                max_in_flight: 2,
                ..cfg(4, 8)
            },
        );
        let a = pool.submit(100).await.unwrap();
        let b = pool.submit(100).await.unwrap();
        assert_eq!(pool.try_submit(100).unwrap_err(), PoolError::QueueFull);
        assert_eq!(pool.credit_stats().map(|s| s.in_flight), Some(2));

        assert_eq!(a.await, Ok(100));
        assert_eq!(b.await, Ok(100));
        assert_eq!(pool.credit_stats().map(|s| s.in_flight), Some(0));
    }

    #[tokio::test]
    async fn dropping_last_handle_fails_pending_tasks() {
        let pool = WorkerPool::new(sleeper(), cfg(1, 4));
        let running = pool.submit(60_000).await.unwrap();
        let queued = pool.submit(60_000).await.unwrap();
        drop(pool);
        assert_eq!(running.await, Err(PoolError::PoolDestroyed));
        assert_eq!(queued.await, Err(PoolError::PoolDestroyed));
    }

    #[tokio::test]
    async fn submitted_is_published_before_dispatched() {
        let pool = WorkerPool::new(sleeper(), cfg(2, 8));
        let mut events = pool.subscribe();
        let mut handles = Vec::new();
        for _ in 0..6 {
            handles.push(pool.submit(0).await.unwrap());
        }
        for h in handles {
            assert_eq!(h.await, Ok(0));
        }

        let mut seen = Vec::new();
        while let Ok(ev) = events.try_recv() {
            if ev.kind == EventKind::TaskDispatched {
                assert!(ev.timeout_ms.is_some(), "dispatch carries queue wait");
            }
            if matches!(ev.kind, EventKind::TaskSubmitted | EventKind::TaskDispatched) {
                seen.push((ev.task_id, ev.kind));
            }
        }
        for id in 1..=6u64 {
            let kinds: Vec<_> = seen
                .iter()
                .filter(|(t, _)| *t == Some(id))
                .map(|(_, k)| *k)
                .collect();
            assert_eq!(kinds, vec![EventKind::TaskSubmitted, EventKind::TaskDispatched], "task {id}");
        }
        pool.destroy().await;
    }

    #[tokio::test]
    async fn ids_increase() {
        let pool = WorkerPool::new(sleeper(), cfg(1, 4));
        let a = pool.submit(0).await.unwrap();
        let b = pool.submit(0).await.unwrap();
        assert!(a.id() < b.id());
        pool.destroy().await;
    }
}
