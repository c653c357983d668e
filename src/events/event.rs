//! # Runtime events emitted by pools, credit gates and pipelines.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Pool events**: task flow through the queue and workers (submitted, dispatched, completed, failed)
//! - **Credit events**: admission deferrals and ceiling changes
//! - **Pipeline events**: stage failures and teardown
//! - **Subscriber events**: overflow and panics inside subscriber workers
//!
//! The [`Event`] struct carries additional metadata such as timestamps, the
//! emitting component, task/request id, worker index and reasons.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use poolvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::TaskFailed)
//!     .with_source("resize-pool")
//!     .with_task_id(7)
//!     .with_worker(1)
//!     .with_reason("boom")
//!     .with_timeout(Duration::from_secs(5));
//!
//! assert_eq!(ev.kind, EventKind::TaskFailed);
//! assert_eq!(ev.source.as_deref(), Some("resize-pool"));
//! assert_eq!(ev.reason.as_deref(), Some("boom"));
//! assert_eq!(ev.timeout_ms, Some(5_000));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `source`: subscriber name
    /// - `reason`: panic info/message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `source`: subscriber name
    /// - `reason`: reason string (e.g., "full", "closed")
    SubscriberOverflow,

    // === Pool events ===
    /// Task accepted into the pool queue.
    ///
    /// Sets:
    /// - `source`: pool name
    /// - `task_id`: submitted task id
    TaskSubmitted,

    /// Task handed to an idle worker.
    ///
    /// Sets:
    /// - `source`: pool name
    /// - `task_id`: task id
    /// - `worker`: worker index
    /// - `timeout_ms`: time the task spent queued
    TaskDispatched,

    /// Task finished successfully.
    ///
    /// Sets:
    /// - `source`: pool name
    /// - `task_id`: task id
    /// - `worker`: worker index
    TaskCompleted,

    /// Task failed (execution error, panic, timeout or shutdown).
    ///
    /// Sets:
    /// - `source`: pool name
    /// - `task_id`: task id
    /// - `worker`: worker index, absent if the task never left the queue
    /// - `reason`: failure label/message
    TaskFailed,

    /// Task exceeded its deadline (always followed by `TaskFailed`).
    ///
    /// Sets:
    /// - `source`: pool name
    /// - `task_id`: task id
    /// - `worker`: worker index
    /// - `timeout_ms`: the deadline (ms)
    TimeoutHit,

    /// Submission gave up waiting for queue space.
    ///
    /// Sets:
    /// - `source`: pool name
    /// - `timeout_ms`: how long the submitter waited (ms)
    QueueTimeout,

    /// A failed worker was torn down and a fresh one took its slot.
    ///
    /// Sets:
    /// - `source`: pool name
    /// - `worker`: slot index
    /// - `reason`: why the old worker was discarded
    WorkerReplaced,

    /// Pool reached its terminal state.
    ///
    /// Sets:
    /// - `source`: pool name
    PoolDestroyed,

    // === Credit events ===
    /// Admission request parked because no credit was available.
    ///
    /// Sets:
    /// - `source`: gate name
    CreditDeferred,

    /// Adaptive ceiling moved by one.
    ///
    /// Sets:
    /// - `source`: gate name
    /// - `ceiling`: new ceiling
    /// - `reason`: "raised" or "lowered"
    CeilingAdjusted,

    // === Pipeline events ===
    /// A stage failed for one request; the request skips the rest of the chain.
    ///
    /// Sets:
    /// - `source`: stage name
    /// - `task_id`: request id
    /// - `reason`: failure message
    StageFailed,

    /// Pipeline torn down; outstanding requests were failed.
    ///
    /// Sets:
    /// - `source`: pipeline name
    PipelineTerminated,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Emitting component (pool, gate, stage, pipeline or subscriber name).
    pub source: Option<Arc<str>>,
    /// Task id (pool) or request id (pipeline).
    pub task_id: Option<u64>,
    /// Worker slot index.
    pub worker: Option<usize>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
    /// Timeout or wait duration in milliseconds (compact).
    pub timeout_ms: Option<u32>,
    /// Credit ceiling after an adjustment.
    pub ceiling: Option<usize>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            source: None,
            task_id: None,
            worker: None,
            reason: None,
            timeout_ms: None,
            ceiling: None,
        }
    }

    /// Attaches the emitting component name.
    #[inline]
    pub fn with_source(mut self, source: impl Into<Arc<str>>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Attaches a task or request id.
    #[inline]
    pub fn with_task_id(mut self, id: u64) -> Self {
        self.task_id = Some(id);
        self
    }

    /// Attaches a worker slot index.
    #[inline]
    pub fn with_worker(mut self, worker: usize) -> Self {
        self.worker = Some(worker);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a timeout duration (stored as milliseconds).
    #[inline]
    pub fn with_timeout(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.timeout_ms = Some(ms);
        self
    }

    /// Attaches a credit ceiling.
    #[inline]
    pub fn with_ceiling(mut self, ceiling: usize) -> Self {
        self.ceiling = Some(ceiling);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_source(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_source(subscriber)
            .with_reason(info)
    }
}
