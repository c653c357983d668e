//! # poolvisor
//!
//! **Poolvisor** is an in-process worker pool for tokio with bounded queues,
//! credit-based backpressure and pipelined stages.
//!
//! It provides three building blocks that compose freely: a fixed-size
//! [`WorkerPool`] fed FIFO from a bounded task queue, a [`CreditGate`] that caps
//! in-flight work (optionally adapting its ceiling to observed latency), and a
//! [`Pipeline`] of typed stages linked by [`BoundedQueue`]s.
//!
//! ## Architecture
//! ### Worker pool
//! ```text
//!   submit(input) ──► [CreditGate] ──► queue slot (Semaphore) ──► Command::Submit
//!                     (optional)        (submit_timeout)               │
//!                                                                      ▼
//! ┌───────────────────────────────────────────────────────────────────────────┐
//! │  Coordinator (one task per pool)                                          │
//! │  - VecDeque<QueuedTask>      FIFO queue                                   │
//! │  - Vec<WorkerSlot>           Idle | Busy | Failed, replaced in place      │
//! │  - counters ──► watch::Sender<PoolStats>                                  │
//! └──────┬──────────────────┬──────────────────┬──────────────────────────────┘
//!        ▼ Assignment       ▼                  ▼
//!   ┌──────────┐       ┌──────────┐       ┌──────────┐
//!   │ worker-0 │       │ worker-1 │  ...  │ worker-N │   timeout + catch_unwind
//!   └────┬─────┘       └────┬─────┘       └────┬─────┘
//!        └── WorkerEvent{slot, generation, outcome} ──► Coordinator
//!                                                        ├─ Done   ─► resolve Ok, slot Idle
//!                                                        └─ failed ─► resolve Err, replace slot
//! ```
//!
//! ### Events
//! ```text
//! Coordinator / CreditGate / StageRunner ── publish(Event) ──► Bus (broadcast)
//!                                                               │
//!                                                               ▼
//!                                                         listener task
//!                                                               │
//!                                                               ▼
//!                                                         SubscriberSet
//!                                                     ┌─────────┼─────────┐
//!                                                     ▼         ▼         ▼
//!                                                   sub1      sub2      subN   (bounded queue each)
//! ```
//!
//! ## Features
//! | Area              | Description                                                      | Key types / traits                                |
//! |-------------------|------------------------------------------------------------------|---------------------------------------------------|
//! | **Pool**          | Fixed worker set, FIFO dispatch, per-task deadline, replacement. | [`WorkerPool`], [`PoolConfig`], [`TaskHandle`]    |
//! | **Backpressure**  | Credit gate with FIFO deferral and adaptive ceiling.             | [`CreditGate`], [`CreditConfig`], [`AdaptiveConfig`] |
//! | **Pipeline**      | Typed stage chain over bounded queues with a keyed sink.         | [`Pipeline`], [`StageSpec`], [`PipelineConfig`]   |
//! | **Queue**         | Bounded FIFO with parked producers/consumers and hand-off.       | [`BoundedQueue`]                                  |
//! | **Subscriber API**| Hook into runtime events (logging, metrics, custom subscribers). | [`Subscribe`]                                     |
//! | **Errors**        | Typed errors per component.                                      | [`PoolError`], [`CreditError`], [`PipelineError`] |
//! | **Tasks**         | Define work as functions or trait objects.                       | [`Task`], [`TaskFn`], [`TaskRef`]                 |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] subscriber rendering events through `tracing`.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//! use poolvisor::{PoolConfig, PoolError, SubmitOptions, TaskError, TaskFn, TaskRef, WorkerPool};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), PoolError> {
//!     // Build subscribers (optional)
//!     #[cfg(feature = "logging")]
//!     let subs: Vec<Arc<dyn poolvisor::Subscribe>> = vec![Arc::new(poolvisor::LogWriter::default())];
//!     #[cfg(not(feature = "logging"))]
//!     let subs: Vec<Arc<dyn poolvisor::Subscribe>> = Vec::new();
//!
//!     let resize: TaskRef<u32, u32> = TaskFn::arc("resize", |px: u32, _ctx: CancellationToken| async move {
//!         Ok::<_, TaskError>(px / 2)
//!     });
//!
//!     let pool = WorkerPool::builder(resize)
//!         .with_config(PoolConfig { workers: 2, queue_capacity: 8, ..PoolConfig::default() })
//!         .with_subscribers(subs)
//!         .build();
//!
//!     let a = pool.submit(640).await?;
//!     let b = pool
//!         .submit_with(480, SubmitOptions::with_timeout(Duration::from_secs(1)))
//!         .await?;
//!     assert_eq!(a.await?, 320);
//!     assert_eq!(b.await?, 240);
//!
//!     pool.destroy().await;
//!     Ok(())
//! }
//! ```
mod backpressure;
mod core;
mod error;
mod events;
mod pipeline;
mod queue;
mod subscribers;
mod tasks;

// ---- Public re-exports ----

pub use backpressure::{AdaptiveConfig, CreditConfig, CreditGate, CreditPermit, CreditStats};
pub use crate::core::{
    PoolBuilder, PoolConfig, PoolStats, SubmitOptions, TaskHandle, TaskId, WorkerId, WorkerPool,
    WorkerSnapshot, WorkerState,
};
pub use error::{CreditError, PipelineError, PoolError, TaskError};
pub use events::{Bus, Event, EventKind};
pub use pipeline::{Pipeline, PipelineBuilder, PipelineConfig, PipelineStats, RequestId, StageSpec, StageStats};
pub use queue::{BoundedQueue, QueueError, TakeError};
pub use subscribers::{Subscribe, SubscriberSet};
pub use tasks::{BoxTaskFuture, Task, TaskFn, TaskRef};

// Optional: expose a simple built-in logger subscriber.
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
