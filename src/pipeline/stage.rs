//! # Stage runners.
//!
//! Each stage runs `workers` identical runner tasks sharing one input queue
//! and one output queue:
//!
//! ```text
//! loop {
//!   take(input)                       (parks while empty; Closed ─► exit)
//!   task.spawn(value, child token)    (panic isolated)
//!     ├─ Ok(v)  ─► put(output, Envelope{id, v})   (parks while full ─► backpressure)
//!     └─ Err(e) ─► sink.fail(id, Stage{stage, e}) + StageFailed event
//! }
//! ```
//!
//! Runners stop when the pipeline token is cancelled or a queue closes.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use super::sink::{Envelope, ErrorSink};
use crate::error::PipelineError;
use crate::events::{Bus, Event, EventKind};
use crate::queue::BoundedQueue;
use crate::subscribers::panic_message;
use crate::tasks::TaskRef;

/// Type-erased view of a queue, for teardown and stats.
pub(crate) trait QueueProbe: Send + Sync + 'static {
    fn len(&self) -> usize;
    fn capacity(&self) -> usize;
    fn close(&self);
}

impl<T: Send + 'static> QueueProbe for BoundedQueue<T> {
    fn len(&self) -> usize {
        BoundedQueue::len(self)
    }

    fn capacity(&self) -> usize {
        BoundedQueue::capacity(self)
    }

    fn close(&self) {
        BoundedQueue::close(self)
    }
}

/// Counters of one stage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StageStats {
    /// Stage (task) name.
    pub name: String,
    /// Runner tasks.
    pub workers: usize,
    /// Items buffered in the stage's input queue.
    pub depth: usize,
    /// Capacity of the stage's input queue.
    pub capacity: usize,
    /// Items the stage passed on.
    pub processed: u64,
    /// Items the stage failed.
    pub failed: u64,
}

/// Shared per-stage bookkeeping.
pub(crate) struct StageState {
    pub name: Arc<str>,
    pub workers: usize,
    pub input: Arc<dyn QueueProbe>,
    pub processed: AtomicU64,
    pub failed: AtomicU64,
}

impl StageState {
    pub fn stats(&self) -> StageStats {
        StageStats {
            name: self.name.to_string(),
            workers: self.workers,
            depth: self.input.len(),
            capacity: self.input.capacity(),
            processed: self.processed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Everything a runner needs at launch time.
#[derive(Clone)]
pub(crate) struct StageCtx {
    pub bus: Bus,
    pub token: CancellationToken,
    pub errors: Arc<dyn ErrorSink>,
}

/// One runner of a stage.
pub(crate) async fn run_stage<A, B>(
    state: Arc<StageState>,
    task: TaskRef<A, B>,
    input: BoundedQueue<Envelope<A>>,
    output: BoundedQueue<Envelope<B>>,
    ctx: StageCtx,
) where
    A: Send + 'static,
    B: Send + 'static,
{
    loop {
        let env = tokio::select! {
            biased;
            _ = ctx.token.cancelled() => break,
            next = input.take() => match next {
                Ok(env) => env,
                Err(_) => break,
            },
        };
        let id = env.id;

        let child = ctx.token.child_token();
        let attempt = AssertUnwindSafe(async { task.spawn(env.value, child).await }).catch_unwind();
        let res = tokio::select! {
            biased;
            _ = ctx.token.cancelled() => break,
            res = attempt => res,
        };

        let error = match res {
            Ok(Ok(value)) => {
                state.processed.fetch_add(1, Ordering::Relaxed);
                let sent = tokio::select! {
                    biased;
                    _ = ctx.token.cancelled() => break,
                    sent = output.put(Envelope { id, value }) => sent,
                };
                if sent.is_err() {
                    break;
                }
                continue;
            }
            Ok(Err(e)) => e.to_string(),
            Err(panic) => format!("panicked: {}", panic_message(&*panic)),
        };

        state.failed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(stage = %state.name, request = %id, error = %error, "stage failed");
        ctx.bus.publish(
            Event::new(EventKind::StageFailed)
                .with_source(Arc::clone(&state.name))
                .with_task_id(id.0)
                .with_reason(error.as_str()),
        );
        ctx.errors.fail(
            id,
            PipelineError::Stage {
                stage: state.name.to_string(),
                error,
            },
        );
    }
}
