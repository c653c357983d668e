//! # LogWriter: events rendered through `tracing`
//!
//! A minimal subscriber that turns incoming [`Event`]s into `tracing` records.
//! Failures and replacements are logged at `warn`, everything else at `debug`
//! or `info`. Install any `tracing` subscriber to see the output.
//!
//! ## Example output (fmt subscriber)
//! ```text
//! DEBUG poolvisor: dispatched source="thumbs" task=3 worker=1
//!  WARN poolvisor: timeout source="thumbs" task=4 worker=0 timeout_ms=100
//!  WARN poolvisor: task failed source="thumbs" task=4 worker=Some(0) reason="timed out after 100ms"
//!  WARN poolvisor: worker replaced source="thumbs" worker=0 reason="timed out after 100ms"
//!  INFO poolvisor: pool destroyed source="thumbs"
//! ```

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;
use async_trait::async_trait;
use tracing::{debug, info, warn};

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let source = e.source.as_deref().unwrap_or("-");
        match e.kind {
            EventKind::TaskSubmitted => {
                debug!(target: "poolvisor", source, task = e.task_id, "submitted");
            }
            EventKind::TaskDispatched => {
                debug!(
                    target: "poolvisor",
                    source,
                    task = e.task_id,
                    worker = e.worker,
                    queued_ms = e.timeout_ms,
                    "dispatched"
                );
            }
            EventKind::TaskCompleted => {
                debug!(target: "poolvisor", source, task = e.task_id, worker = e.worker, "completed");
            }
            EventKind::TaskFailed => {
                warn!(
                    target: "poolvisor",
                    source,
                    task = e.task_id,
                    worker = ?e.worker,
                    reason = e.reason.as_deref(),
                    "task failed"
                );
            }
            EventKind::TimeoutHit => {
                warn!(
                    target: "poolvisor",
                    source,
                    task = e.task_id,
                    worker = e.worker,
                    timeout_ms = e.timeout_ms,
                    "timeout"
                );
            }
            EventKind::QueueTimeout => {
                warn!(target: "poolvisor", source, waited_ms = e.timeout_ms, "queue full, submission rejected");
            }
            EventKind::WorkerReplaced => {
                warn!(
                    target: "poolvisor",
                    source,
                    worker = e.worker,
                    reason = e.reason.as_deref(),
                    "worker replaced"
                );
            }
            EventKind::PoolDestroyed => {
                info!(target: "poolvisor", source, "pool destroyed");
            }
            EventKind::CreditDeferred => {
                debug!(target: "poolvisor", source, "admission deferred");
            }
            EventKind::CeilingAdjusted => {
                info!(
                    target: "poolvisor",
                    source,
                    ceiling = e.ceiling,
                    direction = e.reason.as_deref(),
                    "credit ceiling adjusted"
                );
            }
            EventKind::StageFailed => {
                warn!(
                    target: "poolvisor",
                    stage = source,
                    request = e.task_id,
                    reason = e.reason.as_deref(),
                    "stage failed"
                );
            }
            EventKind::PipelineTerminated => {
                info!(target: "poolvisor", source, "pipeline terminated");
            }
            EventKind::SubscriberOverflow => {
                warn!(target: "poolvisor", subscriber = source, reason = e.reason.as_deref(), "subscriber overflow");
            }
            EventKind::SubscriberPanicked => {
                warn!(target: "poolvisor", subscriber = source, info = e.reason.as_deref(), "subscriber panicked");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
