//! Error types used by the pool, the credit gate, the pipeline and user tasks.
//!
//! This module defines the main error enums:
//!
//! - [`TaskError`] errors returned by user [`Task`](crate::Task) implementations.
//! - [`PoolError`] errors delivered to callers of [`WorkerPool`](crate::WorkerPool).
//! - [`CreditError`] errors from the credit gate ([`CreditGate`](crate::CreditGate)).
//! - [`PipelineError`] errors delivered to callers of [`Pipeline`](crate::Pipeline).
//!
//! Bounded queue errors live next to the queue in [`crate::queue`].
//!
//! Every enum exposes `as_label()` returning a stable snake_case label for logs.

use std::time::Duration;
use thiserror::Error;

use crate::core::WorkerId;

/// # Errors produced by task execution.
///
/// Returned by [`Task::spawn`](crate::Task::spawn) futures. The pool treats
/// every variant as a worker failure: the task's caller receives
/// [`PoolError::WorkerError`] (or [`PoolError::TaskTimeout`]) and the worker
/// that ran it is replaced.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// Task execution exceeded its timeout duration.
    #[error("timed out after {timeout:?}")]
    Timeout {
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// Task execution failed.
    #[error("execution failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Task observed cancellation and gave up.
    #[error("context cancelled")]
    Canceled,
}

impl TaskError {
    /// Shorthand for [`TaskError::Fail`].
    pub fn fail(error: impl Into<String>) -> Self {
        TaskError::Fail {
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use poolvisor::TaskError;
    /// use std::time::Duration;
    ///
    /// let err = TaskError::Timeout { timeout: Duration::from_secs(1) };
    /// assert_eq!(err.as_label(), "task_timeout");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskError::Timeout { .. } => "task_timeout",
            TaskError::Fail { .. } => "task_failed",
            TaskError::Canceled => "task_canceled",
        }
    }
}

/// # Errors delivered by the worker pool.
///
/// Every submitted task resolves to either its output or exactly one of these.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// The task queue stayed full for the whole submission wait bound.
    #[error("task queue full for {waited:?}")]
    QueueTimeout {
        /// How long the submitter waited.
        waited: Duration,
    },

    /// The task queue was full and the caller asked not to wait.
    #[error("task queue full")]
    QueueFull,

    /// The task did not complete within its deadline; its worker was replaced.
    #[error("task timed out after {timeout:?}")]
    TaskTimeout {
        /// The deadline that was exceeded.
        timeout: Duration,
    },

    /// The worker running the task failed; the worker was replaced.
    #[error("{worker} failed: {error}")]
    WorkerError {
        /// Worker that ran the task.
        worker: WorkerId,
        /// Failure reason (task error or panic message).
        error: String,
    },

    /// The pool is destroyed and accepts no more submissions.
    #[error("pool is shut down")]
    PoolShutdown,

    /// The pool was destroyed while the task was queued or running.
    #[error("pool destroyed before the task completed")]
    PoolDestroyed,
}

impl PoolError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use poolvisor::PoolError;
    ///
    /// assert_eq!(PoolError::PoolShutdown.as_label(), "pool_shutdown");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            PoolError::QueueTimeout { .. } => "queue_timeout",
            PoolError::QueueFull => "queue_full",
            PoolError::TaskTimeout { .. } => "task_timeout",
            PoolError::WorkerError { .. } => "worker_error",
            PoolError::PoolShutdown => "pool_shutdown",
            PoolError::PoolDestroyed => "pool_destroyed",
        }
    }

    /// Indicates whether the caller may simply submit again.
    ///
    /// Only admission failures are retryable; nothing inside the pool retries.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PoolError::QueueTimeout { .. } | PoolError::QueueFull)
    }

    /// Indicates the pool is gone for good.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PoolError::PoolShutdown | PoolError::PoolDestroyed)
    }
}

/// # Errors produced by the credit gate.
#[non_exhaustive]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditError {
    /// No credit is available right now (non-waiting acquire).
    #[error("no credits available")]
    Exhausted,

    /// No credit became available within the wait bound.
    #[error("no credit within {waited:?}")]
    Timeout {
        /// How long the caller waited.
        waited: Duration,
    },

    /// The gate was closed.
    #[error("credit gate closed")]
    Closed,
}

impl CreditError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            CreditError::Exhausted => "credit_exhausted",
            CreditError::Timeout { .. } => "credit_timeout",
            CreditError::Closed => "credit_closed",
        }
    }
}

/// # Errors delivered by the pipeline.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// A stage failed for this request; later stages were skipped.
    #[error("stage '{stage}' failed: {error}")]
    Stage {
        /// Name of the failing stage.
        stage: String,
        /// Failure reason.
        error: String,
    },

    /// The pipeline was terminated before the request reached the sink.
    #[error("pipeline terminated")]
    Terminated,
}

impl PipelineError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            PipelineError::Stage { .. } => "stage_failed",
            PipelineError::Terminated => "pipeline_terminated",
        }
    }
}
