//! # Pool configuration.
//!
//! Provides [`PoolConfig`], the settings of one [`WorkerPool`](crate::WorkerPool).
//!
//! ## Sentinel values
//! - `workers = 0` → available hardware parallelism (min 1)
//! - `task_timeout = 0s` → no per-task deadline
//! - `submit_timeout = 0s` → submitters wait for a queue slot without bound
//! - `max_in_flight = 0` → no credit gate in front of the queue

use std::time::Duration;

/// Configuration for a worker pool.
///
/// ## Field semantics
/// - `workers`: Number of worker slots (`0` = hardware parallelism)
/// - `queue_capacity`: Tasks that may wait for a worker (min 1)
/// - `task_timeout`: Default per-task deadline (`0s` = none)
/// - `submit_timeout`: Wait bound for a queue slot (`0s` = unbounded)
/// - `max_in_flight`: Credits for queued plus running tasks (`0` = no gate)
/// - `bus_capacity`: Event bus ring buffer size (min 1; clamped by Bus)
///
/// ## Notes
/// All fields are public. Prefer the helper accessors over sentinel checks.
#[derive(Clone, Debug)]
pub struct PoolConfig {
    /// Number of worker slots kept alive for the pool's lifetime.
    pub workers: usize,

    /// Maximum number of tasks waiting in the queue.
    ///
    /// Submitters park (FIFO) while the queue is at capacity.
    pub queue_capacity: usize,

    /// Default deadline for one task execution.
    ///
    /// Overridden per task with [`SubmitOptions`](crate::SubmitOptions).
    pub task_timeout: Duration,

    /// How long `submit` waits for a queue slot before failing with
    /// [`PoolError::QueueTimeout`](crate::PoolError::QueueTimeout).
    pub submit_timeout: Duration,

    /// Upper bound on tasks admitted but not yet resolved.
    ///
    /// When non-zero, a [`CreditGate`](crate::CreditGate) sits in front of the queue
    /// and each task holds one credit until its handle resolves.
    pub max_in_flight: usize,

    /// Capacity of the event bus broadcast channel.
    pub bus_capacity: usize,
}

impl PoolConfig {
    /// Returns the number of worker slots to create.
    ///
    /// `0` resolves to [`std::thread::available_parallelism`], falling back to 1.
    #[inline]
    pub fn worker_count(&self) -> usize {
        match self.workers {
            0 => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            n => n,
        }
    }

    /// Returns the queue capacity clamped to a minimum of 1.
    #[inline]
    pub fn queue_capacity_clamped(&self) -> usize {
        self.queue_capacity.max(1)
    }

    /// Returns the default per-task deadline as an `Option`.
    #[inline]
    pub fn default_timeout(&self) -> Option<Duration> {
        if self.task_timeout == Duration::ZERO {
            None
        } else {
            Some(self.task_timeout)
        }
    }

    /// Returns the submission wait bound as an `Option` (`None` = wait forever).
    #[inline]
    pub fn submit_wait(&self) -> Option<Duration> {
        if self.submit_timeout == Duration::ZERO {
            None
        } else {
            Some(self.submit_timeout)
        }
    }

    /// Returns the credit ceiling as an `Option` (`None` = no gate).
    #[inline]
    pub fn in_flight_limit(&self) -> Option<usize> {
        match self.max_in_flight {
            0 => None,
            n => Some(n),
        }
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for PoolConfig {
    /// Default configuration:
    ///
    /// - `workers = 0` (hardware parallelism)
    /// - `queue_capacity = 256`
    /// - `task_timeout = 30s`
    /// - `submit_timeout = 0s` (wait without bound)
    /// - `max_in_flight = 0` (no credit gate)
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            workers: 0,
            queue_capacity: 256,
            task_timeout: Duration::from_secs(30),
            submit_timeout: Duration::ZERO,
            max_in_flight: 0,
            bus_capacity: 1024,
        }
    }
}
