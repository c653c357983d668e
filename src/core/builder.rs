use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64};

use tokio::sync::{Semaphore, mpsc, watch};
use tokio_util::sync::CancellationToken;

use super::config::PoolConfig;
use super::dispatcher::{Coordinator, CoordinatorParts, PoolStats};
use super::pool::{PoolShared, WorkerPool};
use crate::backpressure::{CreditConfig, CreditGate};
use crate::events::Bus;
use crate::subscribers::{Subscribe, SubscriberSet};
use crate::tasks::TaskRef;

/// Builder for constructing a [`WorkerPool`] with optional features.
pub struct PoolBuilder<I, O> {
    task: TaskRef<I, O>,
    cfg: PoolConfig,
    name: Arc<str>,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl<I, O> PoolBuilder<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    /// Creates a builder with the default configuration.
    pub fn new(task: TaskRef<I, O>) -> Self {
        let name: Arc<str> = Arc::from(task.name());
        Self {
            task,
            cfg: PoolConfig::default(),
            name,
            subscribers: Vec::new(),
        }
    }

    /// Replaces the configuration.
    pub fn with_config(mut self, cfg: PoolConfig) -> Self {
        self.cfg = cfg;
        self
    }

    /// Sets the pool name used as event source (defaults to the task name).
    pub fn with_name(mut self, name: impl Into<Arc<str>>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive pool events (submission, dispatch, failures,
    /// replacement, destroy) through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the pool and spawns its coordinator and workers.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> WorkerPool<I, O> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let token = CancellationToken::new();
        let admission = Arc::new(Semaphore::new(self.cfg.queue_capacity_clamped()));
        let credits = self.cfg.in_flight_limit().map(|max| {
            CreditGate::with_bus(CreditConfig::fixed(max), Arc::clone(&self.name), bus.clone())
        });

        let listener_token = CancellationToken::new();
        let listener = SubscriberSet::new(self.subscribers, bus.clone())
            .listen(listener_token.clone())
            .map(|join| (join, listener_token));

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (stats_tx, stats_rx) = watch::channel(PoolStats::default());
        let (workers_tx, workers_rx) = watch::channel(Vec::new());

        let coordinator = Coordinator::new(CoordinatorParts {
            name: Arc::clone(&self.name),
            task: self.task,
            workers: self.cfg.worker_count(),
            bus: bus.clone(),
            token: token.clone(),
            admission: Arc::clone(&admission),
            credits: credits.clone(),
            commands: cmd_rx,
            stats: stats_tx,
            workers_view: workers_tx,
            listener,
        });
        tokio::spawn(coordinator.run());

        WorkerPool::from_shared(Arc::new(PoolShared {
            name: self.name,
            cfg: self.cfg,
            bus,
            token,
            admission,
            credits,
            commands: cmd_tx,
            stats: stats_rx,
            workers: workers_rx,
            destroyed: AtomicBool::new(false),
            next_id: AtomicU64::new(0),
        }))
    }
}
