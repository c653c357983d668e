use std::sync::Arc;
use std::sync::atomic::AtomicU64;

use tokio::task::JoinHandle;

use super::chain::Pipeline;
use super::config::{PipelineConfig, StageSpec};
use super::sink::Envelope;
use super::stage::{QueueProbe, StageCtx, StageState, run_stage};
use crate::queue::BoundedQueue;
use crate::subscribers::Subscribe;

type Launcher = Box<dyn FnOnce(&StageCtx) -> Vec<JoinHandle<()>> + Send>;

/// Typed builder for a [`Pipeline`] from `I` to the current output `X`.
///
/// Each [`stage`](Self::stage) call links a new stage to the previous output
/// and changes the output type.
pub struct PipelineBuilder<I, X> {
    pub(super) cfg: PipelineConfig,
    pub(super) name: Arc<str>,
    pub(super) subscribers: Vec<Arc<dyn Subscribe>>,
    pub(super) entry: BoundedQueue<Envelope<I>>,
    pub(super) tail: BoundedQueue<Envelope<X>>,
    pub(super) stages: Vec<Arc<StageState>>,
    pub(super) queues: Vec<Arc<dyn QueueProbe>>,
    pub(super) launchers: Vec<Launcher>,
}

impl<I: Send + 'static> PipelineBuilder<I, I> {
    pub(super) fn new(cfg: PipelineConfig) -> Self {
        let entry: BoundedQueue<Envelope<I>> = BoundedQueue::new(cfg.buffer_capacity_clamped());
        let entry_probe: Arc<dyn QueueProbe> = Arc::new(entry.clone());
        Self {
            cfg,
            name: Arc::from("pipeline"),
            subscribers: Vec::new(),
            tail: entry.clone(),
            queues: vec![entry_probe],
            entry,
            stages: Vec::new(),
            launchers: Vec::new(),
        }
    }
}

impl<I, X> PipelineBuilder<I, X>
where
    I: Send + 'static,
    X: Send + 'static,
{
    /// Sets the pipeline name used as event source.
    pub fn with_name(mut self, name: impl Into<Arc<str>>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets event subscribers for observability.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Appends a stage consuming the current output.
    pub fn stage<Y: Send + 'static>(mut self, spec: StageSpec<X, Y>) -> PipelineBuilder<I, Y> {
        let capacity = spec
            .buffer_capacity
            .map(|c| c.max(1))
            .unwrap_or_else(|| self.cfg.buffer_capacity_clamped());
        let output: BoundedQueue<Envelope<Y>> = BoundedQueue::new(capacity);
        let input = self.tail;
        let workers = spec.workers.max(1);

        let state = Arc::new(StageState {
            name: Arc::from(spec.task.name()),
            workers,
            input: Arc::new(input.clone()),
            processed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        });
        self.stages.push(Arc::clone(&state));
        self.queues.push(Arc::new(output.clone()));

        let task = spec.task;
        let out = output.clone();
        self.launchers.push(Box::new(move |ctx: &StageCtx| {
            (0..workers)
                .map(|_| {
                    tokio::spawn(run_stage(
                        Arc::clone(&state),
                        Arc::clone(&task),
                        input.clone(),
                        out.clone(),
                        ctx.clone(),
                    ))
                })
                .collect()
        }));

        PipelineBuilder {
            cfg: self.cfg,
            name: self.name,
            subscribers: self.subscribers,
            entry: self.entry,
            tail: output,
            stages: self.stages,
            queues: self.queues,
            launchers: self.launchers,
        }
    }

    /// Wires the chain and spawns every runner. Must be called inside a tokio runtime.
    pub fn build(self) -> Pipeline<I, X> {
        Pipeline::launch(self)
    }
}
