use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::join_all;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::builder::PipelineBuilder;
use super::config::{PipelineConfig, StageSpec};
use super::sink::{Envelope, ErrorSink, Registration, RequestId, Sink, collect};
use super::stage::{QueueProbe, StageCtx, StageState, StageStats};
use crate::error::PipelineError;
use crate::events::{Bus, Event, EventKind};
use crate::queue::BoundedQueue;
use crate::subscribers::SubscriberSet;

/// Counters snapshot of a pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineStats {
    /// Per-stage counters, in chain order.
    pub stages: Vec<StageStats>,
    /// Finished items waiting for the collector.
    pub sink_depth: usize,
    /// Requests registered and not yet resolved.
    pub outstanding: usize,
}

struct Runtime {
    runners: Vec<JoinHandle<()>>,
    listener: Option<(JoinHandle<()>, CancellationToken)>,
}

struct PipelineInner<I, O> {
    name: Arc<str>,
    bus: Bus,
    token: CancellationToken,
    entry: BoundedQueue<Envelope<I>>,
    sink_queue: BoundedQueue<Envelope<O>>,
    sink: Arc<Sink<O>>,
    stages: Vec<Arc<StageState>>,
    queues: Vec<Arc<dyn QueueProbe>>,
    next_id: AtomicU64,
    terminated: AtomicBool,
    runtime: Mutex<Option<Runtime>>,
}

impl<I, O> PipelineInner<I, O> {
    /// Closes every queue and cancels runners; returns `false` if already done.
    fn shut(&self) -> bool {
        if self.terminated.swap(true, Ordering::AcqRel) {
            return false;
        }
        for q in &self.queues {
            q.close();
        }
        self.token.cancel();
        true
    }
}

impl<I, O> Drop for PipelineInner<I, O> {
    fn drop(&mut self) {
        self.shut();
    }
}

/// Chain of stages from `I` to `O` ending in a result sink.
///
/// Cheap to clone; clones feed the same chain.
pub struct Pipeline<I, O> {
    inner: Arc<PipelineInner<I, O>>,
}

impl<I, O> Clone for Pipeline<I, O> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<I, O> std::fmt::Debug for Pipeline<I, O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.inner.name)
            .field("stages", &self.inner.stages.len())
            .finish()
    }
}

impl<I: Send + 'static> Pipeline<I, I> {
    /// Starts a typed chain; add stages with [`PipelineBuilder::stage`].
    pub fn builder(cfg: PipelineConfig) -> PipelineBuilder<I, I> {
        PipelineBuilder::new(cfg)
    }

    /// Builds a chain of same-typed stages, in order.
    pub fn from_stages(cfg: PipelineConfig, stages: Vec<StageSpec<I, I>>) -> Self {
        stages
            .into_iter()
            .fold(PipelineBuilder::new(cfg), |chain, spec| chain.stage(spec))
            .build()
    }
}

impl<I, O> Pipeline<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    pub(super) fn launch(b: PipelineBuilder<I, O>) -> Self {
        let bus = Bus::new(b.cfg.bus_capacity_clamped());
        let token = CancellationToken::new();
        let sink = Arc::new(Sink::<O>::new());
        let errors: Arc<dyn ErrorSink> = sink.clone();
        let ctx = StageCtx {
            bus: bus.clone(),
            token: token.clone(),
            errors,
        };

        let listener_token = CancellationToken::new();
        let listener = SubscriberSet::new(b.subscribers, bus.clone())
            .listen(listener_token.clone())
            .map(|join| (join, listener_token));

        let mut runners: Vec<JoinHandle<()>> = b.launchers.into_iter().flat_map(|launch| launch(&ctx)).collect();
        runners.push(tokio::spawn(collect(b.tail.clone(), Arc::clone(&sink), token.clone())));

        Self {
            inner: Arc::new(PipelineInner {
                name: b.name,
                bus,
                token,
                entry: b.entry,
                sink_queue: b.tail,
                sink,
                stages: b.stages,
                queues: b.queues,
                next_id: AtomicU64::new(0),
                terminated: AtomicBool::new(false),
                runtime: Mutex::new(Some(Runtime { runners, listener })),
            }),
        }
    }

    /// Sends `item` through every stage and waits for the result.
    ///
    /// Fails with [`PipelineError::Stage`] when a stage fails for this item and
    /// with [`PipelineError::Terminated`] when the pipeline is torn down first.
    pub async fn process(&self, item: I) -> Result<O, PipelineError> {
        if self.is_terminated() {
            return Err(PipelineError::Terminated);
        }
        let id = RequestId(self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let rx = self.inner.sink.register(id)?;
        let _registration = Registration {
            sink: &self.inner.sink,
            id,
        };

        if self.inner.entry.put(Envelope { id, value: item }).await.is_err() {
            return Err(PipelineError::Terminated);
        }
        rx.await.unwrap_or(Err(PipelineError::Terminated))
    }

    /// Processes every item concurrently; results keep the input order.
    pub async fn process_batch(&self, items: impl IntoIterator<Item = I>) -> Vec<Result<O, PipelineError>> {
        join_all(items.into_iter().map(|item| self.process(item))).await
    }

    /// Returns per-stage counters and the number of outstanding requests.
    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            stages: self.inner.stages.iter().map(|s| s.stats()).collect(),
            sink_depth: self.inner.sink_queue.len(),
            outstanding: self.inner.sink.outstanding(),
        }
    }

    /// Subscribes to the pipeline's runtime events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.inner.bus.subscribe()
    }

    /// Returns the pipeline name used as event source.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns `true` once the pipeline was terminated.
    pub fn is_terminated(&self) -> bool {
        self.inner.terminated.load(Ordering::Acquire)
    }

    /// Tears the chain down. Idempotent.
    ///
    /// Closes every queue, cancels every runner and resolves each outstanding
    /// request with [`PipelineError::Terminated`]. Returns once runners and the
    /// subscriber listener have stopped.
    pub async fn terminate(&self) {
        let first = self.inner.shut();
        let outstanding = self.inner.sink.close();
        let runtime = self
            .inner
            .runtime
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(Runtime { runners, listener }) = runtime else {
            return;
        };

        for join in runners {
            let _ = join.await;
        }
        if first {
            tracing::debug!(pipeline = %self.inner.name, outstanding, "pipeline terminated");
            self.inner.bus.publish(
                Event::new(EventKind::PipelineTerminated)
                    .with_source(Arc::clone(&self.inner.name))
                    .with_reason(format!("{outstanding} outstanding")),
            );
        }
        if let Some((join, token)) = listener {
            token.cancel();
            let _ = join.await;
        }
    }
}
