//! Pipeline and stage configuration.

use crate::tasks::TaskRef;

/// Configuration shared by every stage of a pipeline.
///
/// ## Field semantics
/// - `buffer_capacity`: default capacity of each inter-stage queue (min 1)
/// - `bus_capacity`: event bus ring buffer size (min 1; clamped by Bus)
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Capacity of the entry queue and of every stage output queue without an override.
    pub buffer_capacity: usize,
    /// Capacity of the event bus broadcast channel.
    pub bus_capacity: usize,
}

impl PipelineConfig {
    /// Returns the buffer capacity clamped to a minimum of 1.
    #[inline]
    pub fn buffer_capacity_clamped(&self) -> usize {
        self.buffer_capacity.max(1)
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for PipelineConfig {
    /// - `buffer_capacity = 16`
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            buffer_capacity: 16,
            bus_capacity: 1024,
        }
    }
}

/// One stage of a pipeline: a task from `A` to `B` plus its concurrency.
pub struct StageSpec<A, B> {
    /// Work performed on each item.
    pub task: TaskRef<A, B>,
    /// Runner tasks pulling from the stage's input queue (min 1).
    pub workers: usize,
    /// Capacity of the queue this stage writes into; `None` uses the pipeline default.
    pub buffer_capacity: Option<usize>,
}

impl<A, B> StageSpec<A, B> {
    /// A single-runner stage with the default output buffer.
    pub fn new(task: TaskRef<A, B>) -> Self {
        Self {
            task,
            workers: 1,
            buffer_capacity: None,
        }
    }

    /// Sets the number of runner tasks.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Overrides the capacity of the stage's output queue.
    pub fn with_buffer(mut self, capacity: usize) -> Self {
        self.buffer_capacity = Some(capacity);
        self
    }
}

impl<A, B> Clone for StageSpec<A, B> {
    fn clone(&self) -> Self {
        Self {
            task: self.task.clone(),
            workers: self.workers,
            buffer_capacity: self.buffer_capacity,
        }
    }
}

impl<A: Send + 'static, B: Send + 'static> std::fmt::Debug for StageSpec<A, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageSpec")
            .field("task", &self.task.name())
            .field("workers", &self.workers)
            .field("buffer_capacity", &self.buffer_capacity)
            .finish()
    }
}
