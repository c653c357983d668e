//! Worker pool core: queue, dispatch and worker lifecycle.
//!
//! The public API from this module is [`WorkerPool`] with its builder,
//! configuration, handles and snapshots.
//!
//! Internal modules:
//! - [`dispatcher`]: the coordinator owning the queue, the slot table and task deadlines;
//! - [`worker`]: one actor per slot, executes with panic isolation;
//! - [`slot`]: slot records, states and replacement;
//! - [`handle`]: task ids, per-task options and result handles;
//! - [`pool`]: submission and destroy paths.

mod builder;
mod config;
mod dispatcher;
mod handle;
mod pool;
mod slot;
mod worker;

pub use builder::PoolBuilder;
pub use config::PoolConfig;
pub use dispatcher::PoolStats;
pub use handle::{SubmitOptions, TaskHandle, TaskId};
pub use pool::WorkerPool;
pub use slot::{WorkerId, WorkerSnapshot, WorkerState};
