//! # Pipeline stage chain.
//!
//! A [`Pipeline`] links stages with bounded queues and ends in a result sink
//! keyed by request id. Full buffers park the stage in front of them, so a
//! slow stage throttles everything upstream down to the entry queue.
//!
//! ```text
//! process(item) ─► entry queue ─► [stage 1 × w1] ─► queue ─► [stage 2 × w2] ─► ... ─► sink queue ─► collector
//!      │                               │                          │                                   │
//!      │                               └── Err ──────────────────┴──────── sink.fail(id) ◄───────────┤
//!      └──────────────────────────── awaits Result<O, PipelineError> for its RequestId ◄─────────────┘
//! ```
//!
//! - Requests are independent; results are matched by id, not by order.
//! - A failing stage resolves its request with [`PipelineError::Stage`](crate::PipelineError::Stage)
//!   and the item skips the remaining stages.
//! - [`Pipeline::terminate`] closes every queue, cancels every runner and
//!   resolves outstanding requests with [`PipelineError::Terminated`](crate::PipelineError::Terminated).

mod builder;
mod chain;
mod config;
mod sink;
mod stage;

pub use builder::PipelineBuilder;
pub use chain::{Pipeline, PipelineStats};
pub use config::{PipelineConfig, StageSpec};
pub use sink::RequestId;
pub use stage::StageStats;
