//! # Example: pipeline
//!
//! A three-stage text pipeline with typed stages and a shared result sink.
//!
//! Shows how to:
//! - Chain stages of different types with [`Pipeline::builder`].
//! - Run several workers per stage and bound the buffers between stages.
//! - Receive each result matched to its request, including stage failures.
//! - Attach the built-in [`LogWriter`] and terminate the pipeline.
//!
//! ## Flow
//! ```text
//! process(line) ──► [parse: String ─► i64] ──► [score: i64 ─► i64, 3 workers] ──► [render: i64 ─► String] ──► sink
//!                          │ error                                                                          │
//!                          └────────────────────────── PipelineError::Stage ──────────────────────────────► caller
//! ```
//!
//! ## Run
//! Requires the `logging` feature for [`LogWriter`].
//! ```bash
//! RUST_LOG=poolvisor=debug cargo run --example pipeline --features logging
//! ```

use std::sync::Arc;
use std::time::Duration;

use poolvisor::{
    LogWriter, Pipeline, PipelineConfig, StageSpec, Subscribe, TaskError, TaskFn, TaskRef,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let parse: TaskRef<String, i64> = TaskFn::arc("parse", |line: String, _ctx: CancellationToken| async move {
        line.trim()
            .parse::<i64>()
            .map_err(|e| TaskError::fail(format!("{line:?}: {e}")))
    });
    let score: TaskRef<i64, i64> = TaskFn::arc("score", |n: i64, ctx: CancellationToken| async move {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(20 * (n.unsigned_abs() % 5))) => Ok(n * n),
            _ = ctx.cancelled() => Err(TaskError::Canceled),
        }
    });
    let render: TaskRef<i64, String> =
        TaskFn::arc("render", |n: i64, _ctx: CancellationToken| async move { Ok::<_, TaskError>(format!("score={n}")) });

    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let pipeline = Pipeline::builder(PipelineConfig {
        buffer_capacity: 4,
        ..PipelineConfig::default()
    })
    .with_name("scores")
    .with_subscribers(subs)
    .stage(StageSpec::new(parse))
    .stage(StageSpec::new(score).with_workers(3).with_buffer(2))
    .stage(StageSpec::new(render))
    .build();

    let lines = ["4", " 7", "x", "12", "-3", "", "9"].map(String::from);
    let results = pipeline.process_batch(lines.clone()).await;
    for (line, res) in lines.iter().zip(results) {
        match res {
            Ok(out) => println!("{line:>4?} -> {out}"),
            Err(e) => println!("{line:>4?} -> {} ({e})", e.as_label()),
        }
    }

    for s in pipeline.stats().stages {
        println!(
            "stage {:<7} workers={} processed={} failed={}",
            s.name, s.workers, s.processed, s.failed
        );
    }

    pipeline.terminate().await;
    println!("after terminate -> {:?}", pipeline.process("1".into()).await);
    Ok(())
}
