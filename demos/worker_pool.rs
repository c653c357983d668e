//! # Example: worker_pool
//!
//! Runs a small thumbnail pool and shows every way a task can end.
//!
//! Shows how to:
//! - Build a [`WorkerPool`] with [`PoolConfig`].
//! - Submit with the default deadline and with [`SubmitOptions`].
//! - Observe a worker being replaced after a timeout and after a failure.
//! - Read [`PoolStats`] and per-worker snapshots, then destroy the pool.
//!
//! ## Flow
//! ```text
//! submit(ms) ──► queue (cap 4) ──► worker-0 / worker-1
//!                                    ├─ ok        ─► Ok(ms)
//!                                    ├─ too slow  ─► TaskTimeout, worker replaced
//!                                    └─ ms == 13  ─► WorkerError, worker replaced
//! destroy() ──► queued + running tasks fail with PoolDestroyed
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=debug cargo run --example worker_pool
//! ```

use std::time::Duration;

use poolvisor::{PoolConfig, PoolError, PoolStats, SubmitOptions, TaskError, TaskFn, TaskRef, WorkerPool};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Pretends to render a thumbnail for `ms` milliseconds.
fn thumbnail() -> TaskRef<u64, u64> {
    TaskFn::arc("thumbnail", |ms: u64, ctx: CancellationToken| async move {
        if ms == 13 {
            return Err(TaskError::fail("unlucky input"));
        }
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(ms)) => Ok(ms),
            _ = ctx.cancelled() => Err(TaskError::Canceled),
        }
    })
}

fn print_stats(label: &str, s: &PoolStats) {
    println!(
        "[{label}] workers={} busy={} queued={} completed={} failed={} replacements={}",
        s.total_workers, s.busy_workers, s.queue_length, s.total_completed, s.total_failed, s.replacements
    );
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let pool = WorkerPool::new(
        thumbnail(),
        PoolConfig {
            workers: 2,
            queue_capacity: 4,
            task_timeout: Duration::from_millis(300),
            submit_timeout: Duration::from_secs(1),
            ..PoolConfig::default()
        },
    );

    let mut handles = Vec::new();
    for ms in [50, 80, 13, 120] {
        handles.push((ms, pool.submit(ms).await?));
    }
    let slow = pool
        .submit_with(1_000, SubmitOptions::with_timeout(Duration::from_millis(100)))
        .await?;
    print_stats("after submit", &pool.stats());

    for (ms, h) in handles {
        match h.await {
            Ok(v) => println!("task {ms}ms -> ok {v}"),
            Err(e) => println!("task {ms}ms -> {} ({e})", e.as_label()),
        }
    }
    match slow.await {
        Err(PoolError::TaskTimeout { timeout }) => println!("slow task hit its {timeout:?} deadline"),
        other => println!("slow task -> {other:?}"),
    }
    print_stats("after results", &pool.stats());

    for w in pool.worker_stats() {
        println!("{} gen={} state={:?} completed={}", w.id, w.generation, w.state, w.completed);
    }

    let doomed = pool.submit(10_000).await?;
    tokio::time::sleep(Duration::from_millis(20)).await;
    pool.destroy().await;
    println!("in-flight after destroy -> {:?}", doomed.await);
    println!("submit after destroy -> {:?}", pool.submit(1).await.map(|_| ()));
    Ok(())
}
