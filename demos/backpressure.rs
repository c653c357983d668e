//! # Example: backpressure
//!
//! Drives a [`CreditGate`] from many concurrent callers.
//!
//! Shows how to:
//! - Cap in-flight operations with a fixed ceiling.
//! - Watch deferred callers get admitted in arrival order.
//! - Let an adaptive gate lower its ceiling when latency climbs.
//!
//! ## Flow
//! ```text
//! caller ──► acquire_and_run(item, op)
//!              ├─ credit free ─► run op, release on completion
//!              └─ no credit   ─► deferred (FIFO) ─► released credit ─► run op
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=poolvisor=debug cargo run --example backpressure
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use poolvisor::{AdaptiveConfig, Bus, CreditConfig, CreditGate, EventKind};
use tokio::time::Instant;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    fixed_ceiling().await?;
    adaptive_ceiling().await?;
    Ok(())
}

async fn fixed_ceiling() -> anyhow::Result<()> {
    println!("== fixed ceiling of 2 ==");
    let gate = CreditGate::new(CreditConfig::fixed(2));
    let active = Arc::new(AtomicUsize::new(0));
    let t0 = Instant::now();

    let mut joins = Vec::new();
    for call in 0..6 {
        let gate = gate.clone();
        let active = Arc::clone(&active);
        joins.push(tokio::spawn(async move {
            gate.acquire_and_run(call, |call| async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                println!("call {call} started at {:>4?} (active={now})", t0.elapsed());
                tokio::time::sleep(Duration::from_millis(100)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                call
            })
            .await
        }));
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    println!("stats while busy: {:?}", gate.stats());

    for j in joins {
        j.await??;
    }
    println!("stats when idle:  {:?}", gate.stats());
    Ok(())
}

async fn adaptive_ceiling() -> anyhow::Result<()> {
    println!("== adaptive ceiling ==");
    let bus = Bus::new(64);
    let mut events = bus.subscribe();
    let gate = CreditGate::with_bus(
        CreditConfig {
            max_credits: 4,
            adaptive: Some(AdaptiveConfig {
                window: 4,
                low_latency: Duration::from_millis(20),
                high_latency: Duration::from_millis(80),
                ceiling: 8,
            }),
        },
        "uploads",
        bus,
    );

    for latency in [5u64, 5, 5, 5, 150, 150, 150, 150, 150] {
        gate.acquire_and_run(latency, |ms| tokio::time::sleep(Duration::from_millis(ms)))
            .await?;
    }

    while let Ok(ev) = events.try_recv() {
        if ev.kind == EventKind::CeilingAdjusted {
            println!(
                "ceiling {} -> {}",
                ev.reason.as_deref().unwrap_or("?"),
                ev.ceiling.unwrap_or_default()
            );
        }
    }
    println!("final: {:?}", gate.stats());
    Ok(())
}
