use std::sync::{Arc, Mutex};
use std::time::Duration;

use poolvisor::{AdaptiveConfig, Bus, CreditConfig, CreditError, CreditGate, EventKind};
use tokio::time::{self, Instant};

#[tokio::test(start_paused = true)]
async fn third_operation_waits_for_a_release() {
    let gate = CreditGate::new(CreditConfig::fixed(2));
    let started = Arc::new(Mutex::new(Vec::new()));
    let t0 = Instant::now();

    let ops = (0..3).map(|i| {
        let gate = gate.clone();
        let started = Arc::clone(&started);
        tokio::spawn(async move {
            gate.acquire_and_run(i, |i| async move {
                started.lock().unwrap().push((i, t0.elapsed()));
                time::sleep(Duration::from_millis(100)).await;
                i
            })
            .await
        })
    });
    let joins: Vec<_> = ops.collect();

    time::sleep(Duration::from_millis(10)).await;
    {
        let s = gate.stats();
        assert_eq!((s.in_flight, s.deferred), (2, 1));
        assert_eq!(started.lock().unwrap().len(), 2);
    }

    for (i, j) in joins.into_iter().enumerate() {
        assert_eq!(j.await.unwrap(), Ok(i));
    }
    let started = started.lock().unwrap();
    let (_, third) = started[2];
    assert_eq!(started[2].0, 2);
    assert!(third >= Duration::from_millis(100));
}

#[tokio::test]
async fn credits_are_conserved_under_churn() {
    let gate = CreditGate::new(CreditConfig::fixed(3));
    let probe = gate.clone();
    let checker = tokio::spawn(async move {
        for _ in 0..200 {
            let s = probe.stats();
            assert_eq!(s.issued - s.released, s.in_flight as u64);
            assert!(s.in_flight <= s.max_credits);
            tokio::task::yield_now().await;
        }
    });

    let workers: Vec<_> = (0..16)
        .map(|i| {
            let gate = gate.clone();
            tokio::spawn(async move {
                for _ in 0..10 {
                    let permit = gate.acquire().await.unwrap();
                    if i % 3 == 0 {
                        tokio::task::yield_now().await;
                    }
                    drop(permit);
                }
            })
        })
        .collect();
    for w in workers {
        w.await.unwrap();
    }
    checker.await.unwrap();

    let s = gate.stats();
    assert_eq!((s.issued, s.released, s.in_flight, s.credits), (160, 160, 0, 3));
}

#[tokio::test(start_paused = true)]
async fn adaptive_ceiling_publishes_adjustments() {
    let bus = Bus::new(64);
    let mut events = bus.subscribe();
    let gate = CreditGate::with_bus(
        CreditConfig {
            max_credits: 4,
            adaptive: Some(AdaptiveConfig {
                window: 3,
                low_latency: Duration::from_millis(5),
                high_latency: Duration::from_millis(50),
                ceiling: 8,
            }),
        },
        "uploads",
        bus,
    );

    for _ in 0..3 {
        gate.acquire_and_run((), |_| time::sleep(Duration::from_millis(200)))
            .await
            .unwrap();
    }
    assert_eq!(gate.stats().max_credits, 1);

    let ev = events.recv().await.unwrap();
    assert_eq!(ev.kind, EventKind::CeilingAdjusted);
    assert_eq!(ev.source.as_deref(), Some("uploads"));
    assert_eq!(ev.ceiling, Some(3));
    assert_eq!(ev.reason.as_deref(), Some("lowered"));
}

#[tokio::test]
async fn closed_gate_rejects_new_work() {
    let gate = CreditGate::new(CreditConfig::default());
    gate.close();
    assert!(gate.is_closed());
    let res = gate.acquire_and_run(1, |n| async move { n }).await;
    assert_eq!(res, Err(CreditError::Closed));
}
