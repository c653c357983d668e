use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use poolvisor::{
    EventKind, Pipeline, PipelineConfig, PipelineError, StageSpec, TaskError, TaskFn, TaskRef,
};
use tokio::time;
use tokio_util::sync::CancellationToken;

fn stage(name: &'static str, f: fn(u64) -> Result<u64, String>, jitter: bool) -> StageSpec<u64, u64> {
    let task: TaskRef<u64, u64> = TaskFn::arc(name, move |x: u64, _ctx: CancellationToken| async move {
        if jitter {
            time::sleep(Duration::from_millis(x % 7)).await;
        }
        f(x).map_err(TaskError::fail)
    });
    StageSpec::new(task)
}

#[tokio::test(start_paused = true)]
async fn three_stages_return_one_result_per_item() {
    let p = Pipeline::from_stages(
        PipelineConfig {
            buffer_capacity: 2,
            ..PipelineConfig::default()
        },
        vec![
            stage("double", |x| Ok(x * 2), true).with_workers(3),
            stage("inc", |x| Ok(x + 1), true).with_workers(2),
            stage("square", |x| Ok(x * x), false).with_buffer(1),
        ],
    );

    let n = 50u64;
    let out = p.process_batch(0..n).await;
    assert_eq!(out.len(), n as usize);
    for (x, res) in (0..n).zip(&out) {
        let want = (x * 2 + 1) * (x * 2 + 1);
        assert_eq!(res, &Ok(want));
    }
    let distinct: HashSet<_> = out.iter().map(|r| r.clone().unwrap()).collect();
    assert_eq!(distinct.len(), n as usize);

    let stats = p.stats();
    assert!(stats.stages.iter().all(|s| s.processed == n));
    assert_eq!(stats.outstanding, 0);
    p.terminate().await;
}

#[tokio::test]
async fn stage_failure_skips_the_rest() {
    let p = Pipeline::from_stages(
        PipelineConfig::default(),
        vec![
            stage("check", |x| if x == 3 { Err("three".into()) } else { Ok(x) }, false),
            stage("shout", |x| Ok(x * 10), false),
        ],
    );
    let mut events = p.subscribe();

    let out = p.process_batch([1, 3, 5]).await;
    assert_eq!(out[0], Ok(10));
    assert_eq!(
        out[1],
        Err(PipelineError::Stage {
            stage: "check".into(),
            error: "execution failed: three".into()
        })
    );
    assert_eq!(out[2], Ok(50));

    let stats = p.stats();
    assert_eq!((stats.stages[0].processed, stats.stages[0].failed), (2, 1));
    assert_eq!(stats.stages[1].processed, 2);

    let ev = events.recv().await.unwrap();
    assert_eq!(ev.kind, EventKind::StageFailed);
    assert_eq!(ev.source.as_deref(), Some("check"));
}

#[tokio::test(start_paused = true)]
async fn terminate_resolves_outstanding_requests() {
    let slow: TaskRef<u64, u64> = TaskFn::arc("slow", |x: u64, ctx: CancellationToken| async move {
        tokio::select! {
            _ = ctx.cancelled() => Err(TaskError::Canceled),
            _ = time::sleep(Duration::from_secs(60)) => Ok(x),
        }
    });
    let p = Arc::new(Pipeline::from_stages(PipelineConfig::default(), vec![StageSpec::new(slow)]));
    let mut events = p.subscribe();

    let pending: Vec<_> = (0..3)
        .map(|x| {
            let p = Arc::clone(&p);
            tokio::spawn(async move { p.process(x).await })
        })
        .collect();
    time::sleep(Duration::from_millis(10)).await;
    assert_eq!(p.stats().outstanding, 3);

    p.terminate().await;
    p.terminate().await;
    for h in pending {
        assert_eq!(h.await.unwrap(), Err(PipelineError::Terminated));
    }
    assert_eq!(p.process(9).await, Err(PipelineError::Terminated));

    let ev = events.recv().await.unwrap();
    assert_eq!(ev.kind, EventKind::PipelineTerminated);
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn panicking_stage_fails_only_that_request() {
    let fragile: TaskRef<u64, u64> = TaskFn::arc("fragile", |x: u64, _ctx: CancellationToken| async move {
        if x == 2 {
            panic!("bad input {x}");
        }
        Ok::<_, TaskError>(x + 100)
    });
    let p = Pipeline::from_stages(
        PipelineConfig::default(),
        vec![StageSpec::new(fragile), stage("halve", |x| Ok(x / 2), false)],
    );
    let mut events = p.subscribe();

    let out = p.process_batch([0, 2, 4]).await;
    assert_eq!(out[0], Ok(50));
    match &out[1] {
        Err(PipelineError::Stage { stage, error }) => {
            assert_eq!(stage, "fragile");
            assert!(error.starts_with("panicked:"), "{error}");
            assert!(error.contains("bad input 2"), "{error}");
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(out[2], Ok(52));

    // the runner survives the panic
    assert_eq!(p.process(6).await, Ok(53));
    let stats = p.stats();
    assert_eq!((stats.stages[0].processed, stats.stages[0].failed), (3, 1));

    let ev = events.recv().await.unwrap();
    assert_eq!(ev.kind, EventKind::StageFailed);
    assert_eq!(ev.source.as_deref(), Some("fragile"));
    p.terminate().await;
}
