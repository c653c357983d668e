use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use poolvisor::{
    Event, EventKind, PoolConfig, PoolError, SubmitOptions, Subscribe, TaskError, TaskFn, TaskRef,
    WorkerPool, WorkerState,
};
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

/// Sleeps for the given milliseconds and echoes them back.
fn sleeper() -> TaskRef<u64, u64> {
    TaskFn::arc("sleeper", |ms: u64, _ctx: CancellationToken| async move {
        time::sleep(Duration::from_millis(ms)).await;
        Ok::<_, TaskError>(ms)
    })
}

fn cfg(workers: usize, queue_capacity: usize) -> PoolConfig {
    PoolConfig {
        workers,
        queue_capacity,
        ..PoolConfig::default()
    }
}

async fn settle<I, O>(pool: &WorkerPool<I, O>, busy: usize)
where
    I: Send + 'static,
    O: Send + 'static,
{
    while pool.stats().busy_workers != busy {
        tokio::task::yield_now().await;
    }
}

#[derive(Default)]
struct Recorder {
    kinds: Mutex<Vec<EventKind>>,
}

#[async_trait]
impl Subscribe for Recorder {
    async fn on_event(&self, ev: &Event) {
        self.kinds.lock().unwrap().push(ev.kind);
    }

    fn name(&self) -> &'static str {
        "recorder"
    }
}

#[tokio::test(start_paused = true)]
async fn single_worker_runs_tasks_in_submission_order() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&order);
    let task: TaskRef<u32, u32> = TaskFn::arc("record", move |n: u32, _ctx: CancellationToken| {
        let seen = Arc::clone(&seen);
        async move {
            seen.lock().unwrap().push(n);
            time::sleep(Duration::from_millis(10)).await;
            Ok::<_, TaskError>(n)
        }
    });
    let pool = WorkerPool::new(task, cfg(1, 8));

    let mut handles = Vec::new();
    for n in 1..=3 {
        handles.push(pool.submit(n).await.unwrap());
    }
    for (n, h) in (1..=3).zip(handles) {
        assert_eq!(h.await, Ok(n));
    }
    assert_eq!(*order.lock().unwrap(), vec![1, 2, 3]);
}

#[tokio::test(start_paused = true)]
async fn two_workers_queue_the_rest() {
    let pool = WorkerPool::new(sleeper(), cfg(2, 5));

    let mut handles = Vec::new();
    for _ in 0..4 {
        handles.push(pool.submit(100).await.unwrap());
    }
    settle(&pool, 2).await;
    let stats = pool.stats();
    assert_eq!(stats.busy_workers, 2);
    assert_eq!(stats.queue_length, 2);

    for h in handles {
        assert_eq!(h.await, Ok(100));
    }
    settle(&pool, 0).await;
    assert_eq!(pool.stats().total_completed, 4);
}

#[tokio::test(start_paused = true)]
async fn timeout_fails_task_and_keeps_pool_size() {
    let pool = WorkerPool::new(
        sleeper(),
        PoolConfig {
            task_timeout: Duration::from_millis(100),
            ..cfg(2, 4)
        },
    );
    let started = Instant::now();
    let res = pool.submit(500).await.unwrap().await;
    let elapsed = started.elapsed();

    assert_eq!(
        res,
        Err(PoolError::TaskTimeout {
            timeout: Duration::from_millis(100)
        })
    );
    assert!(elapsed >= Duration::from_millis(100) && elapsed < Duration::from_millis(150));

    let stats = pool.stats();
    assert_eq!(stats.total_workers, 2);
    assert_eq!(stats.total_failed, 1);
    assert_eq!(stats.replacements, 1);
    assert_eq!(pool.execute(20).await, Ok(20));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn timeout_fires_for_a_task_that_never_yields() {
    let task: TaskRef<u64, u64> = TaskFn::arc("blocking", |ms: u64, _ctx: CancellationToken| async move {
        std::thread::sleep(Duration::from_millis(ms));
        Ok::<_, TaskError>(ms)
    });
    let pool = WorkerPool::new(
        task,
        PoolConfig {
            task_timeout: Duration::from_millis(100),
            ..cfg(2, 4)
        },
    );

    let started = std::time::Instant::now();
    let res = pool.submit(500).await.unwrap().await;
    let elapsed = started.elapsed();

    assert_eq!(
        res,
        Err(PoolError::TaskTimeout {
            timeout: Duration::from_millis(100)
        })
    );
    assert!(elapsed < Duration::from_millis(400), "resolved after {elapsed:?}");
    let stats = pool.stats();
    assert_eq!((stats.total_failed, stats.replacements), (1, 1));
    assert_eq!(stats.total_workers, 2);
    assert_eq!(pool.execute(0).await, Ok(0));
}

#[tokio::test(start_paused = true)]
async fn result_reached_at_the_deadline_counts_as_timeout() {
    let pool = WorkerPool::new(
        sleeper(),
        PoolConfig {
            task_timeout: Duration::from_millis(100),
            ..cfg(1, 4)
        },
    );
    assert_eq!(
        pool.execute(100).await,
        Err(PoolError::TaskTimeout {
            timeout: Duration::from_millis(100)
        })
    );
    let stats = pool.stats();
    assert_eq!((stats.total_completed, stats.total_failed), (0, 1));
    assert_eq!(pool.execute(99).await, Ok(99));
}

#[tokio::test(start_paused = true)]
async fn failures_leave_other_running_tasks_alone() {
    let task: TaskRef<i64, i64> = TaskFn::arc("mixed", |n: i64, _ctx: CancellationToken| async move {
        time::sleep(Duration::from_millis(n.unsigned_abs())).await;
        if n < 0 {
            Err(TaskError::fail("negative"))
        } else {
            Ok(n)
        }
    });
    let pool = WorkerPool::new(task, cfg(3, 4));

    let long = pool.submit(300).await.unwrap();
    settle(&pool, 1).await;
    let failing = pool.submit(-10).await.unwrap();
    let slow = pool
        .submit_with(1_000, SubmitOptions::with_timeout(Duration::from_millis(50)))
        .await
        .unwrap();

    assert!(matches!(failing.await, Err(PoolError::WorkerError { .. })));
    assert_eq!(
        slow.await,
        Err(PoolError::TaskTimeout {
            timeout: Duration::from_millis(50)
        })
    );
    let workers = pool.worker_stats();
    assert_eq!((workers[0].generation, workers[0].state), (0, WorkerState::Busy));

    assert_eq!(long.await, Ok(300));
    let stats = pool.stats();
    assert_eq!((stats.total_completed, stats.total_failed, stats.replacements), (1, 2, 2));
}

#[tokio::test]
async fn failing_worker_is_replaced_in_place() {
    let task: TaskRef<i32, i32> = TaskFn::arc("picky", |n: i32, _ctx: CancellationToken| async move {
        match n {
            n if n < 0 => Err(TaskError::fail("negative")),
            0 => panic!("zero"),
            n => Ok(n),
        }
    });
    let pool = WorkerPool::new(task, cfg(3, 8));

    let err = pool.execute(-1).await.unwrap_err();
    assert!(matches!(err, PoolError::WorkerError { ref error, .. } if error.contains("negative")));
    let err = pool.execute(0).await.unwrap_err();
    assert!(matches!(err, PoolError::WorkerError { ref error, .. } if error.contains("zero")));

    let workers = pool.worker_stats();
    assert_eq!(workers.len(), 3);
    assert!(workers.iter().all(|w| w.state == WorkerState::Idle));
    assert_eq!(workers.iter().map(|w| w.generation).sum::<u64>(), 2);
    assert_eq!(pool.stats().total_workers, 3);

    assert_eq!(pool.execute(5).await, Ok(5));
}

#[tokio::test(start_paused = true)]
async fn destroy_is_idempotent_and_fails_everything_once() {
    let recorder = Arc::new(Recorder::default());
    let pool = WorkerPool::builder(sleeper())
        .with_config(cfg(1, 1))
        .with_subscribers(vec![recorder.clone() as Arc<dyn Subscribe>])
        .build();

    let running = pool.submit(60_000).await.unwrap();
    settle(&pool, 1).await;
    let queued = pool.submit(60_000).await.unwrap();

    let parked = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.submit(1).await.map(|_| ()) })
    };
    time::sleep(Duration::from_millis(1)).await;

    pool.destroy().await;
    pool.destroy().await;

    assert_eq!(running.await, Err(PoolError::PoolDestroyed));
    assert_eq!(queued.await, Err(PoolError::PoolDestroyed));
    assert_eq!(parked.await.unwrap(), Err(PoolError::PoolShutdown));
    assert_eq!(pool.submit(1).await.unwrap_err(), PoolError::PoolShutdown);
    assert!(pool.is_destroyed());

    let kinds = recorder.kinds.lock().unwrap();
    assert_eq!(kinds.iter().filter(|k| **k == EventKind::PoolDestroyed).count(), 1);
    assert_eq!(kinds.last(), Some(&EventKind::PoolDestroyed));
}

#[tokio::test(start_paused = true)]
async fn queue_never_exceeds_capacity() {
    let pool = WorkerPool::new(sleeper(), cfg(2, 3));
    let mut stats = pool.watch_stats();
    let watcher = tokio::spawn(async move {
        let mut peak = 0;
        while stats.changed().await.is_ok() {
            peak = peak.max(stats.borrow().queue_length);
        }
        peak
    });

    let submitters: Vec<_> = (0..12)
        .map(|i| {
            let pool = pool.clone();
            tokio::spawn(async move { pool.execute(10 + i).await })
        })
        .collect();
    for s in submitters {
        assert!(s.await.unwrap().is_ok());
    }

    pool.destroy().await;
    assert!(watcher.await.unwrap() <= 3);
}
