//! # Credit gate: bounded admission with FIFO deferral.
//!
//! A [`CreditGate`] holds up to `max_credits` credits. Each admitted operation
//! holds one credit (as a [`CreditPermit`]) until it finishes; callers arriving
//! while no credit is free are deferred in arrival order.
//!
//! ```text
//! acquire():
//!   ├─ credit free AND nobody deferred ──► take credit, return permit
//!   └─ otherwise                        ──► park in `deferred` (FIFO)
//!
//! permit dropped:
//!   in_flight -= 1, released += 1
//!   ├─ credits + in_flight < max_credits ──► credit returned to the pool
//!   ├─ in_flight == 0                    ──► credits = max_credits (idle reset)
//!   └─ pump: hand free credits to the oldest deferred callers
//! ```
//!
//! ## Invariants
//! - `issued - released == in_flight` at every observable point.
//! - `credits` never goes negative; in-flight work is never preempted.
//! - A lowered ceiling is honored by withholding credits on release; a raised
//!   ceiling takes full effect when the gate next becomes idle.
//!
//! ## Cancellation
//! The permit releases its credit on `Drop`, so an operation that panics or
//! whose future is dropped still returns its credit. A deferred caller that
//! goes away withdraws itself; if it had already been handed a permit, that
//! permit is dropped and the credit flows to the next waiter.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::{self, Instant};

use super::adaptive::{AdaptiveConfig, LatencyWindow};
use crate::error::CreditError;
use crate::events::{Bus, Event, EventKind};

/// Configuration of a [`CreditGate`].
#[derive(Clone, Debug)]
pub struct CreditConfig {
    /// Initial ceiling (clamped to at least 1).
    pub max_credits: usize,
    /// Latency-driven ceiling adjustment; `None` keeps the ceiling fixed.
    pub adaptive: Option<AdaptiveConfig>,
}

impl Default for CreditConfig {
    fn default() -> Self {
        Self {
            max_credits: 10,
            adaptive: None,
        }
    }
}

impl CreditConfig {
    /// Fixed ceiling of `max_credits`.
    pub fn fixed(max_credits: usize) -> Self {
        Self {
            max_credits,
            adaptive: None,
        }
    }
}

/// Point-in-time view of a gate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CreditStats {
    /// Current ceiling.
    pub max_credits: usize,
    /// Credits free right now.
    pub credits: usize,
    /// Permits currently held.
    pub in_flight: usize,
    /// Callers parked waiting for a credit.
    pub deferred: usize,
    /// Permits handed out since creation.
    pub issued: u64,
    /// Permits returned since creation.
    pub released: u64,
}

struct Deferred {
    id: u64,
    tx: oneshot::Sender<CreditPermit>,
}

struct CreditState {
    credits: usize,
    max_credits: usize,
    in_flight: usize,
    issued: u64,
    released: u64,
    deferred: VecDeque<Deferred>,
    closed: bool,
    next_waiter: u64,
    latencies: LatencyWindow,
}

struct GateInner {
    name: Arc<str>,
    adaptive: Option<AdaptiveConfig>,
    bus: Option<Bus>,
    state: Mutex<CreditState>,
}

impl GateInner {
    fn lock(&self) -> MutexGuard<'_, CreditState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, ev: Event) {
        if let Some(bus) = &self.bus {
            bus.publish(ev.with_source(Arc::clone(&self.name)));
        }
    }
}

/// Hands free credits to the oldest deferred callers.
fn pump(gate: &Arc<GateInner>, st: &mut CreditState) {
    while st.credits > 0 {
        let Some(waiter) = st.deferred.pop_front() else {
            return;
        };
        let permit = CreditPermit {
            gate: Arc::clone(gate),
            armed: true,
        };
        match waiter.tx.send(permit) {
            Ok(()) => {
                st.credits -= 1;
                st.in_flight += 1;
                st.issued += 1;
            }
            Err(mut orphan) => orphan.armed = false,
        }
    }
}

/// Credit-based admission gate.
///
/// Cheap to clone; clones share the same credits.
#[derive(Clone)]
pub struct CreditGate {
    inner: Arc<GateInner>,
}

impl std::fmt::Debug for CreditGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreditGate")
            .field("name", &self.inner.name)
            .field("stats", &self.stats())
            .finish()
    }
}

impl CreditGate {
    /// Creates a gate without event publishing.
    pub fn new(config: CreditConfig) -> Self {
        Self::build(config, "credit-gate", None)
    }

    /// Creates a gate that publishes `CreditDeferred` and `CeilingAdjusted` on `bus`.
    pub fn with_bus(config: CreditConfig, name: impl Into<Arc<str>>, bus: Bus) -> Self {
        Self::build(config, name, Some(bus))
    }

    fn build(config: CreditConfig, name: impl Into<Arc<str>>, bus: Option<Bus>) -> Self {
        let max = config.max_credits.max(1);
        Self {
            inner: Arc::new(GateInner {
                name: name.into(),
                adaptive: config.adaptive,
                bus,
                state: Mutex::new(CreditState {
                    credits: max,
                    max_credits: max,
                    in_flight: 0,
                    issued: 0,
                    released: 0,
                    deferred: VecDeque::new(),
                    closed: false,
                    next_waiter: 0,
                    latencies: LatencyWindow::default(),
                }),
            }),
        }
    }

    /// Returns the current counters.
    pub fn stats(&self) -> CreditStats {
        let st = self.inner.lock();
        CreditStats {
            max_credits: st.max_credits,
            credits: st.credits,
            in_flight: st.in_flight,
            deferred: st.deferred.len(),
            issued: st.issued,
            released: st.released,
        }
    }

    /// Returns `true` once [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Runs `op(item)` while holding one credit and returns its output unchanged.
    ///
    /// Waits (FIFO) when no credit is free. The credit is returned when `op`
    /// finishes, panics or is dropped. The only error is [`CreditError::Closed`].
    pub async fn acquire_and_run<T, F, Fut>(&self, item: T, op: F) -> Result<Fut::Output, CreditError>
    where
        F: FnOnce(T) -> Fut,
        Fut: Future,
    {
        let permit = self.acquire().await?;
        let started = Instant::now();
        let out = op(item).await;
        self.record_latency(started.elapsed());
        drop(permit);
        Ok(out)
    }

    /// Waits for a credit.
    pub async fn acquire(&self) -> Result<CreditPermit, CreditError> {
        match self.begin()? {
            Begin::Ready(permit) => Ok(permit),
            Begin::Deferred(mut wait) => wait.recv().await,
        }
    }

    /// Takes a credit only if one is free and nobody is deferred.
    pub fn try_acquire(&self) -> Result<CreditPermit, CreditError> {
        let mut st = self.inner.lock();
        if st.closed {
            return Err(CreditError::Closed);
        }
        if st.credits > 0 && st.deferred.is_empty() {
            Ok(self.grant(&mut st))
        } else {
            Err(CreditError::Exhausted)
        }
    }

    /// Waits at most `wait` for a credit.
    pub async fn acquire_timeout(&self, wait: Duration) -> Result<CreditPermit, CreditError> {
        match self.begin()? {
            Begin::Ready(permit) => Ok(permit),
            Begin::Deferred(mut parked) => {
                let answer = time::timeout(wait, parked.recv()).await;
                match answer {
                    Ok(res) => res,
                    Err(_) => Err(CreditError::Timeout { waited: wait }),
                }
            }
        }
    }

    /// Closes the gate: deferred and future callers fail with [`CreditError::Closed`].
    ///
    /// Permits already handed out stay valid and are released normally.
    pub fn close(&self) {
        let waiters = {
            let mut st = self.inner.lock();
            st.closed = true;
            std::mem::take(&mut st.deferred)
        };
        drop(waiters);
    }

    fn grant(&self, st: &mut CreditState) -> CreditPermit {
        st.credits -= 1;
        st.in_flight += 1;
        st.issued += 1;
        CreditPermit {
            gate: Arc::clone(&self.inner),
            armed: true,
        }
    }

    fn begin(&self) -> Result<Begin, CreditError> {
        let mut st = self.inner.lock();
        if st.closed {
            return Err(CreditError::Closed);
        }
        if st.credits > 0 && st.deferred.is_empty() {
            return Ok(Begin::Ready(self.grant(&mut st)));
        }
        st.next_waiter += 1;
        let id = st.next_waiter;
        let (tx, rx) = oneshot::channel();
        st.deferred.push_back(Deferred { id, tx });
        drop(st);

        self.inner.publish(Event::new(EventKind::CreditDeferred));
        Ok(Begin::Deferred(DeferredWait {
            gate: Arc::clone(&self.inner),
            id,
            rx,
            done: false,
        }))
    }

    fn record_latency(&self, sample: Duration) {
        let Some(adaptive) = self.inner.adaptive else {
            return;
        };
        let adjusted = {
            let mut st = self.inner.lock();
            let avg = st.latencies.record(sample, adaptive.window);
            match adaptive.next_ceiling(avg, st.max_credits) {
                Some(next) => {
                    let raised = next > st.max_credits;
                    st.max_credits = next;
                    if st.in_flight == 0 {
                        st.credits = next;
                    } else {
                        st.credits = st.credits.min(next.saturating_sub(st.in_flight));
                    }
                    pump(&self.inner, &mut st);
                    Some((next, raised))
                }
                None => None,
            }
        };
        if let Some((ceiling, raised)) = adjusted {
            tracing::debug!(gate = %self.inner.name, ceiling, raised, "credit ceiling adjusted");
            self.inner.publish(
                Event::new(EventKind::CeilingAdjusted)
                    .with_ceiling(ceiling)
                    .with_reason(if raised { "raised" } else { "lowered" }),
            );
        }
    }
}

enum Begin {
    Ready(CreditPermit),
    Deferred(DeferredWait),
}

/// One held credit; returned to its gate on drop.
#[must_use = "dropping the permit releases the credit immediately"]
pub struct CreditPermit {
    gate: Arc<GateInner>,
    armed: bool,
}

impl std::fmt::Debug for CreditPermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreditPermit")
            .field("gate", &self.gate.name)
            .finish()
    }
}

impl Drop for CreditPermit {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut st = self.gate.lock();
        st.in_flight -= 1;
        st.released += 1;
        if st.closed {
            return;
        }
        if st.in_flight == 0 {
            st.credits = st.max_credits;
        } else if st.credits + st.in_flight < st.max_credits {
            st.credits += 1;
        }
        pump(&self.gate, &mut st);
    }
}

/// Parked acquire; withdraws itself from the deferred list when dropped.
struct DeferredWait {
    gate: Arc<GateInner>,
    id: u64,
    rx: oneshot::Receiver<CreditPermit>,
    done: bool,
}

impl DeferredWait {
    async fn recv(&mut self) -> Result<CreditPermit, CreditError> {
        let answer = (&mut self.rx).await;
        self.done = true;
        answer.map_err(|_| CreditError::Closed)
    }
}

impl Drop for DeferredWait {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        let late = {
            let mut st = self.gate.lock();
            match st.deferred.iter().position(|w| w.id == self.id) {
                Some(pos) => {
                    st.deferred.remove(pos);
                    None
                }
                None => self.rx.try_recv().ok(),
            }
        };
        // releases outside the lock
        drop(late);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn assert_conserved(gate: &CreditGate) {
        let s = gate.stats();
        assert_eq!(s.issued - s.released, s.in_flight as u64);
        assert!(s.credits + s.in_flight <= s.max_credits.max(s.in_flight));
    }

    #[tokio::test]
    async fn permit_drop_returns_credit() {
        let gate = CreditGate::new(CreditConfig::fixed(1));
        let p = gate.try_acquire().unwrap();
        assert_eq!(gate.try_acquire().unwrap_err(), CreditError::Exhausted);
        drop(p);
        assert!(gate.try_acquire().is_ok());
        assert_conserved(&gate);
    }

    #[tokio::test]
    async fn zero_ceiling_is_clamped() {
        let gate = CreditGate::new(CreditConfig::fixed(0));
        assert_eq!(gate.stats().max_credits, 1);
    }

    #[tokio::test]
    async fn deferred_callers_are_served_in_order() {
        let gate = CreditGate::new(CreditConfig::fixed(1));
        let held = gate.try_acquire().unwrap();

        let order = Arc::new(Mutex::new(Vec::new()));
        let mut joins = Vec::new();
        for i in 0..3 {
            let g = gate.clone();
            let o = Arc::clone(&order);
            joins.push(tokio::spawn(async move {
                let _p = g.acquire().await.unwrap();
                o.lock().unwrap().push(i);
            }));
            while gate.stats().deferred < i + 1 {
                tokio::task::yield_now().await;
            }
        }
        drop(held);
        for j in joins {
            j.await.unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
        assert_conserved(&gate);
        assert_eq!(gate.stats().credits, 1);
    }

    #[tokio::test]
    async fn newcomer_does_not_jump_the_line() {
        let gate = CreditGate::new(CreditConfig::fixed(1));
        let held = gate.try_acquire().unwrap();
        let g = gate.clone();
        let waiter = tokio::spawn(async move { g.acquire().await.map(drop) });
        while gate.stats().deferred == 0 {
            tokio::task::yield_now().await;
        }
        drop(held);
        // credit went straight to the waiter
        assert_eq!(gate.try_acquire().unwrap_err(), CreditError::Exhausted);
        waiter.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn credit_released_on_panic() {
        let gate = CreditGate::new(CreditConfig::fixed(1));
        let res = std::panic::AssertUnwindSafe(gate.acquire_and_run(true, |blow| async move {
            if blow {
                panic!("op blew up");
            }
        }))
        .catch_unwind()
        .await;
        assert!(res.is_err());
        let s = gate.stats();
        assert_eq!((s.in_flight, s.credits, s.released), (0, 1, 1));
    }

    #[tokio::test]
    async fn op_output_passes_through() {
        let gate = CreditGate::new(CreditConfig::fixed(2));
        let out = gate
            .acquire_and_run(20, |n| async move { Err::<u32, String>(format!("bad {n}")) })
            .await
            .unwrap();
        assert_eq!(out, Err("bad 20".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_timeout_withdraws() {
        let gate = CreditGate::new(CreditConfig::fixed(1));
        let held = gate.try_acquire().unwrap();
        let err = gate
            .acquire_timeout(Duration::from_millis(50))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            CreditError::Timeout {
                waited: Duration::from_millis(50)
            }
        );
        assert_eq!(gate.stats().deferred, 0);
        drop(held);
        assert_eq!(gate.stats().credits, 1);
    }

    #[tokio::test]
    async fn close_fails_deferred_callers() {
        let gate = CreditGate::new(CreditConfig::fixed(1));
        let held = gate.try_acquire().unwrap();
        let g = gate.clone();
        let waiter = tokio::spawn(async move { g.acquire().await.map(drop) });
        while gate.stats().deferred == 0 {
            tokio::task::yield_now().await;
        }
        gate.close();
        assert_eq!(waiter.await.unwrap(), Err(CreditError::Closed));
        assert_eq!(gate.try_acquire().unwrap_err(), CreditError::Closed);
        drop(held);
        assert_eq!(gate.stats().in_flight, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn fast_ops_raise_the_ceiling() {
        let gate = CreditGate::new(CreditConfig {
            max_credits: 1,
            adaptive: Some(AdaptiveConfig {
                window: 2,
                low_latency: Duration::from_millis(10),
                high_latency: Duration::from_millis(100),
                ceiling: 3,
            }),
        });
        for _ in 0..5 {
            gate.acquire_and_run((), |_| async {}).await.unwrap();
        }
        let s = gate.stats();
        assert_eq!(s.max_credits, 3);
        assert_eq!(s.credits, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_ops_lower_the_ceiling_lazily() {
        let gate = CreditGate::new(CreditConfig {
            max_credits: 3,
            adaptive: Some(AdaptiveConfig {
                window: 1,
                low_latency: Duration::from_millis(1),
                high_latency: Duration::from_millis(10),
                ceiling: 3,
            }),
        });
        let holder = gate.try_acquire().unwrap();
        gate.acquire_and_run((), |_| time::sleep(Duration::from_millis(50)))
            .await
            .unwrap();
        let s = gate.stats();
        assert_eq!(s.max_credits, 2);
        // one still held, so only one more credit fits under the new ceiling
        assert_eq!((s.in_flight, s.credits), (1, 1));
        drop(holder);
        assert_eq!(gate.stats().credits, 2);
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_ceiling() {
        let gate = CreditGate::new(CreditConfig::fixed(2));
        let live = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let runs = (0..8).map(|i| {
            let live = Arc::clone(&live);
            let peak = Arc::clone(&peak);
            gate.acquire_and_run(i, move |_| async move {
                let now = live.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::task::yield_now().await;
                live.fetch_sub(1, Ordering::SeqCst);
            })
        });
        for r in futures::future::join_all(runs).await {
            r.unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_conserved(&gate);
        assert_eq!(gate.stats().released, 8);
    }
}
