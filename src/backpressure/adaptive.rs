//! # Adaptive credit ceiling.
//!
//! [`AdaptiveConfig`] moves a gate's ceiling by one step based on the rolling
//! average of the last `window` operation latencies:
//!
//! ```text
//! avg < low_latency   ─► ceiling + 1   (bounded by `ceiling`)
//! avg > high_latency  ─► ceiling - 1   (bounded by 1)
//! otherwise           ─► unchanged
//! ```
//!
//! Adjustments are advisory: the gate applies them lazily (see
//! [`CreditGate`](crate::CreditGate)).

use std::collections::VecDeque;
use std::time::Duration;

/// Tuning for latency-driven ceiling adjustment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AdaptiveConfig {
    /// Number of most recent samples in the rolling average (min 1).
    pub window: usize,
    /// Average latency under which the ceiling is raised.
    pub low_latency: Duration,
    /// Average latency over which the ceiling is lowered.
    pub high_latency: Duration,
    /// Upper bound for the ceiling.
    pub ceiling: usize,
}

impl Default for AdaptiveConfig {
    /// - `window = 10`
    /// - `low_latency = 50ms`
    /// - `high_latency = 200ms`
    /// - `ceiling = 64`
    fn default() -> Self {
        Self {
            window: 10,
            low_latency: Duration::from_millis(50),
            high_latency: Duration::from_millis(200),
            ceiling: 64,
        }
    }
}

impl AdaptiveConfig {
    /// Returns the ceiling that follows `current` for the given average, if it moves.
    pub fn next_ceiling(&self, avg: Duration, current: usize) -> Option<usize> {
        if avg < self.low_latency && current < self.ceiling.max(1) {
            Some(current + 1)
        } else if avg > self.high_latency && current > 1 {
            Some(current - 1)
        } else {
            None
        }
    }
}

/// Fixed-size window of recent latencies.
#[derive(Debug, Default)]
pub(crate) struct LatencyWindow {
    samples: VecDeque<Duration>,
    total: Duration,
}

impl LatencyWindow {
    /// Records a sample and returns the new average.
    pub(crate) fn record(&mut self, sample: Duration, window: usize) -> Duration {
        let window = window.max(1);
        self.samples.push_back(sample);
        self.total += sample;
        while self.samples.len() > window {
            if let Some(old) = self.samples.pop_front() {
                self.total -= old;
            }
        }
        self.total / self.samples.len() as u32
    }
}
