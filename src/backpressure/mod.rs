//! Credit-based backpressure.
//!
//! - [`CreditGate`] admission gate; hands out [`CreditPermit`]s
//! - [`CreditConfig`], [`AdaptiveConfig`] fixed or latency-driven ceiling
//! - [`CreditStats`] counters snapshot

mod adaptive;
mod gate;

pub use adaptive::AdaptiveConfig;
pub use gate::{CreditConfig, CreditGate, CreditPermit, CreditStats};
