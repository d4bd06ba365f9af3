//! Selection metrics.

mod collector;

pub use collector::{MetricsCollector, Outcome};
