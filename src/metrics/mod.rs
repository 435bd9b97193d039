// --- File: src/metrics/mod.rs ---

//! Metrics describing the numerical scale of tensors.
//!
//! - **running**: streaming mean / std / min-max accumulators
//! - **scale**: the six per-tensor scale metrics and the per-node bundle
//!
//! # Example
//!
//! ```rust
//! use asg_scales::metrics::{MetricName, Stats};
//!
//! let stats = Stats::from_values([1.0, -3.0]);
//! assert_eq!(stats.get(MetricName::MeanAbs), 2.0);
//! ```

pub mod running;
pub mod scale;

pub use running::{RunningMean, RunningMinMax, RunningStd};
pub use scale::{Direction, MetricName, Metrics, ParseMetricError, Stats};
