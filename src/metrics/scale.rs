// --- File: src/metrics/scale.rs ---

//! Scale statistics of a single tensor.
//!
//! Six numbers describe how a tensor sits in floating-point range: element
//! count, mean absolute value, absolute mean, standard deviation and the
//! absolute extrema.

use super::running::{RunningMean, RunningMinMax, RunningStd};
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Pass a statistic was collected in.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Fwd,
    Bwd,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::Fwd, Direction::Bwd];

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Fwd => "fwd",
            Direction::Bwd => "bwd",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricName {
    MeanAbs,
    AbsMean,
    Std,
    AbsMax,
    AbsMin,
    Numel,
}

impl MetricName {
    pub const ALL: [MetricName; 6] = [
        MetricName::MeanAbs,
        MetricName::AbsMean,
        MetricName::Std,
        MetricName::AbsMax,
        MetricName::AbsMin,
        MetricName::Numel,
    ];

    pub fn short_name(self) -> &'static str {
        match self {
            MetricName::MeanAbs => "mean_abs",
            MetricName::AbsMean => "abs_mean",
            MetricName::Std => "std",
            MetricName::AbsMax => "abs_max",
            MetricName::AbsMin => "abs_min",
            MetricName::Numel => "numel",
        }
    }

    /// Name used for table columns and axis titles.
    pub fn full_name(self) -> &'static str {
        match self {
            MetricName::MeanAbs => "mean absolute value",
            MetricName::AbsMean => "absolute mean value",
            MetricName::Std => "standard deviation",
            MetricName::AbsMax => "absolute max value",
            MetricName::AbsMin => "absolute min value",
            MetricName::Numel => "number of elements",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("unknown metric '{name}': expected one of {short:?} or {full:?}")]
pub struct ParseMetricError {
    pub name: String,
    pub short: Vec<&'static str>,
    pub full: Vec<&'static str>,
}

impl FromStr for MetricName {
    type Err = ParseMetricError;

    /// Accepts either the short or the full name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetricName::ALL
            .into_iter()
            .find(|m| m.short_name() == s || m.full_name() == s)
            .ok_or_else(|| ParseMetricError {
                name: s.to_string(),
                short: MetricName::ALL.iter().map(|m| m.short_name()).collect(),
                full: MetricName::ALL.iter().map(|m| m.full_name()).collect(),
            })
    }
}

/// The six scale metrics of one tensor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub numel: usize,
    pub mean_abs: f64,
    pub abs_mean: f64,
    pub std: f64,
    pub abs_max: f64,
    pub abs_min: f64,
}

impl Stats {
    /// Computes all metrics in one streaming pass.
    ///
    /// `std` is the sample standard deviation. An empty input gives
    /// `numel = 0` and NaN everywhere else.
    pub fn from_values<I>(values: I) -> Self
    where
        I: IntoIterator<Item = f64>,
    {
        let mut moments = RunningStd::new();
        let mut abs = RunningMean::new();
        let mut extrema = RunningMinMax::new();
        for v in values {
            moments.update(v);
            abs.update(v.abs());
            extrema.update(v.abs());
        }
        let numel = moments.count();
        if numel == 0 {
            return Self {
                numel,
                mean_abs: f64::NAN,
                abs_mean: f64::NAN,
                std: f64::NAN,
                abs_max: f64::NAN,
                abs_min: f64::NAN,
            };
        }
        Self {
            numel,
            mean_abs: abs.compute(),
            abs_mean: moments.mean().abs(),
            std: moments.std(),
            abs_max: extrema.max().unwrap_or(f64::NAN),
            abs_min: extrema.min().unwrap_or(f64::NAN),
        }
    }

    pub fn from_array(values: &ArrayD<f32>) -> Self {
        Self::from_values(values.iter().map(|&v| f64::from(v)))
    }

    pub fn get(&self, metric: MetricName) -> f64 {
        match metric {
            MetricName::MeanAbs => self.mean_abs,
            MetricName::AbsMean => self.abs_mean,
            MetricName::Std => self.std,
            MetricName::AbsMax => self.abs_max,
            MetricName::AbsMin => self.abs_min,
            MetricName::Numel => self.numel as f64,
        }
    }
}

/// Forward and (optionally) backward statistics of a node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub fwd: Option<Stats>,
    pub bwd: Option<Stats>,
}

impl Metrics {
    pub fn get(&self, direction: Direction) -> Option<&Stats> {
        match direction {
            Direction::Fwd => self.fwd.as_ref(),
            Direction::Bwd => self.bwd.as_ref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn stats_of_small_vector() {
        let s = Stats::from_values([-2.0, 1.0, 4.0, -3.0]);
        assert_eq!(s.numel, 4);
        assert_abs_diff_eq!(s.mean_abs, 2.5);
        assert_abs_diff_eq!(s.abs_mean, 0.0);
        assert_abs_diff_eq!(s.std, 10.0f64.sqrt(), epsilon = 1e-12);
        assert_abs_diff_eq!(s.abs_max, 4.0);
        assert_abs_diff_eq!(s.abs_min, 1.0);
        assert_eq!(s.get(MetricName::Numel), 4.0);
    }

    #[test]
    fn empty_tensor_has_nan_values() {
        let s = Stats::from_values(std::iter::empty());
        assert_eq!(s.numel, 0);
        assert!(s.mean_abs.is_nan() && s.abs_max.is_nan());
    }

    #[test]
    fn metric_names_parse_from_either_form() {
        assert_eq!("std".parse::<MetricName>().unwrap(), MetricName::Std);
        assert_eq!("number of elements".parse::<MetricName>().unwrap(), MetricName::Numel);
        let err = "median".parse::<MetricName>().unwrap_err();
        assert_eq!(err.name, "median");
        assert!(err.to_string().contains("mean absolute value"));
    }

    #[test]
    fn missing_backward_stats() {
        let m = Metrics { fwd: Some(Stats::from_values([1.0])), bwd: None };
        assert!(m.get(Direction::Fwd).is_some());
        assert!(m.get(Direction::Bwd).is_none());
        assert_eq!(Direction::Bwd.to_string(), "bwd");
    }
}
