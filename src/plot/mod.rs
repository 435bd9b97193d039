//! Scale chart of a tracked graph.
//!
//! [`plot`] validates the options, prunes the graph, flattens it into a
//! [`Table`](crate::analysis::Table) and lays out a [`ScaleChart`]: one row
//! per layer, the chosen metric on a log2 x axis, reference lines at the
//! FP16/FP8 range limits, min/max error bars and dependency arrows. The chart
//! is plain data owned by the caller; `render_*` draws it with plotters.

pub mod chart;
pub mod color;
pub mod labels;
pub mod render;

pub use chart::{
    Arrow, Dash, ErrorBar, LegendEntry, LegendKey, MarkerShape, ReferenceLine, ScaleChart, Series,
};
pub use labels::clean_layer_name;

use crate::analysis::{
    graph_to_table, prune_non_float_tensors, prune_same_scale_tensors, SAME_SCALE_RTOL,
};
use crate::metrics::{MetricName, ParseMetricError};
use crate::tracking::ScalesGraph;
use chart::Layers;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlotError {
    #[error(transparent)]
    InvalidMetric(#[from] ParseMetricError),
    #[error("invalid x range: xmin {xmin} must be positive and below xmax {xmax}")]
    InvalidRange { xmin: f64, xmax: f64 },
    #[error("cannot read plot options from {path:?}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("invalid plot options in {path:?}: {source}")]
    Config { path: PathBuf, source: serde_json::Error },
    #[error("rendering failed: {0}")]
    Render(String),
}

/// What to show and how.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlotOptions {
    pub title: String,
    /// Short (`mean_abs`) or full (`mean absolute value`) metric name.
    pub metric: String,
    /// Hide ops that leave the scale of their input unchanged.
    pub prune_same_scale: bool,
    pub show_arrows: bool,
    pub show_error_bars: bool,
    /// Keep arrows whose operand was an all-zero tensor, labelled "0".
    pub show_zero_tensors: bool,
    pub xmin: Option<f64>,
    pub xmax: Option<f64>,
}

impl Default for PlotOptions {
    fn default() -> Self {
        Self {
            title: String::new(),
            metric: MetricName::MeanAbs.short_name().to_string(),
            prune_same_scale: true,
            show_arrows: true,
            show_error_bars: true,
            show_zero_tensors: false,
            xmin: None,
            xmax: None,
        }
    }
}

impl PlotOptions {
    /// Loads options from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, PlotError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|source| PlotError::Io { path: path.to_path_buf(), source })?;
        serde_json::from_str(&text)
            .map_err(|source| PlotError::Config { path: path.to_path_buf(), source })
    }

    pub fn metric_name(&self) -> Result<MetricName, PlotError> {
        Ok(self.metric.parse::<MetricName>()?)
    }

    fn check_range(&self) -> Result<(), PlotError> {
        let bad = |x: f64| !(x.is_finite() && x > 0.0);
        let (lo, hi) = (self.xmin.unwrap_or(f64::MIN_POSITIVE), self.xmax.unwrap_or(f64::MAX));
        if self.xmin.map_or(false, bad) || self.xmax.map_or(false, bad) || lo >= hi {
            return Err(PlotError::InvalidRange {
                xmin: self.xmin.unwrap_or(f64::NAN),
                xmax: self.xmax.unwrap_or(f64::NAN),
            });
        }
        Ok(())
    }
}

/// Builds the scale chart of `graph`.
///
/// Options are validated before any work is done, and the x range again once
/// its autoscaled end is known. Non-float tensors are always pruned;
/// same-scale tensors when `prune_same_scale` is set.
pub fn plot(graph: &ScalesGraph, options: &PlotOptions) -> Result<ScaleChart, PlotError> {
    let metric = options.metric_name()?;
    options.check_range()?;

    let mut graph = prune_non_float_tensors(graph);
    if options.prune_same_scale {
        graph = prune_same_scale_tensors(&graph, SAME_SCALE_RTOL);
    }
    let table = graph_to_table(&graph);
    debug!("plotting {} rows of '{}'", table.len(), metric.full_name());

    let layers = Layers {
        arrows: options.show_arrows,
        error_bars: options.show_error_bars,
        zero_tensors: options.show_zero_tensors,
        xmin: options.xmin,
        xmax: options.xmax,
    };
    ScaleChart::build(&graph, &table, metric, &options.title, layers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_values() {
        let o = PlotOptions::default();
        assert_eq!(o.metric, "mean_abs");
        assert!(o.prune_same_scale && o.show_arrows && o.show_error_bars);
        assert!(!o.show_zero_tensors);
        assert_eq!((o.xmin, o.xmax), (None, None));
    }

    #[test]
    fn options_load_from_partial_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"metric": "std", "show_arrows": false}}"#).unwrap();
        let o = PlotOptions::from_json_file(file.path()).unwrap();
        assert_eq!(o.metric_name().unwrap(), MetricName::Std);
        assert!(!o.show_arrows);
        assert!(o.show_error_bars);
    }

    #[test]
    fn unknown_option_fields_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"colour": "red"}}"#).unwrap();
        assert!(matches!(PlotOptions::from_json_file(file.path()), Err(PlotError::Config { .. })));
        assert!(matches!(
            PlotOptions::from_json_file("/nonexistent/options.json"),
            Err(PlotError::Io { .. })
        ));
    }

    #[test]
    fn invalid_metric_fails_before_pruning() {
        let options = PlotOptions { metric: "median".into(), ..Default::default() };
        let err = plot(&ScalesGraph::default(), &options).unwrap_err();
        assert!(matches!(err, PlotError::InvalidMetric(_)));
    }

    #[test]
    fn inverted_range_is_rejected() {
        let options = PlotOptions { xmin: Some(4.0), xmax: Some(2.0), ..Default::default() };
        let result = plot(&ScalesGraph::default(), &options);
        assert!(matches!(result, Err(PlotError::InvalidRange { .. })));
        let options = PlotOptions { xmin: Some(0.0), ..Default::default() };
        assert!(options.check_range().is_err());
    }
}
