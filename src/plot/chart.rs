//! The scale chart as plain data.
//!
//! [`ScaleChart`] holds everything needed to draw the figure: rows, marker
//! series, reference lines, error bars, arrows and legend. Building it does
//! no drawing; [`render`](super::render) turns it into an image.
//!
//! Coordinates: `x` is the metric value (drawn on a base-2 log axis), `y` is
//! the row index, row 0 at the top.

use super::color::{self, Rgb};
use super::labels::clean_layer_name;
use super::PlotError;
use crate::analysis::Table;
use crate::metrics::{Direction, MetricName};
use crate::tracking::{operands, ScalesGraph};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Fraction of the log2 data span added on each side of the x axis.
const X_MARGIN: f64 = 0.05;
/// Vertical offset of error bars from their row (fwd above, bwd below).
const ERROR_BAR_OFFSET: f64 = 0.1;
/// Half-height of error bar caps.
const ERROR_BAR_CAP: f64 = 0.2;
/// Reference-line labels sit this far below the last row.
const LABEL_OFFSET: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarkerShape {
    /// Small dot: non-weight tensors.
    Dot,
    /// Downward triangle: weights.
    TriangleDown,
}

/// Dash pattern as `(on, off)` lengths in line widths.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Dash {
    pub on: f64,
    pub off: f64,
}

impl Dash {
    pub const LONG: Dash = Dash { on: 3.0, off: 1.0 };
    pub const DOTTED: Dash = Dash { on: 1.0, off: 3.0 };
}

/// Markers for one (direction, weight) combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub direction: Direction,
    pub weight_tensor: bool,
    pub color: Rgb,
    pub marker: MarkerShape,
    /// `(metric value, row)`; only finite positive values are kept.
    pub points: Vec<(f64, usize)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceLine {
    pub x: f64,
    pub label: String,
    pub dash: Dash,
    /// Where the label is anchored (top-centre).
    pub label_y: f64,
}

/// Horizontal `[abs_min, abs_max]` bar of one tensor in one direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBar {
    pub direction: Direction,
    pub row: usize,
    pub y: f64,
    pub x_min: f64,
    pub x_max: f64,
    pub cap: f64,
    pub color: Rgb,
}

/// Dependency arrow between two tensors, tail at `from`, head at `to`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arrow {
    pub direction: Direction,
    pub from: (f64, f64),
    pub to: (f64, f64),
    pub color: Rgb,
    /// `"0"` when the operand endpoint was a zero (or non-finite) tensor.
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LegendKey {
    Line(Rgb),
    Marker(MarkerShape),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegendEntry {
    pub label: String,
    pub key: LegendKey,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleChart {
    pub title: String,
    pub metric: MetricName,
    /// Layer names, index = y coordinate.
    pub rows: Vec<String>,
    /// Cleaned names shown on the y axis.
    pub row_labels: Vec<String>,
    pub series: Vec<Series>,
    pub reference_lines: Vec<ReferenceLine>,
    pub error_bars: Vec<ErrorBar>,
    pub arrows: Vec<Arrow>,
    pub legend: Vec<LegendEntry>,
    pub x_range: (f64, f64),
}

/// Flags controlling what [`ScaleChart::build`] adds on top of the markers.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Layers {
    pub arrows: bool,
    pub error_bars: bool,
    pub zero_tensors: bool,
    pub xmin: Option<f64>,
    pub xmax: Option<f64>,
}

pub fn direction_color(direction: Direction) -> Rgb {
    match direction {
        Direction::Fwd => color::FORWARD,
        Direction::Bwd => color::BACKWARD,
    }
}

pub fn marker_for(weight_tensor: bool) -> MarkerShape {
    if weight_tensor {
        MarkerShape::TriangleDown
    } else {
        MarkerShape::Dot
    }
}

pub fn legend_label(key: &str) -> Option<&'static str> {
    match key {
        "fwd" => Some("forward pass"),
        "bwd" => Some("backward pass"),
        "false" | "False" => Some("non-weight tensor"),
        "true" | "True" => Some("weight tensor"),
        _ => None,
    }
}

/// Floating-point format boundaries drawn as vertical lines.
pub fn reference_lines(label_y: f64) -> Vec<ReferenceLine> {
    [
        (2f64.powi(-14), "FP16 min,\nFP8 E5 min\n(normal)", Dash::LONG),
        (2f64.powi(-7), "FP8 E4 min\n(normal)", Dash::DOTTED),
        (240.0, "FP8 E4 max", Dash::DOTTED),
        (2f64.powi(16), "FP16 max,\nFP8 E5 max", Dash::LONG),
    ]
    .into_iter()
    .map(|(x, label, dash)| ReferenceLine { x, label: label.to_string(), dash, label_y })
    .collect()
}

fn visible(x: f64) -> bool {
    x.is_finite() && x > 0.0
}

/// log2-space autoscale with a margin on both ends.
fn autoscale(xs: impl Iterator<Item = f64>) -> (f64, f64) {
    let (lo, hi) = xs
        .filter(|&x| visible(x))
        .map(f64::log2)
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if !lo.is_finite() {
        return (1.0, 2.0);
    }
    let margin = if hi > lo { (hi - lo) * X_MARGIN } else { 1.0 };
    (2f64.powf(lo - margin), 2f64.powf(hi + margin))
}

impl ScaleChart {
    /// Lays out a chart for an already pruned graph.
    ///
    /// Fails when an `xmin`/`xmax` override leaves the final x range empty
    /// once the other end has been autoscaled.
    pub(crate) fn build(
        graph: &ScalesGraph,
        table: &Table,
        metric: MetricName,
        title: &str,
        layers: Layers,
    ) -> Result<Self, PlotError> {
        let rows: Vec<String> = table.layers().into_iter().map(str::to_string).collect();
        let row_of: HashMap<String, usize> =
            rows.iter().enumerate().map(|(i, r)| (r.clone(), i)).collect();
        let row_labels = rows.iter().map(|r| clean_layer_name(r)).collect();

        let mut series: Vec<Series> = Direction::ALL
            .into_iter()
            .flat_map(|direction| {
                [false, true].into_iter().map(move |weight_tensor| Series {
                    direction,
                    weight_tensor,
                    color: direction_color(direction),
                    marker: marker_for(weight_tensor),
                    points: Vec::new(),
                })
            })
            .collect();
        for row in table.rows() {
            let Some(x) = row.value(metric).filter(|&x| visible(x)) else {
                continue;
            };
            let slot = match row.direction {
                Direction::Fwd => 0,
                Direction::Bwd => 2,
            } + usize::from(row.weight_tensor);
            series[slot].points.push((x, row_of[row.layer.as_str()]));
        }

        let reference_lines = reference_lines(rows.len() as f64 + LABEL_OFFSET);
        let auto = autoscale(
            series
                .iter()
                .flat_map(|s| s.points.iter().map(|p| p.0))
                .chain(reference_lines.iter().map(|l| l.x)),
        );
        let x_range = (layers.xmin.unwrap_or(auto.0), layers.xmax.unwrap_or(auto.1));
        if x_range.0 >= x_range.1 {
            return Err(PlotError::InvalidRange { xmin: x_range.0, xmax: x_range.1 });
        }

        let mut chart = Self {
            title: title.to_string(),
            metric,
            rows,
            row_labels,
            series,
            reference_lines,
            error_bars: Vec::new(),
            arrows: Vec::new(),
            legend: legend(),
            x_range,
        };
        if layers.arrows {
            chart.arrows = chart.layout_arrows(graph, &row_of, layers.zero_tensors);
        }
        if layers.error_bars {
            chart.error_bars = chart.layout_error_bars(graph, &row_of);
        }
        Ok(chart)
    }

    fn layout_arrows(
        &self,
        graph: &ScalesGraph,
        row_of: &HashMap<String, usize>,
        show_zero: bool,
    ) -> Vec<Arrow> {
        let min_scale = self.x_range.0;
        let mut arrows = Vec::new();
        for consumer in graph.node_indices() {
            let node = &graph[consumer];
            if node.is_output() {
                continue;
            }
            for direction in Direction::ALL {
                for operand in operands(graph, consumer) {
                    let arg = &graph[operand];
                    let (Some(a), Some(b)) =
                        (node.metrics.get(direction), arg.metrics.get(direction))
                    else {
                        continue;
                    };
                    let (mut a_x, mut b_x) = (a.get(self.metric), b.get(self.metric));
                    let a_y = row_of[node.name.as_str()] as f64;
                    let b_y = row_of[arg.name.as_str()] as f64;

                    if !a_x.is_finite() {
                        warn!("Node '{}' is {}. Plotting as 0", node.name, a_x);
                    }
                    if a_x == 0.0 || !a_x.is_finite() {
                        a_x = min_scale;
                    }
                    let mut label = None;
                    if !b_x.is_finite() {
                        warn!("Node '{}' is {}. Plotting as 0", arg.name, b_x);
                    }
                    if b_x == 0.0 || !b_x.is_finite() {
                        b_x = min_scale;
                        label = Some("0".to_string());
                    }
                    if label.is_some() && !show_zero {
                        continue;
                    }

                    // Gradients flow from consumer back to operand.
                    let (from, to) = match direction {
                        Direction::Fwd => ((b_x, b_y), (a_x, a_y)),
                        Direction::Bwd => ((a_x, a_y), (b_x, b_y)),
                    };
                    let color = direction_color(direction);
                    arrows.push(Arrow { direction, from, to, color, label });
                }
            }
        }
        arrows
    }

    fn layout_error_bars(
        &self,
        graph: &ScalesGraph,
        row_of: &HashMap<String, usize>,
    ) -> Vec<ErrorBar> {
        let mut bars = Vec::new();
        for node in graph.node_weights().filter(|n| !n.is_output()) {
            for direction in Direction::ALL {
                let Some(stats) = node.metrics.get(direction) else {
                    continue;
                };
                let row = row_of[node.name.as_str()];
                let offset = match direction {
                    Direction::Fwd => -ERROR_BAR_OFFSET,
                    Direction::Bwd => ERROR_BAR_OFFSET,
                };
                bars.push(ErrorBar {
                    direction,
                    row,
                    y: row as f64 + offset,
                    x_min: stats.abs_min,
                    x_max: stats.abs_max,
                    cap: ERROR_BAR_CAP,
                    color: direction_color(direction)
                        .lighten(color::ERROR_BAR_LIGHTNESS, color::ERROR_BAR_SATURATION),
                });
            }
        }
        bars
    }

    /// Number of rows (the chart's height in row units).
    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn series_for(&self, direction: Direction, weight_tensor: bool) -> Option<&Series> {
        self.series.iter().find(|s| s.direction == direction && s.weight_tensor == weight_tensor)
    }
}

fn legend() -> Vec<LegendEntry> {
    let entry = |key: &str, legend_key| LegendEntry {
        label: legend_label(key).unwrap_or(key).to_string(),
        key: legend_key,
    };
    vec![
        entry("fwd", LegendKey::Line(color::FORWARD)),
        entry("bwd", LegendKey::Line(color::BACKWARD)),
        entry("False", LegendKey::Marker(MarkerShape::Dot)),
        entry("True", LegendKey::Marker(MarkerShape::TriangleDown)),
    ]
}
