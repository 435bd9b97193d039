//! Flattening of a [`ScalesGraph`] into a table.
//!
//! Every tensor yields two rows, forward then backward, in graph order. The
//! terminal `output` node is skipped. Missing statistics (typically the
//! backward pass was never run) leave the metric cells empty.

use crate::metrics::{Direction, MetricName, Stats};
use crate::tracking::ScalesGraph;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity columns, followed by one column per metric (full name).
const ID_COLUMNS: [&str; 4] = ["layer", "weight tensor", "direction", "tensor type"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatRow {
    pub layer: String,
    #[serde(rename = "weight tensor")]
    pub weight_tensor: bool,
    pub direction: Direction,
    #[serde(rename = "tensor type")]
    pub tensor_type: String,
    #[serde(rename = "mean absolute value")]
    pub mean_abs: Option<f64>,
    #[serde(rename = "absolute mean value")]
    pub abs_mean: Option<f64>,
    #[serde(rename = "standard deviation")]
    pub std: Option<f64>,
    #[serde(rename = "absolute max value")]
    pub abs_max: Option<f64>,
    #[serde(rename = "absolute min value")]
    pub abs_min: Option<f64>,
    #[serde(rename = "number of elements")]
    pub numel: Option<usize>,
}

impl FlatRow {
    fn new(layer: &str, weight_tensor: bool, direction: Direction, stats: Option<&Stats>) -> Self {
        let get = |m: MetricName| stats.map(|s| s.get(m));
        Self {
            layer: layer.to_string(),
            weight_tensor,
            direction,
            tensor_type: tensor_type(direction, weight_tensor),
            mean_abs: get(MetricName::MeanAbs),
            abs_mean: get(MetricName::AbsMean),
            std: get(MetricName::Std),
            abs_max: get(MetricName::AbsMax),
            abs_min: get(MetricName::AbsMin),
            numel: stats.map(|s| s.numel),
        }
    }

    pub fn value(&self, metric: MetricName) -> Option<f64> {
        match metric {
            MetricName::MeanAbs => self.mean_abs,
            MetricName::AbsMean => self.abs_mean,
            MetricName::Std => self.std,
            MetricName::AbsMax => self.abs_max,
            MetricName::AbsMin => self.abs_min,
            MetricName::Numel => self.numel.map(|n| n as f64),
        }
    }
}

/// `x`, `w`, `grad_x` or `grad_w`.
pub fn tensor_type(direction: Direction, weight_tensor: bool) -> String {
    let prefix = match direction {
        Direction::Fwd => "",
        Direction::Bwd => "grad_",
    };
    format!("{}{}", prefix, if weight_tensor { "w" } else { "x" })
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Table {
    rows: Vec<FlatRow>,
}

impl Table {
    pub fn rows(&self) -> &[FlatRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn columns() -> Vec<&'static str> {
        ID_COLUMNS
            .into_iter()
            .chain(MetricName::ALL.iter().map(|m| m.full_name()))
            .collect()
    }

    /// Distinct layer names in first-seen order.
    pub fn layers(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for row in &self.rows {
            if !seen.contains(&row.layer.as_str()) {
                seen.push(row.layer.as_str());
            }
        }
        seen
    }

    pub fn column(&self, metric: MetricName) -> Vec<Option<f64>> {
        self.rows.iter().map(|r| r.value(metric)).collect()
    }

    /// Records as a JSON array of objects keyed by column name.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.rows)
    }
}

pub fn graph_to_table(graph: &ScalesGraph) -> Table {
    let mut rows = Vec::new();
    for idx in graph.node_indices() {
        let node = &graph[idx];
        if node.is_output() {
            continue;
        }
        for direction in Direction::ALL {
            let stats = node.metrics.get(direction);
            rows.push(FlatRow::new(&node.name, node.is_weight, direction, stats));
        }
    }
    Table { rows }
}

fn cell(value: Option<f64>) -> String {
    match value {
        None => "-".to_string(),
        Some(v) if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e9 => format!("{}", v as i64),
        Some(v) => format!("{:.4e}", v),
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let header = Table::columns();
        let body: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|r| {
                let mut cells = vec![
                    r.layer.clone(),
                    r.weight_tensor.to_string(),
                    r.direction.to_string(),
                    r.tensor_type.clone(),
                ];
                cells.extend(MetricName::ALL.iter().map(|&m| cell(r.value(m))));
                cells
            })
            .collect();

        let widths: Vec<usize> = header
            .iter()
            .enumerate()
            .map(|(i, h)| body.iter().map(|row| row[i].len()).fold(h.len(), usize::max))
            .collect();

        let line = |f: &mut fmt::Formatter<'_>, cells: &[&str]| -> fmt::Result {
            let padded: Vec<String> = cells
                .iter()
                .zip(&widths)
                .enumerate()
                // text columns left-aligned, numbers right-aligned
                .map(|(i, (c, &w))| {
                    if i < ID_COLUMNS.len() {
                        format!("{:<w$}", c)
                    } else {
                        format!("{:>w$}", c)
                    }
                })
                .collect();
            writeln!(f, "{}", padded.join("  ").trim_end())
        };

        line(f, &header)?;
        for row in &body {
            let cells: Vec<&str> = row.iter().map(String::as_str).collect();
            line(f, &cells)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asg::DType;
    use crate::metrics::Metrics;
    use crate::tracking::ScaleNode;

    fn graph() -> ScalesGraph {
        let mut g = ScalesGraph::default();
        let x = g.add_node(ScaleNode {
            name: "x".into(),
            op: "input".into(),
            is_weight: false,
            dtype: Some(DType::F32),
            shape: Some(vec![2]),
            metrics: Metrics { fwd: Some(Stats::from_values([1.0, -3.0])), bwd: None },
        });
        let w = g.add_node(ScaleNode {
            name: "w".into(),
            op: "parameter".into(),
            is_weight: true,
            dtype: Some(DType::F32),
            shape: Some(vec![2]),
            metrics: Metrics {
                fwd: Some(Stats::from_values([0.5, 0.5])),
                bwd: Some(Stats::from_values([1.0, -3.0])),
            },
        });
        let out = g.add_node(ScaleNode::output());
        g.add_edge(x, out, 0);
        g.add_edge(w, out, 1);
        g
    }

    #[test]
    fn two_rows_per_node_without_output() {
        let table = graph_to_table(&graph());
        assert_eq!(table.len(), 4);
        let kinds: Vec<_> =
            table.rows().iter().map(|r| (r.direction, r.tensor_type.as_str())).collect();
        assert_eq!(
            kinds,
            [
                (Direction::Fwd, "x"),
                (Direction::Bwd, "grad_x"),
                (Direction::Fwd, "w"),
                (Direction::Bwd, "grad_w"),
            ]
        );
        assert_eq!(table.layers(), ["x", "w"]);
    }

    #[test]
    fn missing_backward_gives_empty_cells() {
        let table = graph_to_table(&graph());
        assert_eq!(table.column(MetricName::MeanAbs), [Some(2.0), None, Some(0.5), Some(2.0)]);
        assert_eq!(table.rows()[1].numel, None);
    }

    #[test]
    fn json_uses_column_names() {
        let json = graph_to_table(&graph()).to_json().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        let first = parsed[0].as_object().unwrap();
        let keys: Vec<_> = first.keys().map(String::as_str).collect();
        for column in Table::columns() {
            assert!(keys.contains(&column), "missing {column}");
        }
        assert_eq!(parsed[1]["tensor type"], "grad_x");
        assert!(parsed[1]["mean absolute value"].is_null());
    }

    #[test]
    fn display_renders_header_and_rows() {
        let text = graph_to_table(&graph()).to_string();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[0].starts_with("layer"));
        assert!(lines[0].contains("number of elements"));
        assert!(lines[2].contains("grad_x"));
    }
}
