//! Pruning passes over a [`ScalesGraph`].
//!
//! Both passes are pure: they clone the graph, drop nodes from the clone and
//! return it. The terminal `output` node is never removed.

use crate::metrics::{MetricName, Stats};
use crate::tracking::{consumers, operands, ScalesGraph};
use log::debug;

/// Default relative tolerance for [`prune_same_scale_tensors`].
pub const SAME_SCALE_RTOL: f64 = 1.0 / 65536.0; // 2^-16

/// Removes every node whose tensor is not floating point (token ids, labels,
/// ...). Edges touching a removed node disappear with it.
pub fn prune_non_float_tensors(graph: &ScalesGraph) -> ScalesGraph {
    let mut pruned = graph.clone();
    let doomed: Vec<_> = pruned
        .node_indices()
        .filter(|&i| !pruned[i].is_output() && !pruned[i].is_float())
        .collect();
    for idx in &doomed {
        pruned.remove_node(*idx);
    }
    debug!("pruned {} non-float tensors", doomed.len());
    pruned
}

/// Removes nodes that leave the scale of one of their operands unchanged
/// (views, transposes, identity-like ops).
///
/// A node goes when an operand has the same forward statistics within `rtol`
/// and the same backward statistics (both absent, or both present and equal
/// within `rtol`). Weights are kept. Consumers of a removed node are rewired
/// to that operand at the same argument position.
pub fn prune_same_scale_tensors(graph: &ScalesGraph, rtol: f64) -> ScalesGraph {
    let mut pruned = graph.clone();
    let order: Vec<_> = pruned.node_indices().collect();
    let mut removed = 0;

    for node in order {
        if pruned[node].is_output() || pruned[node].is_weight {
            continue;
        }
        let same = operands(&pruned, node).into_iter().find(|&arg| {
            let (a, b) = (&pruned[node].metrics, &pruned[arg].metrics);
            match (a.fwd, b.fwd) {
                (Some(x), Some(y)) if same_scale(&x, &y, rtol) => match (a.bwd, b.bwd) {
                    (None, None) => true,
                    (Some(x), Some(y)) => same_scale(&x, &y, rtol),
                    _ => false,
                },
                _ => false,
            }
        });
        let Some(arg) = same else {
            continue;
        };
        for (consumer, position) in consumers(&pruned, node) {
            pruned.add_edge(arg, consumer, position);
        }
        pruned.remove_node(node);
        removed += 1;
    }
    debug!("pruned {} same-scale tensors", removed);
    pruned
}

fn same_scale(a: &Stats, b: &Stats, rtol: f64) -> bool {
    MetricName::ALL
        .into_iter()
        .filter(|&m| m != MetricName::Numel)
        .all(|m| is_close(a.get(m), b.get(m), rtol))
}

fn is_close(a: f64, b: f64, rtol: f64) -> bool {
    if a.is_nan() || b.is_nan() {
        return a.is_nan() && b.is_nan();
    }
    a == b || (a - b).abs() <= rtol * a.abs().max(b.abs())
}
