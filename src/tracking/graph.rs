//! The annotated graph produced by [`ScaleTracker`](super::ScaleTracker).
//!
//! A `petgraph` stable graph: node indices survive removals, so the pruning
//! passes can drop nodes without renumbering. Edges run operand -> consumer
//! and carry the argument position.

use crate::asg::{DType, Shape, OUTPUT_NODE_NAME};
use crate::metrics::Metrics;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction as EdgeDirection;
use serde::{Deserialize, Serialize};

/// One tensor of a tracked model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleNode {
    pub name: String,
    /// Op that produced the tensor (`linear`, `parameter`, ...).
    pub op: String,
    pub is_weight: bool,
    /// `None` only for the terminal `output` node.
    pub dtype: Option<DType>,
    pub shape: Option<Shape>,
    pub metrics: Metrics,
}

impl ScaleNode {
    pub fn is_output(&self) -> bool {
        self.name == OUTPUT_NODE_NAME
    }

    /// Whether the node produces a floating-point tensor.
    pub fn is_float(&self) -> bool {
        self.dtype.map_or(false, DType::is_float)
    }

    pub(crate) fn output() -> Self {
        Self {
            name: OUTPUT_NODE_NAME.to_string(),
            op: OUTPUT_NODE_NAME.to_string(),
            is_weight: false,
            dtype: None,
            shape: None,
            metrics: Metrics::default(),
        }
    }
}

pub type ScalesGraph = StableDiGraph<ScaleNode, usize>;

/// Operands of `node`, in argument order.
pub fn operands(graph: &ScalesGraph, node: NodeIndex) -> Vec<NodeIndex> {
    let mut edges: Vec<_> = graph
        .edges_directed(node, EdgeDirection::Incoming)
        .map(|e| (*e.weight(), e.source()))
        .collect();
    edges.sort_by_key(|&(position, _)| position);
    edges.into_iter().map(|(_, source)| source).collect()
}

/// `(consumer, argument position)` pairs reading `node`.
pub fn consumers(graph: &ScalesGraph, node: NodeIndex) -> Vec<(NodeIndex, usize)> {
    let mut out: Vec<_> = graph
        .edges_directed(node, EdgeDirection::Outgoing)
        .map(|e| (e.target(), *e.weight()))
        .collect();
    out.sort();
    out
}

pub fn find_node(graph: &ScalesGraph, name: &str) -> Option<NodeIndex> {
    graph.node_indices().find(|&i| graph[i].name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str) -> ScaleNode {
        ScaleNode {
            name: name.to_string(),
            op: "relu".to_string(),
            is_weight: false,
            dtype: Some(DType::F32),
            shape: Some(vec![2]),
            metrics: Metrics::default(),
        }
    }

    #[test]
    fn operands_follow_argument_order() {
        let mut g = ScalesGraph::default();
        let a = g.add_node(node("a"));
        let b = g.add_node(node("b"));
        let c = g.add_node(node("c"));
        g.add_edge(b, c, 1);
        g.add_edge(a, c, 0);
        assert_eq!(operands(&g, c), vec![a, b]);
        assert_eq!(consumers(&g, a), vec![(c, 0)]);
        assert_eq!(find_node(&g, "b"), Some(b));
    }

    #[test]
    fn output_node_is_not_float() {
        let out = ScaleNode::output();
        assert!(out.is_output());
        assert!(!out.is_float());
        assert!(node("x").is_float());
    }
}
