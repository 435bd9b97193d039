//! ASG: Abstract Semantic Graph
//!
//! The symbolic description of a model. Nodes are appended in the order the
//! model builds them, so insertion order is always a valid topological order
//! and `NodeId` doubles as the position in [`Asg::nodes`].

use ndarray::ArrayD;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use thiserror::Error;

/// Node identifier (index into the graph's node list).
pub type NodeId = usize;
/// Tensor shape.
pub type Shape = Vec<usize>;

pub type AsgResult<T> = std::result::Result<T, AsgError>;

/// Name reserved for the synthetic terminal node of a tracked graph.
pub const OUTPUT_NODE_NAME: &str = "output";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AsgError {
    #[error("Node with ID {0} not found")]
    NodeNotFound(NodeId),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    F32,
    I64,
}

impl DType {
    pub fn is_float(self) -> bool {
        matches!(self, DType::F32)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DType::F32 => "f32",
            DType::I64 => "i64",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    /// Unique display name, e.g. `relu_1` or `linear_weight`.
    pub name: String,
    pub node_type: NodeType,
    /// Declared element type. Only inputs carry one; everything else is
    /// known once the graph has been evaluated.
    pub dtype: Option<DType>,
}

impl Node {
    /// Operand ids in argument order.
    pub fn inputs(&self) -> Vec<NodeId> {
        self.node_type.inputs()
    }

    pub fn is_parameter(&self) -> bool {
        matches!(self.node_type, NodeType::Parameter { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeType {
    // Data
    Input { name: String },
    Parameter { name: String },
    Literal(ArrayD<f32>),

    // Binary, with numpy broadcasting
    Add(NodeId, NodeId),
    Subtract(NodeId, NodeId),
    Multiply(NodeId, NodeId),
    /// Matrix product over the last two axes. The right operand must be 2-D.
    MatrixMultiply(NodeId, NodeId),

    // Unary
    Scale(NodeId, f32),
    ReLU(NodeId),
    GELU(NodeId),
    Sigmoid(NodeId),
    Tanh(NodeId),
    Softmax(NodeId), // over the last axis

    // Reductions over all elements, producing a scalar
    Sum(NodeId),
    Mean(NodeId),

    // Views
    /// Target shape may contain a single `-1`.
    Reshape(NodeId, Vec<isize>),
    Transpose(NodeId, usize, usize),

    // Layers
    /// `input @ weight^T + bias`, `weight: [out, in]`.
    Linear { input: NodeId, weight: NodeId, bias: Option<NodeId> },
    /// Row lookup of integer `ids` in `table: [vocab, dim]`.
    Embedding { ids: NodeId, table: NodeId },
    /// Mean softmax cross-entropy of `logits: [n, classes]` against integer `labels: [n]`.
    CrossEntropy { logits: NodeId, labels: NodeId },
}

impl NodeType {
    pub fn inputs(&self) -> Vec<NodeId> {
        match self {
            NodeType::Input { .. } | NodeType::Parameter { .. } | NodeType::Literal(_) => vec![],

            NodeType::Add(a, b)
            | NodeType::Subtract(a, b)
            | NodeType::Multiply(a, b)
            | NodeType::MatrixMultiply(a, b) => vec![*a, *b],

            NodeType::Scale(a, _)
            | NodeType::ReLU(a)
            | NodeType::GELU(a)
            | NodeType::Sigmoid(a)
            | NodeType::Tanh(a)
            | NodeType::Softmax(a)
            | NodeType::Sum(a)
            | NodeType::Mean(a)
            | NodeType::Reshape(a, _)
            | NodeType::Transpose(a, _, _) => vec![*a],

            NodeType::Linear { input, weight, bias } => {
                let mut ids = vec![*input, *weight];
                ids.extend(bias);
                ids
            }
            NodeType::Embedding { ids, table } => vec![*ids, *table],
            NodeType::CrossEntropy { logits, labels } => vec![*logits, *labels],
        }
    }

    /// Base name used when naming op nodes (`relu`, `linear`, ...).
    pub fn op_name(&self) -> &'static str {
        match self {
            NodeType::Input { .. } => "input",
            NodeType::Parameter { .. } => "parameter",
            NodeType::Literal(_) => "literal",
            NodeType::Add(..) => "add",
            NodeType::Subtract(..) => "sub",
            NodeType::Multiply(..) => "mul",
            NodeType::MatrixMultiply(..) => "matmul",
            NodeType::Scale(..) => "scale",
            NodeType::ReLU(_) => "relu",
            NodeType::GELU(_) => "gelu",
            NodeType::Sigmoid(_) => "sigmoid",
            NodeType::Tanh(_) => "tanh",
            NodeType::Softmax(_) => "softmax",
            NodeType::Sum(_) => "sum",
            NodeType::Mean(_) => "mean",
            NodeType::Reshape(..) => "view",
            NodeType::Transpose(..) => "transpose",
            NodeType::Linear { .. } => "linear",
            NodeType::Embedding { .. } => "embedding",
            NodeType::CrossEntropy { .. } => "cross_entropy",
        }
    }
}

/// Runtime value of a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    F32(ArrayD<f32>),
    I64(ArrayD<i64>),
}

impl Value {
    pub fn dtype(&self) -> DType {
        match self {
            Value::F32(_) => DType::F32,
            Value::I64(_) => DType::I64,
        }
    }

    pub fn shape(&self) -> &[usize] {
        match self {
            Value::F32(a) => a.shape(),
            Value::I64(a) => a.shape(),
        }
    }

    pub fn as_f32(&self) -> Option<&ArrayD<f32>> {
        match self {
            Value::F32(a) => Some(a),
            Value::I64(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<&ArrayD<i64>> {
        match self {
            Value::I64(a) => Some(a),
            Value::F32(_) => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Asg {
    pub nodes: Vec<Node>,
    /// Next suffix to try for each base name.
    name_counts: HashMap<String, usize>,
    /// Every name handed out so far.
    taken: HashSet<String>,
}

impl Asg {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a node. Named data nodes keep their (sanitised) name; op nodes
    /// are named after the op. Collisions get a `_N` suffix.
    pub fn add_node(
        &mut self,
        name: Option<&str>,
        node_type: NodeType,
        dtype: Option<DType>,
    ) -> NodeId {
        let base = match name {
            Some(n) => n.replace('.', "_"),
            None => node_type.op_name().to_string(),
        };
        let name = self.unique_name(&base);
        let id = self.nodes.len();
        self.nodes.push(Node { id, name, node_type, dtype });
        id
    }

    fn unique_name(&mut self, base: &str) -> String {
        let count = self.name_counts.entry(base.to_string()).or_insert(0);
        loop {
            let name = if *count == 0 { base.to_string() } else { format!("{}_{}", base, count) };
            *count += 1;
            // `output` belongs to the terminal node of a tracked graph.
            if name != OUTPUT_NODE_NAME && self.taken.insert(name.clone()) {
                return name;
            }
        }
    }

    pub fn get_node(&self, id: NodeId) -> AsgResult<&Node> {
        self.nodes.get(id).ok_or(AsgError::NodeNotFound(id))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Ids of the nodes consuming `id`, in graph order.
    pub fn consumers(&self, id: NodeId) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| n.inputs().contains(&id))
            .map(|n| n.id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn op_nodes_get_suffixed_names() {
        let mut asg = Asg::new();
        let x = asg.add_node(Some("x"), NodeType::Input { name: "x".into() }, Some(DType::F32));
        let a = asg.add_node(None, NodeType::ReLU(x), None);
        let b = asg.add_node(None, NodeType::ReLU(a), None);
        let c = asg.add_node(None, NodeType::ReLU(b), None);

        let names: Vec<_> = asg.nodes.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, ["x", "relu", "relu_1", "relu_2"]);
        assert_eq!(asg.consumers(a), vec![b]);
        assert_eq!(asg.get_node(c).unwrap().inputs(), vec![b]);
    }

    #[test]
    fn explicit_suffixed_names_are_skipped() {
        let mut asg = Asg::new();
        let x = asg.add_node(Some("relu_1"), NodeType::Input { name: "relu_1".into() }, None);
        let a = asg.add_node(None, NodeType::ReLU(x), None);
        asg.add_node(None, NodeType::ReLU(a), None);
        asg.add_node(Some("relu.2"), NodeType::Input { name: "relu.2".into() }, None);

        let names: Vec<_> = asg.nodes.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, ["relu_1", "relu", "relu_2", "relu_2_1"]);
    }

    #[test]
    fn parameter_paths_are_flattened() {
        let mut asg = Asg::new();
        let param = NodeType::Parameter { name: "linear.weight".into() };
        asg.add_node(Some("linear.weight"), param, None);
        assert_eq!(asg.nodes[0].name, "linear_weight");
    }

    #[test]
    fn output_name_is_never_handed_out() {
        let mut asg = Asg::new();
        asg.add_node(Some("output"), NodeType::Input { name: "output".into() }, Some(DType::F32));
        assert_eq!(asg.nodes[0].name, "output_1");
    }

    #[test]
    fn linear_inputs_include_optional_bias() {
        let with_bias = NodeType::Linear { input: 0, weight: 1, bias: Some(2) };
        let without = NodeType::Linear { input: 0, weight: 1, bias: None };
        assert_eq!(with_bias.inputs(), vec![0, 1, 2]);
        assert_eq!(without.inputs(), vec![0, 1]);
        assert!(matches!(Asg::new().get_node(3), Err(AsgError::NodeNotFound(3))));
    }
}
