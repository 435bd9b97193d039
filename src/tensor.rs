//! Module defining `Tensor` and `GraphContext`.
//!
//! `Tensor` is not a data container. It is a lightweight handle to a node of
//! the Abstract Semantic Graph (ASG): every operation on it appends a node to
//! the graph instead of computing anything. Real values only exist once the
//! graph is evaluated by the [`runtime`](crate::runtime) interpreter.
//!
//! `GraphContext` owns the graph under construction together with the
//! initial values of its parameters.

use crate::asg::{Asg, DType, NodeId, NodeType};
use ndarray::ArrayD;
use std::cell::RefCell;
use std::collections::HashMap;
use std::ops::{Add, Mul, Sub};
use std::rc::Rc;

/// Owns one ASG and the values its `Parameter` nodes start from.
///
/// Wrapped in `Rc<RefCell<>>` so that many `Tensor` handles can share it.
#[derive(Debug, Clone, Default)]
pub struct GraphContext {
    main_graph: Asg,
    parameters: HashMap<String, ArrayD<f32>>,
}

impl GraphContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience for the `Rc<RefCell<>>` wrapping every caller needs.
    pub fn shared() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self::new()))
    }

    pub fn main_graph_mut(&mut self) -> &mut Asg {
        &mut self.main_graph
    }

    pub fn main_graph(&self) -> &Asg {
        &self.main_graph
    }

    /// Parameter values keyed by their dotted path (`linear.weight`).
    pub fn parameters(&self) -> &HashMap<String, ArrayD<f32>> {
        &self.parameters
    }

    pub fn set_parameter(&mut self, name: &str, value: ArrayD<f32>) {
        self.parameters.insert(name.to_string(), value);
    }
}

/// Symbolic handle to a node of the graph.
///
/// Holds no data: just the node ID and the context the node lives in.
#[derive(Debug, Clone)]
pub struct Tensor {
    pub node_id: NodeId,
    pub context: Rc<RefCell<GraphContext>>,
}

impl Tensor {
    /// Creates an input node. Values are fed by name at execution time.
    pub fn new_input(context: &Rc<RefCell<GraphContext>>, name: &str, dtype: DType) -> Self {
        let node_id = context.borrow_mut().main_graph_mut().add_node(
            Some(name),
            NodeType::Input { name: name.to_string() },
            Some(dtype),
        );
        Self { node_id, context: Rc::clone(context) }
    }

    /// Creates a trainable parameter with its initial value.
    pub fn new_parameter(
        context: &Rc<RefCell<GraphContext>>,
        name: &str,
        value: ArrayD<f32>,
    ) -> Self {
        let mut ctx = context.borrow_mut();
        let node_id = ctx.main_graph_mut().add_node(
            Some(name),
            NodeType::Parameter { name: name.to_string() },
            Some(DType::F32),
        );
        ctx.set_parameter(name, value);
        Self { node_id, context: Rc::clone(context) }
    }

    /// Embeds constant data directly in the graph.
    pub fn new_literal(context: &Rc<RefCell<GraphContext>>, data: ArrayD<f32>, name: &str) -> Self {
        let node_id = context.borrow_mut().main_graph_mut().add_node(
            Some(name),
            NodeType::Literal(data),
            Some(DType::F32),
        );
        Self { node_id, context: Rc::clone(context) }
    }

    fn push(&self, node_type: NodeType) -> Self {
        let node_id = self.context.borrow_mut().main_graph_mut().add_node(None, node_type, None);
        Self { node_id, context: Rc::clone(&self.context) }
    }

    /// Display name the node was registered under.
    pub fn name(&self) -> String {
        self.context.borrow().main_graph().nodes[self.node_id].name.clone()
    }

    // --- Math ---

    pub fn dot(&self, other: &Tensor) -> Self {
        self.push(NodeType::MatrixMultiply(self.node_id, other.node_id))
    }

    pub fn scale(&self, factor: f32) -> Self {
        self.push(NodeType::Scale(self.node_id, factor))
    }

    // --- Activations ---

    pub fn relu(&self) -> Self {
        self.push(NodeType::ReLU(self.node_id))
    }

    pub fn gelu(&self) -> Self {
        self.push(NodeType::GELU(self.node_id))
    }

    pub fn sigmoid(&self) -> Self {
        self.push(NodeType::Sigmoid(self.node_id))
    }

    pub fn tanh(&self) -> Self {
        self.push(NodeType::Tanh(self.node_id))
    }

    pub fn softmax(&self) -> Self {
        self.push(NodeType::Softmax(self.node_id))
    }

    // --- Reductions ---

    pub fn sum(&self) -> Self {
        self.push(NodeType::Sum(self.node_id))
    }

    pub fn mean(&self) -> Self {
        self.push(NodeType::Mean(self.node_id))
    }

    // --- Views ---

    /// Reshape; one dimension may be `-1`.
    pub fn view(&self, shape: &[isize]) -> Self {
        self.push(NodeType::Reshape(self.node_id, shape.to_vec()))
    }

    pub fn transpose(&self, axis1: usize, axis2: usize) -> Self {
        self.push(NodeType::Transpose(self.node_id, axis1, axis2))
    }

    // --- Layer primitives ---

    pub fn linear(&self, weight: &Tensor, bias: Option<&Tensor>) -> Self {
        self.push(NodeType::Linear {
            input: self.node_id,
            weight: weight.node_id,
            bias: bias.map(|b| b.node_id),
        })
    }

    /// Looks the integer ids in `self` up in `table`.
    pub fn embed(&self, table: &Tensor) -> Self {
        self.push(NodeType::Embedding { ids: self.node_id, table: table.node_id })
    }

    pub fn cross_entropy(&self, labels: &Tensor) -> Self {
        self.push(NodeType::CrossEntropy { logits: self.node_id, labels: labels.node_id })
    }
}

// Operator overloads for `&a + &b` style graph building.

impl Add<&Tensor> for &Tensor {
    type Output = Tensor;
    fn add(self, rhs: &Tensor) -> Self::Output {
        self.push(NodeType::Add(self.node_id, rhs.node_id))
    }
}

impl Sub<&Tensor> for &Tensor {
    type Output = Tensor;
    fn sub(self, rhs: &Tensor) -> Self::Output {
        self.push(NodeType::Subtract(self.node_id, rhs.node_id))
    }
}

impl Mul<&Tensor> for &Tensor {
    type Output = Tensor;
    fn mul(self, rhs: &Tensor) -> Self::Output {
        self.push(NodeType::Multiply(self.node_id, rhs.node_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    #[test]
    fn ops_append_nodes_in_build_order() {
        let ctx = GraphContext::shared();
        let x = Tensor::new_input(&ctx, "x", DType::F32);
        let w = Tensor::new_parameter(&ctx, "layer.weight", ArrayD::zeros(IxDyn(&[2, 3])));
        let y = x.linear(&w, None).relu();
        let z = &y + &y;

        let graph = ctx.borrow().main_graph().clone();
        let names: Vec<_> = graph.nodes.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, ["x", "layer_weight", "linear", "relu", "add"]);
        assert_eq!(graph.nodes[z.node_id].inputs(), vec![y.node_id, y.node_id]);
        assert!(ctx.borrow().parameters().contains_key("layer.weight"));
    }
}
