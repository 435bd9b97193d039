//! Autograd: d(loss)/d(node) for every floating-point node of a graph.
//!
//! Algorithm:
//!  - seed d(loss)/d(loss) = 1;
//!  - walk the graph in reverse insertion order (reverse topological order);
//!  - for every node holding an upstream gradient, compute the contribution
//!    to each operand and accumulate it (sum);
//!  - where an operand was broadcast, reduce the contribution back to its
//!    shape with `reduce_sum_to`.
//!
//! Gradients are computed eagerly from the forward values in the memo, so the
//! result is a value per node rather than a second graph. Integer nodes
//! (token ids, labels) never receive a gradient.

use crate::asg::{Asg, AsgError, NodeId, NodeType, Value};
use crate::runtime::kernels::{
    cross_entropy_probs, from_matrix, gelu_derivative, reduce_sum_to, to_matrix,
};
use crate::runtime::{Memo, RuntimeError};
use ndarray::{ArrayD, Axis, IxDyn, Zip};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AutogradError {
    #[error("ASG: {0}")]
    Asg(#[from] AsgError),
    #[error("runtime: {0}")]
    Runtime(#[from] RuntimeError),
    #[error("memo holds {memo} values but the graph has {graph} nodes")]
    MemoMismatch { memo: usize, graph: usize },
    #[error("loss node {0} is not a floating-point tensor")]
    NonFloatLoss(NodeId),
    #[error("node {0} feeds a floating-point op but holds integers")]
    NonFloatOperand(NodeId),
    #[error("loss must be a scalar, got shape {0:?}")]
    NonScalarLoss(Vec<usize>),
}

pub type AutogradResult<T> = Result<T, AutogradError>;

/// Gradient values indexed by node id.
#[derive(Debug, Clone, Default)]
pub struct Gradients {
    grads: Vec<Option<ArrayD<f32>>>,
}

impl Gradients {
    pub fn get(&self, id: NodeId) -> Option<&ArrayD<f32>> {
        self.grads.get(id).and_then(Option::as_ref)
    }

    /// Looks a gradient up by the display name of its node.
    pub fn by_name<'a>(&'a self, asg: &Asg, name: &str) -> Option<&'a ArrayD<f32>> {
        asg.nodes.iter().find(|n| n.name == name).and_then(|n| self.get(n.id))
    }

    /// `(node, gradient)` pairs in graph order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &ArrayD<f32>)> {
        self.grads.iter().enumerate().filter_map(|(id, g)| g.as_ref().map(|g| (id, g)))
    }

    pub fn len(&self) -> usize {
        self.grads.iter().filter(|g| g.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn accumulate(&mut self, memo: &Memo, id: NodeId, grad: ArrayD<f32>) -> AutogradResult<()> {
        let Some(Value::F32(value)) = memo.get(id) else {
            return Ok(());
        };
        let grad = reduce_sum_to(grad, value.shape())?;
        match &mut self.grads[id] {
            Some(acc) => *acc += &grad,
            slot @ None => *slot = Some(grad),
        }
        Ok(())
    }
}

fn float(memo: &Memo, id: NodeId) -> AutogradResult<&ArrayD<f32>> {
    memo[id].as_f32().ok_or(AutogradError::NonFloatOperand(id))
}

/// Runs the reverse pass for `loss` over a graph already evaluated into `memo`.
pub fn backward(asg: &Asg, memo: &Memo, loss: NodeId) -> AutogradResult<Gradients> {
    if memo.len() != asg.len() {
        return Err(AutogradError::MemoMismatch { memo: memo.len(), graph: asg.len() });
    }
    asg.get_node(loss)?;
    let loss_value = memo[loss].as_f32().ok_or(AutogradError::NonFloatLoss(loss))?;
    if loss_value.len() != 1 {
        return Err(AutogradError::NonScalarLoss(loss_value.shape().to_vec()));
    }

    let mut grads = Gradients { grads: vec![None; asg.len()] };
    grads.grads[loss] = Some(ArrayD::ones(loss_value.raw_dim()));

    for node in asg.nodes[..=loss].iter().rev() {
        let Some(g) = grads.grads[node.id].clone() else {
            continue;
        };
        let f = |id: NodeId| float(memo, id);
        let out = || float(memo, node.id);

        match &node.node_type {
            NodeType::Input { .. } | NodeType::Parameter { .. } | NodeType::Literal(_) => {}

            NodeType::Add(a, b) => {
                grads.accumulate(memo, *a, g.clone())?;
                grads.accumulate(memo, *b, g)?;
            }
            NodeType::Subtract(a, b) => {
                grads.accumulate(memo, *a, g.clone())?;
                grads.accumulate(memo, *b, -g)?;
            }
            NodeType::Multiply(a, b) => {
                grads.accumulate(memo, *a, &g * f(*b)?)?;
                grads.accumulate(memo, *b, &g * f(*a)?)?;
            }
            NodeType::MatrixMultiply(a, b) => {
                let (x, w) = (f(*a)?, f(*b)?);
                let w2 = to_matrix(w)?;
                let g2 = to_matrix(&g)?;
                let x2 = to_matrix(x)?;
                let ga = from_matrix(g2.dot(&w2.t()), &x.shape()[..x.ndim() - 1])?;
                grads.accumulate(memo, *a, ga)?;
                grads.accumulate(memo, *b, x2.t().dot(&g2).into_dyn())?;
            }

            NodeType::Scale(a, factor) => grads.accumulate(memo, *a, g.mapv(|v| v * factor))?,
            NodeType::ReLU(a) => {
                let ga = Zip::from(&g)
                    .and(f(*a)?)
                    .map_collect(|&g, &x| if x > 0.0 { g } else { 0.0 });
                grads.accumulate(memo, *a, ga)?;
            }
            NodeType::GELU(a) => {
                let ga = Zip::from(&g).and(f(*a)?).map_collect(|&g, &x| g * gelu_derivative(x));
                grads.accumulate(memo, *a, ga)?;
            }
            NodeType::Sigmoid(a) => {
                let ga = Zip::from(&g).and(out()?).map_collect(|&g, &y| g * y * (1.0 - y));
                grads.accumulate(memo, *a, ga)?;
            }
            NodeType::Tanh(a) => {
                let ga = Zip::from(&g).and(out()?).map_collect(|&g, &y| g * (1.0 - y * y));
                grads.accumulate(memo, *a, ga)?;
            }
            NodeType::Softmax(a) => {
                let y = out()?;
                let last = Axis(y.ndim() - 1);
                let dot = (&g * y).sum_axis(last).insert_axis(last);
                grads.accumulate(memo, *a, y * &(&g - &dot))?;
            }

            NodeType::Sum(a) => {
                let x = f(*a)?;
                grads.accumulate(memo, *a, ArrayD::from_elem(x.raw_dim(), g.sum()))?;
            }
            NodeType::Mean(a) => {
                let x = f(*a)?;
                let n = x.len().max(1) as f32;
                grads.accumulate(memo, *a, ArrayD::from_elem(x.raw_dim(), g.sum() / n))?;
            }

            NodeType::Reshape(a, _) => {
                if let Value::F32(x) = &memo[*a] {
                    let ga = g
                        .into_shape(IxDyn(x.shape()))
                        .map_err(|e| RuntimeError::ShapeError(e.to_string()))?;
                    grads.accumulate(memo, *a, ga)?;
                }
            }
            NodeType::Transpose(a, axis1, axis2) => {
                let mut axes: Vec<_> = (0..g.ndim()).collect();
                axes.swap(*axis1, *axis2);
                let ga = g.permuted_axes(axes).as_standard_layout().into_owned();
                grads.accumulate(memo, *a, ga)?;
            }

            NodeType::Linear { input, weight, bias } => {
                let x = f(*input)?;
                let w2 = to_matrix(f(*weight)?)?;
                let g2 = to_matrix(&g)?;
                let x2 = to_matrix(x)?;
                let gx = from_matrix(g2.dot(&w2), &x.shape()[..x.ndim() - 1])?;
                grads.accumulate(memo, *input, gx)?;
                grads.accumulate(memo, *weight, g2.t().dot(&x2).into_dyn())?;
                if let Some(b) = bias {
                    grads.accumulate(memo, *b, g2.sum_axis(Axis(0)).into_dyn())?;
                }
            }
            NodeType::Embedding { ids, table } => {
                let table_value = f(*table)?;
                let mut gt = ArrayD::zeros(table_value.raw_dim());
                if let Some(ids) = memo[*ids].as_i64() {
                    let g2 = to_matrix(&g)?;
                    for (row, &id) in g2.rows().into_iter().zip(ids.iter()) {
                        let mut dst = gt.index_axis_mut(Axis(0), id as usize);
                        dst += &row;
                    }
                }
                grads.accumulate(memo, *table, gt)?;
            }
            NodeType::CrossEntropy { logits, labels } => {
                if let Some(labels_value) = memo[*labels].as_i64() {
                    let mut probs = cross_entropy_probs(f(*logits)?, labels_value)?;
                    let n = probs.nrows().max(1) as f32;
                    for (row, &label) in labels_value.iter().enumerate() {
                        probs[[row, label as usize]] -= 1.0;
                    }
                    let seed = g.sum() / n;
                    grads.accumulate(memo, *logits, probs.mapv(|v| v * seed).into_dyn())?;
                }
            }
        }
    }
    Ok(grads)
}
