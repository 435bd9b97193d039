//! Reference interpreter for the ASG.
//!
//! Takes a graph, the parameter values and the fed inputs, and returns the
//! value of every node. Nodes are visited in insertion order, which is a
//! topological order because a node can only refer to nodes built before it.

use super::kernels::*;
use super::{Memo, RuntimeError};
use crate::asg::{Asg, DType, Node, NodeId, NodeType, Value};
use log::debug;
use ndarray::ArrayD;
use std::collections::HashMap;

type Result<T> = std::result::Result<T, RuntimeError>;

#[derive(Debug, Default, Clone, Copy)]
pub struct Interpreter;

impl Interpreter {
    pub fn new() -> Self {
        Self
    }

    /// Evaluates every node of `asg`.
    ///
    /// `params` is keyed by the parameter's dotted path and `feeds` by the
    /// input name.
    pub fn run(
        &self,
        asg: &Asg,
        params: &HashMap<String, ArrayD<f32>>,
        feeds: &HashMap<String, Value>,
    ) -> Result<Memo> {
        let mut memo: Memo = Vec::with_capacity(asg.len());
        for node in &asg.nodes {
            let value = evaluate(node, &memo, params, feeds)?;
            memo.push(value);
        }
        debug!("evaluated {} nodes", memo.len());
        Ok(memo)
    }
}

fn fetch(memo: &Memo, id: NodeId, at: NodeId) -> Result<&Value> {
    memo.get(id).ok_or(RuntimeError::ForwardReference(at))
}

fn fetch_f32<'m>(memo: &'m Memo, id: NodeId, node: &Node) -> Result<&'m ArrayD<f32>> {
    let value = fetch(memo, id, node.id)?;
    value.as_f32().ok_or_else(|| RuntimeError::TypeError {
        op: node.node_type.op_name().to_string(),
        expected: DType::F32,
        actual: value.dtype(),
    })
}

fn fetch_i64<'m>(memo: &'m Memo, id: NodeId, node: &Node) -> Result<&'m ArrayD<i64>> {
    let value = fetch(memo, id, node.id)?;
    value.as_i64().ok_or_else(|| RuntimeError::TypeError {
        op: node.node_type.op_name().to_string(),
        expected: DType::I64,
        actual: value.dtype(),
    })
}

fn evaluate(
    node: &Node,
    memo: &Memo,
    params: &HashMap<String, ArrayD<f32>>,
    feeds: &HashMap<String, Value>,
) -> Result<Value> {
    let f = move |id: NodeId| fetch_f32(memo, id, node);

    let out = match &node.node_type {
        NodeType::Input { name } => {
            let value = feeds
                .get(name)
                .ok_or_else(|| RuntimeError::MissingInput(name.clone(), node.id))?;
            if let Some(expected) = node.dtype {
                if value.dtype() != expected {
                    return Err(RuntimeError::InputDType {
                        name: name.clone(),
                        expected,
                        actual: value.dtype(),
                    });
                }
            }
            return Ok(value.clone());
        }
        NodeType::Parameter { name } => params
            .get(name)
            .cloned()
            .ok_or_else(|| RuntimeError::MissingParameter(name.clone(), node.id))?,
        NodeType::Literal(data) => data.clone(),

        NodeType::Add(a, b) => op_add(f(*a)?, f(*b)?)?,
        NodeType::Subtract(a, b) => op_subtract(f(*a)?, f(*b)?)?,
        NodeType::Multiply(a, b) => op_multiply(f(*a)?, f(*b)?)?,
        NodeType::MatrixMultiply(a, b) => op_matmul(f(*a)?, f(*b)?)?,

        NodeType::Scale(a, factor) => f(*a)?.mapv(|v| v * factor),
        NodeType::ReLU(a) => op_relu(f(*a)?),
        NodeType::GELU(a) => op_gelu(f(*a)?),
        NodeType::Sigmoid(a) => op_sigmoid(f(*a)?),
        NodeType::Tanh(a) => op_tanh(f(*a)?),
        NodeType::Softmax(a) => op_softmax(f(*a)?)?,

        NodeType::Sum(a) => op_sum(f(*a)?),
        NodeType::Mean(a) => op_mean(f(*a)?),

        // Views keep the dtype of their operand.
        NodeType::Reshape(a, target) => {
            return match fetch(memo, *a, node.id)? {
                Value::F32(x) => Ok(Value::F32(op_reshape(x, &resolve_shape(target, x.len())?)?)),
                Value::I64(x) => Ok(Value::I64(op_reshape(x, &resolve_shape(target, x.len())?)?)),
            };
        }
        NodeType::Transpose(a, axis1, axis2) => op_transpose(f(*a)?, *axis1, *axis2)?,

        NodeType::Linear { input, weight, bias } => {
            let bias = match bias {
                Some(b) => Some(f(*b)?),
                None => None,
            };
            op_linear(f(*input)?, f(*weight)?, bias)?
        }
        NodeType::Embedding { ids, table } => {
            op_embedding(fetch_i64(memo, *ids, node)?, f(*table)?)?
        }
        NodeType::CrossEntropy { logits, labels } => {
            op_cross_entropy(f(*logits)?, fetch_i64(memo, *labels, node)?)?
        }
    };
    Ok(Value::F32(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::{GraphContext, Tensor};
    use ndarray::{array, IxDyn};

    #[test]
    fn evaluates_linear_relu_sum() {
        let ctx = GraphContext::shared();
        let x = Tensor::new_input(&ctx, "x", DType::F32);
        let w = Tensor::new_parameter(&ctx, "w", array![[1.0f32, -1.0]].into_dyn());
        let y = x.linear(&w, None).relu().sum();

        let mut feeds = HashMap::new();
        feeds.insert("x".to_string(), Value::F32(array![[3.0f32, 1.0], [1.0, 3.0]].into_dyn()));

        let ctx = ctx.borrow();
        let memo = Interpreter::new().run(ctx.main_graph(), ctx.parameters(), &feeds).unwrap();
        assert_eq!(memo.len(), 5);
        assert_eq!(memo[y.node_id], Value::F32(ndarray::arr0(2.0f32).into_dyn()));
    }

    #[test]
    fn missing_feed_is_reported() {
        let ctx = GraphContext::shared();
        let x = Tensor::new_input(&ctx, "x", DType::F32);
        let _ = x.relu();
        let ctx = ctx.borrow();
        let err = Interpreter::new().run(ctx.main_graph(), ctx.parameters(), &HashMap::new());
        assert_eq!(err, Err(RuntimeError::MissingInput("x".into(), 0)));
    }

    #[test]
    fn integer_inputs_flow_through_views() {
        let ctx = GraphContext::shared();
        let ids = Tensor::new_input(&ctx, "ids", DType::I64);
        let flat = ids.view(&[-1]);
        let table = Tensor::new_parameter(&ctx, "table", ArrayD::ones(IxDyn(&[4, 2])));
        let emb = flat.embed(&table);

        let mut feeds = HashMap::new();
        feeds.insert("ids".to_string(), Value::I64(array![[0i64, 1], [2, 3]].into_dyn()));
        let ctx = ctx.borrow();
        let memo = Interpreter::new().run(ctx.main_graph(), ctx.parameters(), &feeds).unwrap();
        assert_eq!(memo[flat.node_id].dtype(), DType::I64);
        assert_eq!(memo[emb.node_id].shape(), &[4, 2]);
    }

    #[test]
    fn feeding_the_wrong_dtype_fails() {
        let ctx = GraphContext::shared();
        let _ids = Tensor::new_input(&ctx, "ids", DType::I64);
        let mut feeds = HashMap::new();
        feeds.insert("ids".to_string(), Value::F32(ArrayD::zeros(IxDyn(&[2]))));
        let ctx = ctx.borrow();
        let err = Interpreter::new().run(ctx.main_graph(), ctx.parameters(), &feeds).unwrap_err();
        assert!(matches!(err, RuntimeError::InputDType { expected: DType::I64, .. }));
    }
}
