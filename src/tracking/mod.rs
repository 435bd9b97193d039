//! Scale tracking of a model's forward and backward passes.
//!
//! `ScaleTracker` evaluates the graph held by a [`GraphContext`], records the
//! scale statistics of every tensor the outputs depend on, optionally runs the
//! reverse pass to record gradient statistics, and exports the result as a
//! [`ScalesGraph`].
//!
//! ```rust
//! use asg_scales::asg::{DType, Value};
//! use asg_scales::tensor::{GraphContext, Tensor};
//! use asg_scales::tracking::ScaleTracker;
//! use std::collections::HashMap;
//!
//! let ctx = GraphContext::shared();
//! let x = Tensor::new_input(&ctx, "x", DType::F32);
//! let loss = x.relu().sum();
//!
//! let mut feeds = HashMap::new();
//! feeds.insert("x".to_string(), Value::F32(ndarray::arr1(&[1.0f32, -1.0]).into_dyn()));
//!
//! let mut tracker = ScaleTracker::new(&ctx);
//! tracker.forward(&feeds, &[&loss]).unwrap();
//! tracker.backward(&loss).unwrap();
//! let graph = tracker.scales_graph().unwrap();
//! assert_eq!(graph.node_count(), 4); // x, relu, sum, output
//! ```

pub mod graph;

pub use graph::{consumers, find_node, operands, ScaleNode, ScalesGraph};

use crate::asg::{Asg, NodeId, Value};
use crate::autograd::{self, AutogradError};
use crate::metrics::{Metrics, Stats};
use crate::runtime::{Interpreter, Memo, RuntimeError};
use crate::tensor::{GraphContext, Tensor};
use log::debug;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrackingError {
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error(transparent)]
    Autograd(#[from] AutogradError),
    #[error("forward must be run before {0}")]
    NotRun(&'static str),
    #[error("node {0} is not part of the tracked graph")]
    UnknownNode(NodeId),
    #[error("tensor belongs to a different graph context")]
    ForeignTensor,
    #[error("at least one output is required")]
    NoOutputs,
}

pub type TrackingResult<T> = Result<T, TrackingError>;

/// State of the most recent forward pass.
#[derive(Debug)]
struct Trace {
    asg: Asg,
    memo: Memo,
    outputs: Vec<NodeId>,
    /// Nodes the outputs depend on.
    live: Vec<bool>,
    fwd: Vec<Option<Stats>>,
    bwd: Vec<Option<Stats>>,
}

#[derive(Debug)]
pub struct ScaleTracker {
    context: Rc<RefCell<GraphContext>>,
    trace: Option<Trace>,
}

impl ScaleTracker {
    pub fn new(context: &Rc<RefCell<GraphContext>>) -> Self {
        Self { context: Rc::clone(context), trace: None }
    }

    fn check_owner(&self, tensor: &Tensor) -> TrackingResult<()> {
        if Rc::ptr_eq(&self.context, &tensor.context) {
            Ok(())
        } else {
            Err(TrackingError::ForeignTensor)
        }
    }

    /// Evaluates the graph and records forward statistics.
    ///
    /// Returns the values of `outputs`, in order. A new call discards any
    /// previously recorded pass.
    pub fn forward(
        &mut self,
        feeds: &HashMap<String, Value>,
        outputs: &[&Tensor],
    ) -> TrackingResult<Vec<Value>> {
        if outputs.is_empty() {
            return Err(TrackingError::NoOutputs);
        }
        for t in outputs {
            self.check_owner(t)?;
        }

        let ctx = self.context.borrow();
        let asg = ctx.main_graph().clone();
        let memo = Interpreter::new().run(&asg, ctx.parameters(), feeds)?;
        drop(ctx);

        let outputs: Vec<NodeId> = outputs.iter().map(|t| t.node_id).collect();
        let live = ancestors(&asg, &outputs);
        let fwd = memo
            .iter()
            .zip(&live)
            .map(|(value, &live)| live.then(|| value_stats(value)))
            .collect();
        let tracked = live.iter().filter(|&&l| l).count();
        debug!("forward pass tracked over {} of {} nodes", tracked, asg.len());

        let results = outputs.iter().map(|&id| memo[id].clone()).collect();
        let bwd = vec![None; asg.len()];
        self.trace = Some(Trace { asg, memo, outputs, live, fwd, bwd });
        Ok(results)
    }

    /// Runs the reverse pass from `loss` and records gradient statistics for
    /// every tracked node that receives a gradient.
    pub fn backward(&mut self, loss: &Tensor) -> TrackingResult<()> {
        self.check_owner(loss)?;
        let trace = self.trace.as_mut().ok_or(TrackingError::NotRun("backward"))?;
        if !trace.live.get(loss.node_id).copied().unwrap_or(false) {
            return Err(TrackingError::UnknownNode(loss.node_id));
        }
        let grads = autograd::backward(&trace.asg, &trace.memo, loss.node_id)?;
        for (id, grad) in grads.iter() {
            if trace.live[id] {
                trace.bwd[id] = Some(Stats::from_array(grad));
            }
        }
        debug!("backward pass recorded {} gradients", grads.len());
        Ok(())
    }

    /// Exports the tracked pass.
    ///
    /// Nodes appear in execution order with every parameter placed right
    /// before its first consumer; the synthetic `output` node comes last.
    pub fn scales_graph(&self) -> TrackingResult<ScalesGraph> {
        let trace = self.trace.as_ref().ok_or(TrackingError::NotRun("scales_graph"))?;
        let mut graph = ScalesGraph::default();
        let mut index = HashMap::new();

        for node in &trace.asg.nodes {
            if !trace.live[node.id] || node.is_parameter() {
                continue;
            }
            let inputs = node.inputs();
            for &operand in &inputs {
                if trace.asg.nodes[operand].is_parameter() && !index.contains_key(&operand) {
                    index.insert(operand, graph.add_node(trace.scale_node(operand)));
                }
            }
            let idx = graph.add_node(trace.scale_node(node.id));
            for (position, operand) in inputs.into_iter().enumerate() {
                graph.add_edge(index[&operand], idx, position);
            }
            index.insert(node.id, idx);
        }

        // parameters returned as outputs without being consumed
        for &id in &trace.outputs {
            if !index.contains_key(&id) {
                index.insert(id, graph.add_node(trace.scale_node(id)));
            }
        }

        let output = graph.add_node(ScaleNode::output());
        for (position, id) in trace.outputs.iter().enumerate() {
            graph.add_edge(index[id], output, position);
        }
        Ok(graph)
    }
}

impl Trace {
    fn scale_node(&self, id: NodeId) -> ScaleNode {
        let node = &self.asg.nodes[id];
        let value = &self.memo[id];
        ScaleNode {
            name: node.name.clone(),
            op: node.node_type.op_name().to_string(),
            is_weight: node.is_parameter(),
            dtype: Some(value.dtype()),
            shape: Some(value.shape().to_vec()),
            metrics: Metrics { fwd: self.fwd[id], bwd: self.bwd[id] },
        }
    }
}

fn value_stats(value: &Value) -> Stats {
    match value {
        Value::F32(a) => Stats::from_array(a),
        Value::I64(a) => Stats::from_values(a.iter().map(|&v| v as f64)),
    }
}

/// Marks every node `outputs` depend on, outputs included.
fn ancestors(asg: &Asg, outputs: &[NodeId]) -> Vec<bool> {
    let mut live = vec![false; asg.len()];
    let mut stack = outputs.to_vec();
    while let Some(id) = stack.pop() {
        if std::mem::replace(&mut live[id], true) {
            continue;
        }
        stack.extend(asg.nodes[id].inputs());
    }
    live
}
