//! Execution of an ASG on the CPU.
//!
//! The interpreter is the reference backend: it walks the graph in
//! insertion order and evaluates every node eagerly with `ndarray`.

pub mod interpreter;
pub mod kernels;

pub use interpreter::Interpreter;

use crate::asg::{DType, NodeId, Value};
use thiserror::Error;

/// Errors raised while evaluating a graph.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("no value fed for input '{0}' (node {1})")]
    MissingInput(String, NodeId),

    #[error("no value stored for parameter '{0}' (node {1})")]
    MissingParameter(String, NodeId),

    #[error("input '{name}' declared as {expected} but fed {actual}")]
    InputDType { name: String, expected: DType, actual: DType },

    #[error("type mismatch in {op}: expected {expected}, got {actual}")]
    TypeError { op: String, expected: DType, actual: DType },

    #[error("shape error: {0}")]
    ShapeError(String),

    #[error("{op}: index {index} out of range for size {bound}")]
    IndexOutOfRange { op: String, index: i64, bound: usize },

    #[error("node {0} refers to a node that has not been evaluated yet")]
    ForwardReference(NodeId),
}

/// Values of every evaluated node, indexed by `NodeId`.
pub type Memo = Vec<Value>;
