//! The `Module` trait shared by all layers.

use crate::tensor::Tensor;

/// A component that adds a fixed pattern of operations and parameters to
/// the graph.
pub trait Module {
    /// Symbolic forward pass: appends this layer's nodes and returns the
    /// output handle.
    fn forward(&self, inputs: &Tensor) -> Tensor;

    /// Parameter handles owned by this module.
    fn parameters(&self) -> Vec<Tensor>;
}
