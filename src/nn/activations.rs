//! Parameter-free activation layers.

use crate::nn::module::Module;
use crate::tensor::Tensor;

macro_rules! activation {
    ($(#[$doc:meta])* $name:ident, $op:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $name;

        impl Module for $name {
            fn forward(&self, inputs: &Tensor) -> Tensor {
                inputs.$op()
            }

            fn parameters(&self) -> Vec<Tensor> {
                Vec::new()
            }
        }
    };
}

activation!(
    /// `max(0, x)`.
    ReLU, relu
);
activation!(
    /// GELU, tanh approximation.
    GELU, gelu
);
activation!(Sigmoid, sigmoid);
activation!(Tanh, tanh);
activation!(
    /// Softmax over the last axis.
    Softmax, softmax
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asg::DType;
    use crate::tensor::GraphContext;

    #[test]
    fn activations_append_one_node_each() {
        let ctx = GraphContext::shared();
        let x = Tensor::new_input(&ctx, "x", DType::F32);
        let layers: [&dyn Module; 5] = [&ReLU, &GELU, &Sigmoid, &Tanh, &Softmax];
        let mut h = x;
        for layer in layers {
            assert!(layer.parameters().is_empty());
            h = layer.forward(&h);
        }
        let graph = ctx.borrow().main_graph().clone();
        let ops: Vec<_> = graph.nodes.iter().map(|n| n.node_type.op_name()).collect();
        assert_eq!(ops, ["input", "relu", "gelu", "sigmoid", "tanh", "softmax"]);
    }
}
