//! # Neural network layers
//!
//! Each layer is a constructor that registers its parameters (with initial
//! values) in a [`GraphContext`](crate::tensor::GraphContext) and a
//! [`Module::forward`] that appends its operations to the graph.
//!
//! ```
//! use asg_scales::asg::DType;
//! use asg_scales::nn::{Linear, Module, ReLU};
//! use asg_scales::tensor::{GraphContext, Tensor};
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let ctx = GraphContext::shared();
//! let fc = Linear::new(&ctx, "fc1", 784, 128, &mut StdRng::seed_from_u64(0));
//! let x = Tensor::new_input(&ctx, "x", DType::F32);
//! let h = ReLU.forward(&fc.forward(&x));
//! assert_eq!(h.name(), "relu");
//! ```

pub mod activations;
pub mod embedding;
pub mod linear;
pub mod module;

pub use activations::{ReLU, Sigmoid, Softmax, Tanh, GELU};
pub use embedding::Embedding;
pub use linear::Linear;
pub use module::Module;
