//! Fully connected layer.

use crate::nn::module::Module;
use crate::tensor::{GraphContext, Tensor};
use ndarray::{Array1, Array2};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::Rng;
use std::cell::RefCell;
use std::rc::Rc;

/// `y = x W^T + b` with `weight: [out_features, in_features]`.
///
/// Parameters are registered as `<name>.weight` and `<name>.bias` and start
/// from `U(-1/sqrt(in), 1/sqrt(in))`, the Kaiming-uniform bound torch uses.
#[derive(Debug, Clone)]
pub struct Linear {
    pub in_features: usize,
    pub out_features: usize,
    pub weight: Tensor,
    pub bias: Option<Tensor>,
}

impl Linear {
    pub fn new<R: Rng + ?Sized>(
        context: &Rc<RefCell<GraphContext>>,
        name: &str,
        in_features: usize,
        out_features: usize,
        rng: &mut R,
    ) -> Self {
        let mut layer = Self::without_bias(context, name, in_features, out_features, rng);
        let bound = init_bound(in_features);
        let bias = Array1::random_using(out_features, Uniform::new_inclusive(-bound, bound), rng);
        layer.bias = Some(Tensor::new_parameter(context, &format!("{name}.bias"), bias.into_dyn()));
        layer
    }

    pub fn without_bias<R: Rng + ?Sized>(
        context: &Rc<RefCell<GraphContext>>,
        name: &str,
        in_features: usize,
        out_features: usize,
        rng: &mut R,
    ) -> Self {
        let bound = init_bound(in_features);
        let init = Uniform::new_inclusive(-bound, bound);
        let weight = Array2::random_using((out_features, in_features), init, rng);
        let weight = Tensor::new_parameter(context, &format!("{name}.weight"), weight.into_dyn());
        Self { in_features, out_features, weight, bias: None }
    }
}

fn init_bound(in_features: usize) -> f32 {
    1.0 / (in_features.max(1) as f32).sqrt()
}

impl Module for Linear {
    fn forward(&self, inputs: &Tensor) -> Tensor {
        inputs.linear(&self.weight, self.bias.as_ref())
    }

    fn parameters(&self) -> Vec<Tensor> {
        std::iter::once(self.weight.clone()).chain(self.bias.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn parameters_use_torch_layout_and_bound() {
        let ctx = GraphContext::shared();
        let layer = Linear::new(&ctx, "fc", 16, 4, &mut StdRng::seed_from_u64(0));
        let params = ctx.borrow().parameters().clone();

        assert_eq!(params["fc.weight"].shape(), &[4, 16]);
        assert_eq!(params["fc.bias"].shape(), &[4]);
        assert!(params["fc.weight"].iter().all(|w| w.abs() <= 0.25));
        assert_eq!(layer.parameters().len(), 2);
        assert_eq!(layer.weight.name(), "fc_weight");
    }

    #[test]
    fn bias_free_layer_has_one_parameter() {
        let ctx = GraphContext::shared();
        let layer = Linear::without_bias(&ctx, "proj", 3, 3, &mut StdRng::seed_from_u64(0));
        assert!(layer.bias.is_none());
        assert_eq!(layer.parameters().len(), 1);
    }
}
