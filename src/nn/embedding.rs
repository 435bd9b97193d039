//! Embedding lookup table.
//!
//! Maps integer ids of any shape `[*]` to dense vectors `[*, embedding_dim]`.

use super::module::Module;
use crate::tensor::{GraphContext, Tensor};
use ndarray::{Array2, ArrayD};
use ndarray_rand::rand_distr::StandardNormal;
use ndarray_rand::RandomExt;
use rand::Rng;
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Clone)]
pub struct Embedding {
    pub num_embeddings: usize,
    pub embedding_dim: usize,
    /// Table of shape `[num_embeddings, embedding_dim]`, registered as
    /// `<name>.weight`.
    pub weight: Tensor,
}

impl Embedding {
    /// Table drawn from `N(0, 1)`.
    pub fn new<R: Rng + ?Sized>(
        context: &Rc<RefCell<GraphContext>>,
        name: &str,
        num_embeddings: usize,
        embedding_dim: usize,
        rng: &mut R,
    ) -> Self {
        let table: Array2<f32> =
            Array2::random_using((num_embeddings, embedding_dim), StandardNormal, rng);
        Self::from_weight(context, name, table.into_dyn())
    }

    /// Wraps a pretrained table.
    pub fn from_weight(
        context: &Rc<RefCell<GraphContext>>,
        name: &str,
        table: ArrayD<f32>,
    ) -> Self {
        let (num_embeddings, embedding_dim) = match table.shape() {
            [n, d] => (*n, *d),
            _ => (table.len(), 1),
        };
        let weight = Tensor::new_parameter(context, &format!("{name}.weight"), table);
        Self { num_embeddings, embedding_dim, weight }
    }
}

impl Module for Embedding {
    fn forward(&self, input: &Tensor) -> Tensor {
        input.embed(&self.weight)
    }

    fn parameters(&self) -> Vec<Tensor> {
        vec![self.weight.clone()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asg::{DType, Value};
    use crate::runtime::Interpreter;
    use ndarray::{arr2, array};
    use std::collections::HashMap;

    #[test]
    fn lookup_selects_table_rows() {
        let ctx = GraphContext::shared();
        let table = arr2(&[[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]]).into_dyn();
        let emb = Embedding::from_weight(&ctx, "wte", table);
        assert_eq!((emb.num_embeddings, emb.embedding_dim), (3, 2));

        let ids = Tensor::new_input(&ctx, "ids", DType::I64);
        let out = emb.forward(&ids);

        let feeds = HashMap::from([("ids".to_string(), Value::I64(array![[2, 0]].into_dyn()))]);
        let ctx = ctx.borrow();
        let memo = Interpreter::new().run(ctx.main_graph(), ctx.parameters(), &feeds).unwrap();
        let expected = array![[[5.0f32, 6.0], [1.0, 2.0]]].into_dyn();
        assert_eq!(memo[out.node_id].as_f32().unwrap(), &expected);
    }
}
