// --- File: src/losses.rs ---

//! Loss functions in graph form.
//!
//! Plain functions taking symbolic `Tensor`s and appending the nodes that
//! compute a scalar loss.

use crate::tensor::Tensor;

/// Mean cross-entropy of `logits: [..., num_classes]` against integer
/// `labels: [...]`.
///
/// Leading axes are flattened first, so language-model logits
/// `[batch, seq, vocab]` pair with labels `[batch, seq]`.
pub fn cross_entropy(logits: &Tensor, labels: &Tensor, num_classes: usize) -> Tensor {
    let flat_logits = logits.view(&[-1, num_classes as isize]);
    let flat_labels = labels.view(&[-1]);
    flat_logits.cross_entropy(&flat_labels)
}

/// `sum((y_pred - y_true)^2)`.
pub fn mse_loss(y_pred: &Tensor, y_true: &Tensor) -> Tensor {
    let error = y_pred - y_true;
    (&error * &error).sum()
}

/// `mean((y_pred - y_true)^2)`.
pub fn mse_loss_mean(y_pred: &Tensor, y_true: &Tensor) -> Tensor {
    let error = y_pred - y_true;
    (&error * &error).mean()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asg::{DType, Value};
    use crate::runtime::Interpreter;
    use crate::tensor::GraphContext;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, ArrayD};
    use std::collections::HashMap;

    fn run(ctx: &GraphContext, feeds: HashMap<String, Value>, out: &Tensor) -> f32 {
        let memo = Interpreter::new().run(ctx.main_graph(), ctx.parameters(), &feeds).unwrap();
        memo[out.node_id].as_f32().unwrap().iter().copied().next().unwrap()
    }

    #[test]
    fn mse_sum_and_mean() {
        let ctx = GraphContext::shared();
        let p = Tensor::new_input(&ctx, "p", DType::F32);
        let t = Tensor::new_input(&ctx, "t", DType::F32);
        let total = mse_loss(&p, &t);
        let mean = mse_loss_mean(&p, &t);

        let feeds = HashMap::from([
            ("p".to_string(), Value::F32(array![1.0f32, 2.0, 3.0].into_dyn())),
            ("t".to_string(), Value::F32(array![1.0f32, 0.0, 6.0].into_dyn())),
        ]);
        let ctx = ctx.borrow();
        assert_abs_diff_eq!(run(&ctx, feeds.clone(), &total), 13.0);
        assert_abs_diff_eq!(run(&ctx, feeds, &mean), 13.0 / 3.0, epsilon = 1e-6);
    }

    #[test]
    fn cross_entropy_flattens_sequence_axes() {
        let ctx = GraphContext::shared();
        let logits = Tensor::new_input(&ctx, "logits", DType::F32);
        let labels = Tensor::new_input(&ctx, "labels", DType::I64);
        let loss = cross_entropy(&logits, &labels, 2);

        // uniform logits: -ln(1/2) for every position
        let feeds = HashMap::from([
            ("logits".to_string(), Value::F32(ArrayD::zeros(ndarray::IxDyn(&[2, 3, 2])))),
            ("labels".to_string(), Value::I64(array![[0i64, 1, 1], [1, 0, 0]].into_dyn())),
        ]);
        let ctx = ctx.borrow();
        assert_abs_diff_eq!(run(&ctx, feeds, &loss), std::f32::consts::LN_2, epsilon = 1e-6);
    }
}
