//! Finite-difference check of the reverse pass.
//!
//! Every float input and parameter is nudged by `±EPSILON` and the central
//! difference of the loss is compared with the analytic gradient.

use asg_scales::asg::{Asg, DType, NodeType, Value};
use asg_scales::autograd::backward;
use asg_scales::losses::{cross_entropy, mse_loss_mean};
use asg_scales::nn::{Embedding, Linear, Module};
use asg_scales::runtime::Interpreter;
use asg_scales::tensor::{GraphContext, Tensor};

use ndarray::{array, ArrayD, IxDyn};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

const EPSILON: f32 = 1e-2;
const TOLERANCE: f32 = 2e-2;

type Params = HashMap<String, ArrayD<f32>>;
type Feeds = HashMap<String, Value>;

fn assert_grads_are_close(what: &str, analytic: &ArrayD<f32>, numeric: &ArrayD<f32>) {
    assert_eq!(analytic.shape(), numeric.shape(), "{what}: gradient shapes differ");
    for (i, (a, n)) in analytic.iter().zip(numeric.iter()).enumerate() {
        let diff = (a - n).abs();
        let larger = a.abs().max(n.abs()).max(1e-2);
        assert!(
            diff / larger <= TOLERANCE,
            "{what}[{i}]: analytic {a:.6}, numeric {n:.6}"
        );
    }
}

fn loss_value(asg: &Asg, params: &Params, feeds: &Feeds, loss: usize) -> f32 {
    let memo = Interpreter::new().run(asg, params, feeds).unwrap();
    *memo[loss].as_f32().unwrap().iter().next().unwrap()
}

fn numeric_grad(value: &ArrayD<f32>, mut eval: impl FnMut(ArrayD<f32>) -> f32) -> ArrayD<f32> {
    let mut grad = ArrayD::zeros(value.raw_dim());
    for (i, g) in grad.iter_mut().enumerate() {
        let mut plus = value.clone();
        let mut minus = value.clone();
        plus.as_slice_mut().unwrap()[i] += EPSILON;
        minus.as_slice_mut().unwrap()[i] -= EPSILON;
        *g = (eval(plus) - eval(minus)) / (2.0 * EPSILON);
    }
    grad
}

/// Checks the gradient of every parameter and float feed of `ctx`.
fn check(ctx: &Rc<RefCell<GraphContext>>, feeds: &Feeds, loss: &Tensor) {
    let (asg, params) = {
        let c = ctx.borrow();
        (c.main_graph().clone(), c.parameters().clone())
    };
    let memo = Interpreter::new().run(&asg, &params, feeds).unwrap();
    let grads = backward(&asg, &memo, loss.node_id).unwrap();

    for node in &asg.nodes {
        match &node.node_type {
            NodeType::Parameter { name } => {
                let analytic =
                    grads.get(node.id).unwrap_or_else(|| panic!("no gradient for {name}"));
                let numeric = numeric_grad(&params[name], |v| {
                    let mut p = params.clone();
                    p.insert(name.clone(), v);
                    loss_value(&asg, &p, feeds, loss.node_id)
                });
                assert_grads_are_close(name, analytic, &numeric);
            }
            NodeType::Input { name } => {
                let Some(Value::F32(value)) = feeds.get(name) else {
                    assert!(grads.get(node.id).is_none(), "integer input {name} got a gradient");
                    continue;
                };
                let analytic =
                    grads.get(node.id).unwrap_or_else(|| panic!("no gradient for {name}"));
                let numeric = numeric_grad(value, |v| {
                    let mut f = feeds.clone();
                    f.insert(name.clone(), Value::F32(v));
                    loss_value(&asg, &params, &f, loss.node_id)
                });
                assert_grads_are_close(name, analytic, &numeric);
            }
            _ => {}
        }
    }
}

fn random(shape: &[usize], rng: &mut StdRng) -> ArrayD<f32> {
    ArrayD::random_using(IxDyn(shape), Uniform::new(-1.0f32, 1.0), rng)
}

fn feeds(entries: Vec<(&str, Value)>) -> Feeds {
    entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

#[test]
fn linear_relu_sum() {
    let ctx = GraphContext::shared();
    let mut rng = StdRng::seed_from_u64(11);
    let fc = Linear::new(&ctx, "fc", 4, 3, &mut rng);
    let x = Tensor::new_input(&ctx, "x", DType::F32);
    let loss = fc.forward(&x.relu()).sum();

    // inputs stay further than EPSILON from the relu kink
    let data = array![[0.9f32, -0.7, 0.4, 0.8], [-0.6, 0.5, -0.9, 0.3]].into_dyn();
    check(&ctx, &feeds(vec![("x", Value::F32(data))]), &loss);
}

#[test]
fn smooth_activations_and_mse() {
    let ctx = GraphContext::shared();
    let mut rng = StdRng::seed_from_u64(5);
    let fc = Linear::new(&ctx, "fc", 3, 3, &mut rng);
    let x = Tensor::new_input(&ctx, "x", DType::F32);
    let target = Tensor::new_input(&ctx, "target", DType::F32);

    let h = fc.forward(&x);
    let mixed = &(&h.gelu() + &h.tanh()) * &h.sigmoid();
    let loss = mse_loss_mean(&mixed.softmax(), &target);

    let f = feeds(vec![
        ("x", Value::F32(random(&[2, 3], &mut rng))),
        ("target", Value::F32(random(&[2, 3], &mut rng))),
    ]);
    check(&ctx, &f, &loss);
}

#[test]
fn broadcasting_views_and_matmul() {
    let ctx = GraphContext::shared();
    let mut rng = StdRng::seed_from_u64(8);
    let w = Tensor::new_parameter(&ctx, "w", random(&[3, 2], &mut rng));
    let b = Tensor::new_parameter(&ctx, "b", random(&[2], &mut rng));
    let x = Tensor::new_input(&ctx, "x", DType::F32);

    let y = &x.dot(&w) + &b;
    let z = y.transpose(0, 1).view(&[-1]).scale(0.5);
    let loss = (&z * &z).mean();

    check(&ctx, &feeds(vec![("x", Value::F32(random(&[4, 3], &mut rng)))]), &loss);
}

#[test]
fn embedding_cross_entropy() {
    let ctx = GraphContext::shared();
    let mut rng = StdRng::seed_from_u64(2);
    let emb = Embedding::new(&ctx, "emb", 5, 4, &mut rng);
    let head = Linear::new(&ctx, "head", 4, 5, &mut rng);
    let ids = Tensor::new_input(&ctx, "ids", DType::I64);
    let labels = Tensor::new_input(&ctx, "labels", DType::I64);

    let logits = head.forward(&emb.forward(&ids));
    let loss = cross_entropy(&logits, &labels, 5);

    let f = feeds(vec![
        ("ids", Value::I64(array![[0i64, 3, 3], [4, 1, 0]].into_dyn())),
        ("labels", Value::I64(array![[3i64, 3, 4], [1, 0, 2]].into_dyn())),
    ]);
    check(&ctx, &f, &loss);
}
