//! # asg-scales: scale analysis of tensors in ASG models
//!
//! Low-precision formats (FP16, FP8) only represent a narrow band of
//! magnitudes. This crate shows where the tensors of a model sit inside that
//! band, for the forward pass and for the gradients of the backward pass.
//!
//! The model is built as an Abstract Semantic Graph (ASG) with symbolic
//! [`Tensor`](tensor::Tensor) handles, evaluated by a reference interpreter,
//! differentiated, and every tensor is summarised by a handful of scale
//! statistics. The annotated graph is then pruned, flattened into a table
//! and drawn as a chart against the FP16/FP8 range limits.
//!
//! ```no_run
//! use asg_scales::asg::{DType, Value};
//! use asg_scales::nn::{Linear, Module};
//! use asg_scales::plot::{plot, PlotOptions};
//! use asg_scales::tensor::{GraphContext, Tensor};
//! use asg_scales::tracking::ScaleTracker;
//! use rand::{rngs::StdRng, SeedableRng};
//! use std::collections::HashMap;
//!
//! let ctx = GraphContext::shared();
//! let fc = Linear::new(&ctx, "fc", 4, 2, &mut StdRng::seed_from_u64(0));
//! let x = Tensor::new_input(&ctx, "x", DType::F32);
//! let loss = fc.forward(&x.relu()).sum();
//!
//! let x_value = ndarray::ArrayD::ones(ndarray::IxDyn(&[3, 4]));
//! let feeds = HashMap::from([("x".to_string(), Value::F32(x_value))]);
//! let mut tracker = ScaleTracker::new(&ctx);
//! tracker.forward(&feeds, &[&loss])?;
//! tracker.backward(&loss)?;
//! let chart = plot(&tracker.scales_graph()?, &PlotOptions::default())?;
//! chart.render_svg("scales.svg")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod analysis;
pub mod asg;
pub mod autograd;
pub mod data;
pub mod losses;
pub mod metrics;
pub mod nn;
pub mod plot;
pub mod runtime;
pub mod tensor;
pub mod tracking;
pub mod visualiser;

pub use visualiser::{visualise_batch, visualiser, ScaleModel, VisualiserError};
