// --- File: src/visualiser.rs ---

//! One-call scale visualisation of a language model.
//!
//! [`visualiser`] samples and tokenizes an example batch, builds the model's
//! graph on symbolic `inputs`/`labels`, tracks the forward (and optionally
//! backward) pass and returns the scale chart.

use crate::asg::{DType, Value};
use crate::data::{example_batch, Batch, BatchTokenizer, DataError, ExampleBatchConfig};
use crate::plot::{plot, PlotError, PlotOptions, ScaleChart};
use crate::tensor::{GraphContext, Tensor};
use crate::tracking::{ScaleTracker, ScalesGraph, TrackingError};
use log::{debug, info};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use thiserror::Error;

/// A model taking token ids and next-token labels.
pub trait ScaleModel {
    /// Appends the model to the graph and returns `(output, loss)`.
    fn forward(&self, inputs: &Tensor, labels: &Tensor) -> (Tensor, Tensor);
}

#[derive(Error, Debug)]
pub enum VisualiserError {
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(transparent)]
    Tracking(#[from] TrackingError),
    #[error(transparent)]
    Plot(#[from] PlotError),
}

pub type VisualiserResult<T> = Result<T, VisualiserError>;

/// Plots the scales of `model` on an example batch of corpus text.
///
/// The metric is checked before any corpus I/O. With `backward` set the
/// loss is differentiated and gradient scales are shown as well.
#[allow(clippy::too_many_arguments)]
pub fn visualiser<M, T>(
    context: &Rc<RefCell<GraphContext>>,
    model: &M,
    tokenizer: &mut T,
    batch_size: usize,
    seq_len: usize,
    backward: bool,
    config: &ExampleBatchConfig,
    options: &PlotOptions,
) -> VisualiserResult<ScaleChart>
where
    M: ScaleModel + ?Sized,
    T: BatchTokenizer + ?Sized,
{
    options.metric_name()?;
    let batch = example_batch(tokenizer, batch_size, seq_len, config)?;
    info!("example batch of {} x {} tokens ready", batch.batch_size(), batch.seq_len());
    visualise_batch(context, model, &batch, backward, options)
}

/// [`visualiser`] on a ready batch.
pub fn visualise_batch<M: ScaleModel + ?Sized>(
    context: &Rc<RefCell<GraphContext>>,
    model: &M,
    batch: &Batch,
    backward: bool,
    options: &PlotOptions,
) -> VisualiserResult<ScaleChart> {
    options.metric_name()?;
    let graph = track_batch(context, model, batch, backward)?;
    Ok(plot(&graph, options)?)
}

/// Tracks `model` on `batch` and returns the annotated graph.
pub fn track_batch<M: ScaleModel + ?Sized>(
    context: &Rc<RefCell<GraphContext>>,
    model: &M,
    batch: &Batch,
    backward: bool,
) -> VisualiserResult<ScalesGraph> {
    let inputs = Tensor::new_input(context, "inputs", DType::I64);
    let labels = Tensor::new_input(context, "labels", DType::I64);
    let (output, loss) = model.forward(&inputs, &labels);

    let feeds = HashMap::from([
        ("inputs".to_string(), Value::I64(batch.input_ids.clone().into_dyn())),
        ("labels".to_string(), Value::I64(batch.labels.clone().into_dyn())),
    ]);
    let mut tracker = ScaleTracker::new(context);
    tracker.forward(&feeds, &[&output, &loss])?;
    if backward {
        tracker.backward(&loss)?;
    }
    let graph = tracker.scales_graph()?;
    debug!("tracked {} tensors (backward: {})", graph.node_count(), backward);
    Ok(graph)
}
