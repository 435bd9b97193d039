//! # Scale Analysis Module
//!
//! Passes over the [`ScalesGraph`](crate::tracking::ScalesGraph) produced by
//! the tracker, run before plotting.
//!
//! ## Available Passes
//!
//! - [`prune_non_float_tensors`]: drops integer tensors (ids, labels), which
//!   have no meaningful floating-point scale.
//! - [`prune_same_scale_tensors`]: drops views and other ops that leave the
//!   scale of their input unchanged, to declutter the chart.
//! - [`graph_to_table`]: flattens the graph into a [`Table`], one row per
//!   tensor per direction.
//!
//! ```text
//! ScalesGraph -> prune non-float -> prune same-scale -> Table
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use asg_scales::analysis::{graph_to_table, prune_non_float_tensors};
//!
//! let graph = tracker.scales_graph()?;
//! let table = graph_to_table(&prune_non_float_tensors(&graph));
//! println!("{table}");
//! ```

pub mod prune;
pub mod table;

pub use prune::{prune_non_float_tensors, prune_same_scale_tensors, SAME_SCALE_RTOL};
pub use table::{graph_to_table, tensor_type, FlatRow, Table};
