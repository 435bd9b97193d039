//! CPU kernels used by the interpreter and by the reverse pass.
//!
//! Everything operates on owned `ndarray` values; shapes are checked up front
//! so that a bad graph surfaces as a [`RuntimeError`] rather than a panic
//! inside `ndarray`.

use super::RuntimeError;
use ndarray::{Array2, ArrayD, Axis, IxDyn, Zip};

type Result<T> = std::result::Result<T, RuntimeError>;

const GELU_COEFF: f32 = 0.044_715;
// sqrt(2 / pi)
const GELU_SCALE: f32 = 0.797_884_6;

/// Numpy-style broadcast of two shapes.
pub fn broadcast_shape(a: &[usize], b: &[usize]) -> Option<Vec<usize>> {
    let rank = a.len().max(b.len());
    let mut out = vec![0; rank];
    for i in 0..rank {
        let da = if i < rank - a.len() { 1 } else { a[i - (rank - a.len())] };
        let db = if i < rank - b.len() { 1 } else { b[i - (rank - b.len())] };
        out[i] = match (da, db) {
            (x, y) if x == y => x,
            (1, y) => y,
            (x, 1) => x,
            _ => return None,
        };
    }
    Some(out)
}

fn zip_broadcast(
    a: &ArrayD<f32>,
    b: &ArrayD<f32>,
    f: impl Fn(f32, f32) -> f32,
) -> Result<ArrayD<f32>> {
    let shape = broadcast_shape(a.shape(), b.shape()).ok_or_else(|| {
        RuntimeError::ShapeError(format!("cannot broadcast {:?} with {:?}", a.shape(), b.shape()))
    })?;
    // Both broadcasts are valid once the common shape exists.
    let av = a
        .broadcast(IxDyn(&shape))
        .ok_or_else(|| RuntimeError::ShapeError(format!("{:?}", a.shape())))?;
    let bv = b
        .broadcast(IxDyn(&shape))
        .ok_or_else(|| RuntimeError::ShapeError(format!("{:?}", b.shape())))?;
    Ok(Zip::from(&av).and(&bv).map_collect(|&x, &y| f(x, y)))
}

pub fn op_add(a: &ArrayD<f32>, b: &ArrayD<f32>) -> Result<ArrayD<f32>> {
    zip_broadcast(a, b, |x, y| x + y)
}

pub fn op_subtract(a: &ArrayD<f32>, b: &ArrayD<f32>) -> Result<ArrayD<f32>> {
    zip_broadcast(a, b, |x, y| x - y)
}

pub fn op_multiply(a: &ArrayD<f32>, b: &ArrayD<f32>) -> Result<ArrayD<f32>> {
    zip_broadcast(a, b, |x, y| x * y)
}

/// Sums `grad` down to `target` shape, undoing a broadcast.
pub fn reduce_sum_to(grad: ArrayD<f32>, target: &[usize]) -> Result<ArrayD<f32>> {
    let mut out = grad;
    while out.ndim() > target.len() {
        out = out.sum_axis(Axis(0));
    }
    for (axis, &dim) in target.iter().enumerate() {
        if dim == 1 && out.shape()[axis] != 1 {
            out = out.sum_axis(Axis(axis)).insert_axis(Axis(axis));
        }
    }
    if out.shape() != target {
        return Err(RuntimeError::ShapeError(format!(
            "cannot reduce {:?} to {:?}",
            out.shape(),
            target
        )));
    }
    Ok(out)
}

/// Flattens all leading axes: `[..., k]` -> `[n, k]`.
pub fn to_matrix(a: &ArrayD<f32>) -> Result<Array2<f32>> {
    let k = *a
        .shape()
        .last()
        .ok_or_else(|| RuntimeError::ShapeError("expected at least 1-D tensor".into()))?;
    let n = if k == 0 { 0 } else { a.len() / k };
    Array2::from_shape_vec((n, k), a.iter().copied().collect())
        .map_err(|e| RuntimeError::ShapeError(e.to_string()))
}

/// Inverse of [`to_matrix`]: `[n, m]` -> `leading + [m]`.
pub fn from_matrix(m: Array2<f32>, leading: &[usize]) -> Result<ArrayD<f32>> {
    let mut shape = leading.to_vec();
    shape.push(m.ncols());
    ArrayD::from_shape_vec(IxDyn(&shape), m.iter().copied().collect())
        .map_err(|e| RuntimeError::ShapeError(e.to_string()))
}

fn require_2d(b: &ArrayD<f32>, op: &str) -> Result<Array2<f32>> {
    b.view()
        .into_dimensionality::<ndarray::Ix2>()
        .map(|v| v.to_owned())
        .map_err(|_| {
            RuntimeError::ShapeError(format!("{op}: expected a 2-D operand, got {:?}", b.shape()))
        })
}

pub fn op_matmul(a: &ArrayD<f32>, b: &ArrayD<f32>) -> Result<ArrayD<f32>> {
    let b2 = require_2d(b, "matmul")?;
    let a2 = to_matrix(a)?;
    if a2.ncols() != b2.nrows() {
        return Err(RuntimeError::ShapeError(format!(
            "incompatible matmul shapes: {:?} and {:?}",
            a.shape(),
            b.shape()
        )));
    }
    from_matrix(a2.dot(&b2), &a.shape()[..a.ndim() - 1])
}

pub fn op_linear(
    x: &ArrayD<f32>,
    w: &ArrayD<f32>,
    bias: Option<&ArrayD<f32>>,
) -> Result<ArrayD<f32>> {
    let w2 = require_2d(w, "linear")?;
    let x2 = to_matrix(x)?;
    if x2.ncols() != w2.ncols() {
        return Err(RuntimeError::ShapeError(format!(
            "linear: input {:?} does not match weight {:?}",
            x.shape(),
            w.shape()
        )));
    }
    let mut y = x2.dot(&w2.t());
    if let Some(b) = bias {
        if b.shape() != [w2.nrows()] {
            return Err(RuntimeError::ShapeError(format!(
                "linear: bias {:?} does not match weight {:?}",
                b.shape(),
                w.shape()
            )));
        }
        let b1 = b
            .view()
            .into_dimensionality::<ndarray::Ix1>()
            .map_err(|e| RuntimeError::ShapeError(e.to_string()))?;
        y += &b1;
    }
    from_matrix(y, &x.shape()[..x.ndim() - 1])
}

pub fn op_relu(a: &ArrayD<f32>) -> ArrayD<f32> {
    a.mapv(|v| v.max(0.0))
}

/// GELU, tanh approximation.
pub fn op_gelu(a: &ArrayD<f32>) -> ArrayD<f32> {
    a.mapv(|x| 0.5 * x * (1.0 + (GELU_SCALE * (x + GELU_COEFF * x.powi(3))).tanh()))
}

pub fn gelu_derivative(x: f32) -> f32 {
    let inner = GELU_SCALE * (x + GELU_COEFF * x.powi(3));
    let t = inner.tanh();
    let d_inner = GELU_SCALE * (1.0 + 3.0 * GELU_COEFF * x * x);
    0.5 * (1.0 + t) + 0.5 * x * (1.0 - t * t) * d_inner
}

pub fn op_sigmoid(a: &ArrayD<f32>) -> ArrayD<f32> {
    a.mapv(|x| 1.0 / (1.0 + (-x).exp()))
}

pub fn op_tanh(a: &ArrayD<f32>) -> ArrayD<f32> {
    a.mapv(f32::tanh)
}

pub fn op_softmax(a: &ArrayD<f32>) -> Result<ArrayD<f32>> {
    if a.ndim() == 0 {
        return Err(RuntimeError::ShapeError("softmax of a scalar".into()));
    }
    let mut out = a.clone();
    let last = Axis(a.ndim() - 1);
    for mut lane in out.lanes_mut(last) {
        let max = lane.iter().fold(f32::NEG_INFINITY, |m, &v| m.max(v));
        lane.mapv_inplace(|v| (v - max).exp());
        let sum = lane.sum();
        lane.mapv_inplace(|v| v / sum);
    }
    Ok(out)
}

pub fn op_sum(a: &ArrayD<f32>) -> ArrayD<f32> {
    ndarray::arr0(a.sum()).into_dyn()
}

pub fn op_mean(a: &ArrayD<f32>) -> ArrayD<f32> {
    ndarray::arr0(a.mean().unwrap_or(f32::NAN)).into_dyn()
}

/// Resolves a target shape with at most one `-1` against `numel`.
pub fn resolve_shape(target: &[isize], numel: usize) -> Result<Vec<usize>> {
    let inferred: Vec<_> =
        target.iter().enumerate().filter(|(_, &d)| d == -1).map(|(i, _)| i).collect();
    if inferred.len() > 1 || target.iter().any(|&d| d < -1) {
        return Err(RuntimeError::ShapeError(format!("invalid view shape {:?}", target)));
    }
    let known: usize = target.iter().filter(|&&d| d >= 0).map(|&d| d as usize).product();
    let mut shape: Vec<usize> = target.iter().map(|&d| d.max(0) as usize).collect();
    let mismatch =
        || RuntimeError::ShapeError(format!("cannot view {} elements as {:?}", numel, target));
    if let Some(&i) = inferred.first() {
        if known == 0 || numel % known != 0 {
            return Err(mismatch());
        }
        shape[i] = numel / known;
    } else if known != numel {
        return Err(mismatch());
    }
    Ok(shape)
}

pub fn op_reshape<T: Copy>(a: &ArrayD<T>, shape: &[usize]) -> Result<ArrayD<T>> {
    ArrayD::from_shape_vec(IxDyn(shape), a.iter().copied().collect())
        .map_err(|e| RuntimeError::ShapeError(e.to_string()))
}

pub fn op_transpose(a: &ArrayD<f32>, axis1: usize, axis2: usize) -> Result<ArrayD<f32>> {
    if axis1 >= a.ndim() || axis2 >= a.ndim() {
        return Err(RuntimeError::ShapeError(format!(
            "transpose axes ({axis1}, {axis2}) out of range for {:?}",
            a.shape()
        )));
    }
    let mut axes: Vec<_> = (0..a.ndim()).collect();
    axes.swap(axis1, axis2);
    Ok(a.clone().permuted_axes(axes).as_standard_layout().into_owned())
}

fn check_ids(ids: &ArrayD<i64>, bound: usize, op: &str) -> Result<()> {
    match ids.iter().find(|&&i| i < 0 || i as usize >= bound) {
        Some(&bad) => Err(RuntimeError::IndexOutOfRange { op: op.to_string(), index: bad, bound }),
        None => Ok(()),
    }
}

pub fn op_embedding(ids: &ArrayD<i64>, table: &ArrayD<f32>) -> Result<ArrayD<f32>> {
    let table2 = require_2d(table, "embedding")?;
    check_ids(ids, table2.nrows(), "embedding")?;
    let dim = table2.ncols();
    let mut data = Vec::with_capacity(ids.len() * dim);
    for &id in ids.iter() {
        data.extend(table2.row(id as usize).iter().copied());
    }
    let mut shape = ids.shape().to_vec();
    shape.push(dim);
    ArrayD::from_shape_vec(IxDyn(&shape), data).map_err(|e| RuntimeError::ShapeError(e.to_string()))
}

/// Validates `logits: [n, c]` against `labels: [n]`, returning the softmax.
pub fn cross_entropy_probs(logits: &ArrayD<f32>, labels: &ArrayD<i64>) -> Result<Array2<f32>> {
    let l2 = require_2d(logits, "cross_entropy")?;
    if labels.shape() != [l2.nrows()] {
        return Err(RuntimeError::ShapeError(format!(
            "cross_entropy: labels {:?} do not match logits {:?}",
            labels.shape(),
            logits.shape()
        )));
    }
    check_ids(labels, l2.ncols(), "cross_entropy")?;
    let probs = op_softmax(&l2.into_dyn())?;
    probs
        .into_dimensionality::<ndarray::Ix2>()
        .map_err(|e| RuntimeError::ShapeError(e.to_string()))
}

pub fn op_cross_entropy(logits: &ArrayD<f32>, labels: &ArrayD<i64>) -> Result<ArrayD<f32>> {
    let probs = cross_entropy_probs(logits, labels)?;
    let n = probs.nrows();
    let total: f32 = labels
        .iter()
        .enumerate()
        .map(|(row, &label)| -probs[[row, label as usize]].max(f32::MIN_POSITIVE).ln())
        .sum();
    let loss = if n == 0 { f32::NAN } else { total / n as f32 };
    Ok(ndarray::arr0(loss).into_dyn())
}
