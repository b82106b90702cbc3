//! Operation nodes of the computational graph.
//!
//! Each primitive is a forward/backward pair:
//!
//! | Operation | Forward            | Backward (upstream `g`)            |
//! |-----------|--------------------|------------------------------------|
//! | Add       | `a + b`            | `∂a = g`, `∂b = g`                 |
//! | Multiply  | `a * b`            | `∂a = g * b`, `∂b = g * a`         |
//! | MatMul    | `a @ b`            | `∂a = g @ bᵀ`, `∂b = aᵀ @ g`       |
//! | Mean      | `sum(a) / count`   | `∂a = full(shape(a), g / count)`   |
//! | Transpose | `aᵀ` (rank 2)      | `∂a = gᵀ`                          |
//!
//! A forward call validates shapes up front, computes the output on the
//! first operand's device, and records the operation and operands on the
//! output. Scalar constants passed to `add`/`multiply` are not parents; the
//! operation keeps the constant as metadata instead.

use crate::backend::{OpKind, Pass};
use crate::error::{Result, TensorError};
use crate::ops::dispatch;
use crate::shape;
use crate::tensors::{Operand, Tensor};

/// The operation that produced a non-leaf tensor, with the scalar metadata
/// its backward pass needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operation {
    /// Element-wise sum; `scalar` is set when the right operand was a constant.
    Add {
        /// Constant right operand, if any.
        scalar: Option<f64>,
    },
    /// Element-wise product; `scalar` is set when the right operand was a constant.
    Multiply {
        /// Constant right operand, if any.
        scalar: Option<f64>,
    },
    /// `(m×k) × (k×n)` matrix product.
    MatMul {
        /// Rows of the left operand.
        m: usize,
        /// Shared inner dimension.
        k: usize,
        /// Columns of the right operand.
        n: usize,
    },
    /// Mean over `count` elements.
    Mean {
        /// Number of reduced elements.
        count: usize,
    },
    /// Transpose of a `rows×cols` matrix.
    Transpose {
        /// Rows of the input.
        rows: usize,
        /// Columns of the input.
        cols: usize,
    },
}

impl Operation {
    /// Which primitive this is.
    pub fn kind(&self) -> OpKind {
        match self {
            Self::Add { .. } => OpKind::Add,
            Self::Multiply { .. } => OpKind::Multiply,
            Self::MatMul { .. } => OpKind::MatMul,
            Self::Mean { .. } => OpKind::Mean,
            Self::Transpose { .. } => OpKind::Transpose,
        }
    }

    /// Number of tensor operands recorded as parents.
    pub fn arity(&self) -> usize {
        match self {
            Self::Add { scalar } | Self::Multiply { scalar } => {
                if scalar.is_some() {
                    1
                } else {
                    2
                }
            }
            Self::MatMul { .. } => 2,
            Self::Mean { .. } | Self::Transpose { .. } => 1,
        }
    }

    /// Gradient contribution for each parent, given the upstream gradient
    /// `grad` of `output`. Parents that don't require grad get `None` and
    /// nothing is computed for them.
    pub(crate) fn gradients(
        &self,
        grad: &[f64],
        output: &Tensor,
        parents: &[Tensor],
    ) -> Vec<Option<Vec<f64>>> {
        let device = output.device();
        let wants = |i: usize| parents.get(i).is_some_and(Tensor::requires_grad);
        let op = self.kind().name();
        let _span = tracing::trace_span!("backward_op", op, id = output.id()).entered();
        let times = |a: &[f64], b: &[f64]| dispatch::multiply(device, Pass::Backward, a, b);

        match *self {
            Self::Add { .. } => (0..parents.len())
                .map(|i| wants(i).then(|| grad.to_vec()))
                .collect(),

            Self::Multiply { scalar } => {
                let mut out = vec![None, None];
                if wants(0) {
                    let da = match scalar {
                        Some(c) => times(grad, &dispatch::fill(device, grad.len(), c)),
                        None => parents[1].with_data(|b| times(grad, b)),
                    };
                    out[0] = Some(da);
                }
                if wants(1) {
                    out[1] = Some(parents[0].with_data(|a| times(grad, a)));
                }
                out.truncate(parents.len());
                out
            }

            Self::MatMul { m, k, n } => {
                let mut out = vec![None, None];
                if wants(0) {
                    // (m×n) @ (n×k)
                    let b_t = parents[1]
                        .with_data(|b| dispatch::transpose(device, Pass::Backward, b, k, n));
                    out[0] = Some(dispatch::matmul(device, Pass::Backward, grad, &b_t, m, n, k));
                }
                if wants(1) {
                    // (k×m) @ (m×n)
                    let a_t = parents[0]
                        .with_data(|a| dispatch::transpose(device, Pass::Backward, a, m, k));
                    out[1] = Some(dispatch::matmul(device, Pass::Backward, &a_t, grad, k, m, n));
                }
                out
            }

            Self::Mean { count } => {
                vec![wants(0).then(|| dispatch::mean_backward(device, count, grad[0]))]
            }

            Self::Transpose { rows, cols } => {
                // grad is cols×rows
                let dt = wants(0)
                    .then(|| dispatch::transpose(device, Pass::Backward, grad, cols, rows));
                vec![dt]
            }
        }
    }
}

fn same_shape(op: OpKind, a: &Tensor, b: &Tensor) -> Result<()> {
    if a.shape() == b.shape() {
        Ok(())
    } else {
        Err(TensorError::ShapeMismatch {
            op: op.name(),
            left: a.shape().to_vec(),
            right: b.shape().to_vec(),
        })
    }
}

fn matrix_dims(op: OpKind, t: &Tensor) -> Result<(usize, usize)> {
    match *t.shape() {
        [rows, cols] => Ok((rows, cols)),
        _ => Err(TensorError::UnsupportedRank {
            op: op.name(),
            expected: 2,
            actual: t.rank(),
        }),
    }
}

/// Shared forward path of `add` and `multiply`.
fn elementwise(
    a: &Tensor,
    other: Operand<'_>,
    kind: OpKind,
    kernel: impl Fn(&[f64], &[f64]) -> Vec<f64>,
    operation: impl FnOnce(Option<f64>) -> Operation,
) -> Result<Tensor> {
    let shape = a.shape().to_vec();
    match other {
        Operand::Tensor(b) => {
            same_shape(kind, a, b)?;
            let data = a.with_data(|x| b.with_data(|y| kernel(x, y)));
            let parents = vec![a.clone(), b.clone()];
            Ok(Tensor::from_operation(shape, data, operation(None), parents))
        }
        Operand::Scalar(c) => {
            let constant = a.full_like(c);
            let data = a.with_data(|x| constant.with_data(|y| kernel(x, y)));
            Ok(Tensor::from_operation(shape, data, operation(Some(c)), vec![a.clone()]))
        }
    }
}

/// Forward pass of `Add`.
pub(crate) fn add(a: &Tensor, other: Operand<'_>) -> Result<Tensor> {
    let device = a.device();
    elementwise(
        a,
        other,
        OpKind::Add,
        |x, y| dispatch::add(device, x, y),
        |scalar| Operation::Add { scalar },
    )
}

/// Forward pass of `Multiply`.
pub(crate) fn multiply(a: &Tensor, other: Operand<'_>) -> Result<Tensor> {
    let device = a.device();
    elementwise(
        a,
        other,
        OpKind::Multiply,
        |x, y| dispatch::multiply(device, Pass::Forward, x, y),
        |scalar| Operation::Multiply { scalar },
    )
}

/// Forward pass of `MatMul`.
pub(crate) fn matmul(a: &Tensor, b: &Tensor) -> Result<Tensor> {
    let (m, k) = matrix_dims(OpKind::MatMul, a)?;
    let (k2, n) = matrix_dims(OpKind::MatMul, b)?;
    if k != k2 {
        return Err(TensorError::ShapeMismatch {
            op: OpKind::MatMul.name(),
            left: a.shape().to_vec(),
            right: b.shape().to_vec(),
        });
    }

    let device = a.device();
    let data =
        a.with_data(|x| b.with_data(|y| dispatch::matmul(device, Pass::Forward, x, y, m, k, n)));
    let parents = vec![a.clone(), b.clone()];
    Ok(Tensor::from_operation(vec![m, n], data, Operation::MatMul { m, k, n }, parents))
}

/// Forward pass of `Mean`.
pub(crate) fn mean(a: &Tensor) -> Result<Tensor> {
    let count = a.numel();
    let value = a.with_data(|x| dispatch::mean(a.device(), x));
    Ok(Tensor::from_operation(Vec::new(), vec![value], Operation::Mean { count }, vec![a.clone()]))
}

/// Forward pass of `Transpose`.
pub(crate) fn transpose(a: &Tensor) -> Result<Tensor> {
    let shape = shape::transposed_shape(a.shape())?;
    let (rows, cols) = (shape[1], shape[0]);
    let data = a.with_data(|x| dispatch::transpose(a.device(), Pass::Forward, x, rows, cols));
    Ok(Tensor::from_operation(shape, data, Operation::Transpose { rows, cols }, vec![a.clone()]))
}
