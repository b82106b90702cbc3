//! Plain gradient-descent parameter updates.
//!
//! Call these only after `backward` has returned: the update writes the
//! parameter's data in place, and tensors downstream of it that were built
//! before the step keep the values they were computed from.

use crate::ops::dispatch;
use crate::tensors::Tensor;

/// `data -= lr * grad`, then clears the gradient.
///
/// Returns `false` and leaves `param` untouched if it has no gradient.
pub fn sgd(param: &Tensor, lr: f64) -> bool {
    let device = param.device();
    param.consume_grad(|data, grad| dispatch::descend(device, data, grad, lr))
}

/// [`sgd`] over every tensor in `params`. Returns how many were updated.
pub fn sgd_all(params: &[Tensor], lr: f64) -> usize {
    let updated = params.iter().filter(|p| sgd(p, lr)).count();
    tracing::debug!(params = params.len(), updated, lr, "sgd step");
    updated
}
