//! Operation Dispatch Layer
//!
//! Selects the kernel for each operation from the tensor's [`Device`]:
//!
//! 1. `wgpu` GPU kernel (matrix product only, if the feature is enabled and an adapter exists)
//! 2. rayon kernel, when the device accelerates that operation and pass
//! 3. the reference loops otherwise
//!
//! Every function is synchronous and returns a fully computed buffer.

use crate::backend::{Device, OpKind, Pass};

use super::{cpu, parallel};

#[inline]
fn accelerated(device: Device, op: OpKind, pass: Pass) -> bool {
    let fast = device.accelerates(op, pass);
    tracing::trace!(op = op.name(), ?pass, ?device, accelerated = fast, "dispatch");
    fast
}

/// Element-wise `a + b`.
pub fn add(device: Device, a: &[f64], b: &[f64]) -> Vec<f64> {
    if accelerated(device, OpKind::Add, Pass::Forward) {
        parallel::add(a, b)
    } else {
        cpu::add(a, b)
    }
}

/// Element-wise `a * b`, used by both passes of `Multiply`.
pub fn multiply(device: Device, pass: Pass, a: &[f64], b: &[f64]) -> Vec<f64> {
    if accelerated(device, OpKind::Multiply, pass) {
        parallel::multiply(a, b)
    } else {
        cpu::multiply(a, b)
    }
}

/// Matrix product `(m×k) × (k×n)`.
///
/// With the `wgpu` feature, products on an accelerated device are offered
/// to the GPU first.
pub fn matmul(
    device: Device,
    pass: Pass,
    a: &[f64],
    b: &[f64],
    m: usize,
    k: usize,
    n: usize,
) -> Vec<f64> {
    if !accelerated(device, OpKind::MatMul, pass) {
        return cpu::matmul(a, b, m, k, n);
    }

    #[cfg(feature = "wgpu")]
    {
        if let Some(out) = super::wgpu::matmul(a, b, m, k, n) {
            return out;
        }
    }

    parallel::matmul(a, b, m, k, n)
}

/// Transpose of a `rows×cols` matrix.
pub fn transpose(device: Device, pass: Pass, a: &[f64], rows: usize, cols: usize) -> Vec<f64> {
    if accelerated(device, OpKind::Transpose, pass) {
        parallel::transpose(a, rows, cols)
    } else {
        cpu::transpose(a, rows, cols)
    }
}

/// Mean of every element. Always a reference reduction.
pub fn mean(device: Device, a: &[f64]) -> f64 {
    tracing::trace!(op = "mean", pass = ?Pass::Forward, ?device, accelerated = false, "dispatch");
    cpu::sum(a) / a.len() as f64
}

/// The backward kernel of `Mean`: `len` copies of `g / len`.
pub fn mean_backward(device: Device, len: usize, grad: f64) -> Vec<f64> {
    let value = grad / len as f64;
    if accelerated(device, OpKind::Mean, Pass::Backward) {
        parallel::fill(len, value)
    } else {
        cpu::fill(len, value)
    }
}

/// A buffer of `len` copies of `value`, for constant expansion and
/// gradient seeds. Not tied to an operation; runs on any accelerated device.
pub fn fill(device: Device, len: usize, value: f64) -> Vec<f64> {
    let fast = device == Device::Accelerated;
    tracing::trace!(op = "fill", ?device, accelerated = fast, "dispatch");
    if fast {
        parallel::fill(len, value)
    } else {
        cpu::fill(len, value)
    }
}

/// `dst += src`, used for gradient accumulation.
pub fn accumulate(device: Device, dst: &mut [f64], src: &[f64]) {
    match device {
        Device::Accelerated => parallel::accumulate(dst, src),
        Device::Reference => cpu::accumulate(dst, src),
    }
}

/// `dst -= lr * src`, used by the SGD parameter update.
pub fn descend(device: Device, dst: &mut [f64], src: &[f64], lr: f64) {
    match device {
        Device::Accelerated => parallel::descend(dst, src, lr),
        Device::Reference => cpu::descend(dst, src, lr),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_backward_spreads_gradient() {
        for device in [Device::Reference, Device::Accelerated] {
            assert_eq!(mean_backward(device, 4, 1.0), vec![0.25; 4]);
            assert_eq!(mean_backward(device, 2, -3.0), vec![-1.5; 2]);
        }
    }

    #[test]
    fn fill_matches_on_both_devices() {
        assert_eq!(fill(Device::Reference, 3, 2.5), fill(Device::Accelerated, 3, 2.5));
        assert!(fill(Device::Accelerated, 0, 1.0).is_empty());
    }
}
