//! Reference backend kernels.
//!
//! Plain nested loops over flat, row-major buffers. Every other backend is
//! checked against these; they favour obviousness over speed.
//!
//! Callers validate shapes before calling in here, so the kernels only
//! `debug_assert!` their preconditions.

/// `out[i] = a[i] + b[i]`
pub fn add(a: &[f64], b: &[f64]) -> Vec<f64> {
    debug_assert_eq!(a.len(), b.len());
    let mut out = vec![0.0; a.len()];
    for i in 0..a.len() {
        out[i] = a[i] + b[i];
    }
    out
}

/// `out[i] = a[i] * b[i]`
pub fn multiply(a: &[f64], b: &[f64]) -> Vec<f64> {
    debug_assert_eq!(a.len(), b.len());
    let mut out = vec![0.0; a.len()];
    for i in 0..a.len() {
        out[i] = a[i] * b[i];
    }
    out
}

/// Matrix product `C = A × B` with `A: m×k`, `B: k×n`, `C: m×n`.
pub fn matmul(a: &[f64], b: &[f64], m: usize, k: usize, n: usize) -> Vec<f64> {
    debug_assert_eq!(a.len(), m * k);
    debug_assert_eq!(b.len(), k * n);
    let mut out = vec![0.0; m * n];
    for i in 0..m {
        for j in 0..n {
            let mut sum = 0.0;
            for l in 0..k {
                sum += a[i * k + l] * b[l * n + j];
            }
            out[i * n + j] = sum;
        }
    }
    out
}

/// Transpose of a `rows×cols` matrix, giving `cols×rows`.
pub fn transpose(a: &[f64], rows: usize, cols: usize) -> Vec<f64> {
    debug_assert_eq!(a.len(), rows * cols);
    let mut out = vec![0.0; a.len()];
    for i in 0..rows {
        for j in 0..cols {
            out[j * rows + i] = a[i * cols + j];
        }
    }
    out
}

/// Sum of every element.
pub fn sum(a: &[f64]) -> f64 {
    let mut total = 0.0;
    for &x in a {
        total += x;
    }
    total
}

/// `len` copies of `value`.
pub fn fill(len: usize, value: f64) -> Vec<f64> {
    vec![value; len]
}

/// `dst[i] += src[i]`
pub fn accumulate(dst: &mut [f64], src: &[f64]) {
    debug_assert_eq!(dst.len(), src.len());
    for i in 0..dst.len() {
        dst[i] += src[i];
    }
}

/// `dst[i] -= lr * src[i]`
pub fn descend(dst: &mut [f64], src: &[f64], lr: f64) {
    debug_assert_eq!(dst.len(), src.len());
    for i in 0..dst.len() {
        dst[i] -= lr * src[i];
    }
}
