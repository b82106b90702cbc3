//! Accelerated CPU backend kernels.
//!
//! Each kernel is a data-parallel map over an output-sized grid on the
//! [`rayon`](https://docs.rs/rayon) thread pool: one independent task per
//! output element, or per output row for the matrix product. All functions
//! return only once every task has finished, so callers see a fully
//! materialized buffer.
//!
//! Results match [`super::cpu`] up to floating-point reordering; the matrix
//! product accumulates each dot product in the same order as the reference
//! loop, so in practice it is bit-identical.

use rayon::prelude::*;

/// `out[i] = a[i] + b[i]`
pub fn add(a: &[f64], b: &[f64]) -> Vec<f64> {
    debug_assert_eq!(a.len(), b.len());
    a.par_iter().zip(b.par_iter()).map(|(&x, &y)| x + y).collect()
}

/// `out[i] = a[i] * b[i]`
pub fn multiply(a: &[f64], b: &[f64]) -> Vec<f64> {
    debug_assert_eq!(a.len(), b.len());
    a.par_iter().zip(b.par_iter()).map(|(&x, &y)| x * y).collect()
}

/// Matrix product `C = A × B` (`A: m×k`, `B: k×n`), one task per output row.
pub fn matmul(a: &[f64], b: &[f64], m: usize, k: usize, n: usize) -> Vec<f64> {
    debug_assert_eq!(a.len(), m * k);
    debug_assert_eq!(b.len(), k * n);
    let mut out = vec![0.0; m * n];
    if n == 0 {
        return out;
    }

    out.par_chunks_mut(n).enumerate().for_each(|(i, row)| {
        let a_row = &a[i * k..(i + 1) * k];
        for (j, cell) in row.iter_mut().enumerate() {
            let mut sum = 0.0;
            for (l, &x) in a_row.iter().enumerate() {
                sum += x * b[l * n + j];
            }
            *cell = sum;
        }
    });

    out
}

/// Transpose of a `rows×cols` matrix, one task per output element.
pub fn transpose(a: &[f64], rows: usize, cols: usize) -> Vec<f64> {
    debug_assert_eq!(a.len(), rows * cols);
    (0..rows * cols)
        .into_par_iter()
        .map(|idx| {
            // output is cols×rows: idx = j * rows + i
            let (j, i) = (idx / rows, idx % rows);
            a[i * cols + j]
        })
        .collect()
}

/// `len` copies of `value`.
pub fn fill(len: usize, value: f64) -> Vec<f64> {
    let mut out = vec![0.0; len];
    out.par_iter_mut().for_each(|x| *x = value);
    out
}

/// `dst[i] += src[i]`
pub fn accumulate(dst: &mut [f64], src: &[f64]) {
    debug_assert_eq!(dst.len(), src.len());
    dst.par_iter_mut().zip(src.par_iter()).for_each(|(d, &s)| *d += s);
}

/// `dst[i] -= lr * src[i]`
pub fn descend(dst: &mut [f64], src: &[f64], lr: f64) {
    debug_assert_eq!(dst.len(), src.len());
    dst.par_iter_mut().zip(src.par_iter()).for_each(|(d, &s)| *d -= lr * s);
}
