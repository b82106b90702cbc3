//! Approximate equality of `f64` buffers.
//!
//! The reference and accelerated backends sum in different orders, and the
//! GPU matrix product rounds through `f32`, so their outputs are compared on
//! a graded scale rather than bit for bit.

/// Largest difference still graded [`Closeness::Exact`].
pub const EXACT_ERROR: f64 = 1e-12;

/// Largest difference still graded [`Closeness::Close`]; the tolerance for
/// CPU kernels that only reorder additions.
pub const CPU_TOLERANCE: f64 = 1e-9;

/// Largest difference still graded [`Closeness::Loose`]; the tolerance for
/// results that went through the `f32` GPU kernel.
pub const GPU_TOLERANCE: f64 = 1e-3;

/// Graded closeness of two values or buffers, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Closeness {
    /// Within [`EXACT_ERROR`].
    Exact,
    /// Within [`CPU_TOLERANCE`].
    Close,
    /// Within [`GPU_TOLERANCE`].
    Loose,
    /// Further apart, of different lengths, or involving NaN.
    Apart,
}

impl Closeness {
    /// Grades an absolute difference.
    pub fn of_difference(diff: f64) -> Self {
        if diff <= EXACT_ERROR {
            Self::Exact
        } else if diff <= CPU_TOLERANCE {
            Self::Close
        } else if diff <= GPU_TOLERANCE {
            Self::Loose
        } else {
            // also catches NaN
            Self::Apart
        }
    }
}

/// Largest element-wise `|a - b|`, or `None` if the lengths differ.
pub fn max_abs_diff(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.len() != b.len() {
        return None;
    }
    Some(a.iter().zip(b).fold(0.0_f64, |acc, (x, y)| {
        let d = (x - y).abs();
        if d.is_nan() || acc.is_nan() { f64::NAN } else { acc.max(d) }
    }))
}

/// Worst-case grade over two buffers.
pub fn closeness(a: &[f64], b: &[f64]) -> Closeness {
    max_abs_diff(a, b).map_or(Closeness::Apart, Closeness::of_difference)
}

/// Whether `a` and `b` have equal length and differ by at most `tol`
/// element-wise.
pub fn all_close(a: &[f64], b: &[f64], tol: f64) -> bool {
    max_abs_diff(a, b).is_some_and(|d| d <= tol)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grades() {
        assert_eq!(closeness(&[1.0, 2.0], &[1.0, 2.0]), Closeness::Exact);
        assert_eq!(closeness(&[1.0], &[1.0 + 1e-10]), Closeness::Close);
        assert_eq!(closeness(&[1.0], &[1.0001]), Closeness::Loose);
        assert_eq!(closeness(&[1.0], &[1.1]), Closeness::Apart);
        assert_eq!(closeness(&[1.0], &[1.0, 2.0]), Closeness::Apart);
        assert_eq!(closeness(&[f64::NAN], &[0.0]), Closeness::Apart);
    }

    #[test]
    fn all_close_respects_tolerance() {
        assert!(all_close(&[0.25; 4], &[0.250_000_1; 4], 1e-6));
        assert!(!all_close(&[0.25; 4], &[0.26; 4], 1e-6));
        assert!(!all_close(&[], &[0.0], 1.0));
    }
}
