//! Standard-normal sampling for weight initialization.
//!
//! Samples come in pairs from the Box–Muller transform: two uniforms
//! `u1, u2 ∈ [0, 1)` give
//!
//! ```text
//! r  = sqrt(-2 ln(1 - u1))
//! z0 = r cos(2π u2)
//! z1 = r sin(2π u2)
//! ```
//!
//! `1 - u1` lies in `(0, 1]`, so the logarithm is always finite. An odd
//! request drops the last sample of the final pair.

use std::f64::consts::TAU;

use rand::Rng;

/// `n` independent N(0, 1) samples from the thread-local generator.
pub fn standard_normal(n: usize) -> Vec<f64> {
    standard_normal_with(&mut rand::rng(), n)
}

/// `n` independent N(0, 1) samples from `rng`.
pub fn standard_normal_with<R: Rng + ?Sized>(rng: &mut R, n: usize) -> Vec<f64> {
    let mut out = Vec::with_capacity(n + 1);
    while out.len() < n {
        let u1: f64 = rng.random();
        let u2: f64 = rng.random();
        let r = (-2.0 * (1.0 - u1).ln()).sqrt();
        let theta = TAU * u2;
        out.push(r * theta.cos());
        out.push(r * theta.sin());
    }
    out.truncate(n);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn exact_length() {
        let mut rng = StdRng::seed_from_u64(7);
        for n in [0, 1, 2, 5, 64] {
            assert_eq!(standard_normal_with(&mut rng, n).len(), n);
        }
    }

    #[test]
    fn seeded_is_reproducible() {
        let a = standard_normal_with(&mut StdRng::seed_from_u64(42), 9);
        let b = standard_normal_with(&mut StdRng::seed_from_u64(42), 9);
        assert_eq!(a, b);
    }

    #[test]
    fn moments_are_close_to_standard() {
        let samples = standard_normal_with(&mut StdRng::seed_from_u64(1234), 20_000);
        let n = samples.len() as f64;
        let mean = samples.iter().sum::<f64>() / n;
        let var = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
        assert!(mean.abs() < 0.05, "mean = {mean}");
        assert!((var - 1.0).abs() < 0.05, "var = {var}");
        assert!(samples.iter().all(|x| x.is_finite()));
    }
}
