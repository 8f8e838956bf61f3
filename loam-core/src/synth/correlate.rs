//! Cross-channel correlated noise via Cholesky injection.
//!
//! A single seeded random factor induces the target correlation matrix
//! (`C = λλᵀ` off the diagonal, unit diagonal). If the factorisation is
//! ill-conditioned the diagonal is jittered, escalating tenfold from
//! `1e-5` up to six times before falling back to a heavy `0.1` ridge
//! that is always factorisable in practice.

use nalgebra::DMatrix;
use rand::Rng;
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand_distr::StandardNormal;
use tracing::warn;

use crate::dense::DenseMatrix;

/// Initial diagonal jitter for an ill-conditioned correlation matrix.
const JITTER_BASE: f64 = 1e-5;
/// Escalation attempts before the heavy fallback ridge.
const JITTER_ATTEMPTS: u32 = 6;
/// Fallback ridge when escalation fails.
const JITTER_FALLBACK: f64 = 0.1;

/// Draws an `n_steps × n_channels` matrix of correlated standard-normal
/// samples: independent normals multiplied by the lower-triangular
/// Cholesky factor of a seeded single-factor correlation matrix.
#[must_use]
pub fn correlated_noise(rng: &mut StdRng, n_steps: usize, n_channels: usize) -> DenseMatrix {
    if n_channels == 0 || n_steps == 0 {
        return DenseMatrix::zeros(n_steps, n_channels);
    }
    let loadings = Uniform::new(0.3_f64, 0.9);
    let factor: Vec<f64> = (0..n_channels).map(|_| loadings.sample(rng)).collect();
    let correlation = DMatrix::<f64>::from_fn(n_channels, n_channels, |i, j| {
        if i == j { 1.0 } else { factor[i] * factor[j] }
    });
    let lower = factor_with_jitter(correlation);

    let mut out = DenseMatrix::zeros(n_steps, n_channels);
    let mut draw = vec![0.0_f64; n_channels];
    for step in 0..n_steps {
        for slot in draw.iter_mut() {
            *slot = rng.sample(StandardNormal);
        }
        for channel in 0..n_channels {
            let mixed: f64 = (0..=channel)
                .map(|k| lower[(channel, k)] * draw[k])
                .sum();
            out.set(step, channel, mixed as f32);
        }
    }
    out
}

/// Cholesky with escalating diagonal jitter.
fn factor_with_jitter(correlation: DMatrix<f64>) -> DMatrix<f64> {
    if let Some(chol) = correlation.clone().cholesky() {
        return chol.l();
    }
    let n = correlation.nrows();
    let mut jitter = JITTER_BASE;
    for _ in 0..JITTER_ATTEMPTS {
        let jittered = &correlation + DMatrix::<f64>::identity(n, n) * jitter;
        if let Some(chol) = jittered.cholesky() {
            return chol.l();
        }
        jitter *= 10.0;
    }
    warn!(channels = n, "correlation matrix stayed ill-conditioned, applying heavy ridge");
    let ridged = &correlation + DMatrix::<f64>::identity(n, n) * JITTER_FALLBACK;
    ridged
        .clone()
        .cholesky()
        .map_or_else(|| DMatrix::<f64>::identity(n, n), |chol| chol.l())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn same_seed_reproduces_the_noise_bitwise() {
        let mut left_rng = StdRng::seed_from_u64(41);
        let mut right_rng = StdRng::seed_from_u64(41);
        let left = correlated_noise(&mut left_rng, 200, 5);
        let right = correlated_noise(&mut right_rng, 200, 5);
        assert_eq!(left, right);
    }

    #[test]
    fn channels_come_out_positively_correlated() {
        let mut rng = StdRng::seed_from_u64(7);
        let noise = correlated_noise(&mut rng, 4000, 2);
        let (a, b) = (noise.column(0), noise.column(1));
        let mean = |v: &[f32]| v.iter().sum::<f32>() / v.len() as f32;
        let (ma, mb) = (mean(&a), mean(&b));
        let cov: f32 = a
            .iter()
            .zip(&b)
            .map(|(&x, &y)| (x - ma) * (y - mb))
            .sum::<f32>()
            / a.len() as f32;
        let var = |v: &[f32], m: f32| v.iter().map(|&x| (x - m).powi(2)).sum::<f32>() / v.len() as f32;
        let corr = cov / (var(&a, ma) * var(&b, mb)).sqrt();
        // Loadings live in [0.3, 0.9], so the induced correlation is at
        // least 0.09 in expectation; 4000 samples put it well clear of 0.
        assert!(corr > 0.05, "expected positive cross-correlation, got {corr}");
    }

    #[test]
    fn degenerate_shapes_produce_empty_noise() {
        let mut rng = StdRng::seed_from_u64(3);
        assert_eq!(correlated_noise(&mut rng, 0, 4).rows(), 0);
        assert_eq!(correlated_noise(&mut rng, 16, 0).cols(), 0);
    }
}
