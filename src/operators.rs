//! Dense operator builders for the 1-D deconvolution testbed.
//!
//! Both builders are pure functions of a uniformly spaced coordinate grid:
//! the forward operator discretizes the smoothing kernel
//! `A x(t) = ∫₀¹ x(s) / (1 + (t − s)²)^{3/2} ds` by the midpoint rule, and
//! the regularization operator is the second-order finite-difference matrix.

use crate::engine::EstimationError;
use ndarray::{Array1, Array2};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

fn grid_spacing(t: &Array1<f64>) -> Result<f64, EstimationError> {
    if t.len() < 2 {
        return Err(EstimationError::InvalidInput(format!(
            "coordinate grid needs at least 2 points, got {}",
            t.len()
        )));
    }
    let h = t[1] - t[0];
    if !(h > 0.0 && h.is_finite()) {
        return Err(EstimationError::InvalidInput(format!(
            "coordinate grid must be increasing with finite spacing, got h = {h}"
        )));
    }
    Ok(h)
}

/// Discretized smoothing (blur) kernel: `A[i, j] = h / (1 + (t_i − t_j)²)^{3/2}`.
pub fn forward_operator(t: &Array1<f64>) -> Result<Array2<f64>, EstimationError> {
    let h = grid_spacing(t)?;
    let n = t.len();
    Ok(Array2::from_shape_fn((n, n), |(i, j)| {
        let d = t[i] - t[j];
        h / (1.0 + d * d).powf(1.5)
    }))
}

/// Second-order finite-difference matrix `(1/h²)·tridiag(1, −2, 1)`.
pub fn second_difference(t: &Array1<f64>) -> Result<Array2<f64>, EstimationError> {
    let h = grid_spacing(t)?;
    let n = t.len();
    let scale = 1.0 / (h * h);
    let mut l = Array2::zeros((n, n));
    for i in 0..n {
        l[[i, i]] = -2.0 * scale;
        if i > 0 {
            l[[i, i - 1]] = scale;
        }
        if i + 1 < n {
            l[[i, i + 1]] = scale;
        }
    }
    Ok(l)
}

/// One synthetic deconvolution experiment: grid, ground truth, operators, and
/// a noisy observation.
pub struct SyntheticProblem {
    pub t: Array1<f64>,
    pub x_true: Array1<f64>,
    pub y_clean: Array1<f64>,
    pub y_delta: Array1<f64>,
    pub A: Array2<f64>,
    pub L: Array2<f64>,
}

/// Build the standard testbed: `n` points on [0, 1], smooth sine ground
/// truth, blur forward operator, and additive Gaussian noise with standard
/// deviation `noise_std` (pass 0 for a noiseless observation).
pub fn synthetic_deconvolution(
    n: usize,
    noise_std: f64,
    seed: u64,
) -> Result<SyntheticProblem, EstimationError> {
    if noise_std < 0.0 {
        return Err(EstimationError::InvalidInput(format!(
            "noise standard deviation must be non-negative, got {noise_std}"
        )));
    }
    let t = Array1::linspace(0.0, 1.0, n);
    let A = forward_operator(&t)?;
    let L = second_difference(&t)?;
    let x_true = t.mapv(|v| (std::f64::consts::PI * v).sin());
    let y_clean = A.dot(&x_true);
    let y_delta = if noise_std > 0.0 {
        let mut rng = StdRng::seed_from_u64(seed);
        let normal = Normal::new(0.0, noise_std).map_err(|e| {
            EstimationError::InvalidInput(format!("invalid noise distribution: {e}"))
        })?;
        &y_clean + &Array1::from_shape_fn(n, |_| normal.sample(&mut rng))
    } else {
        y_clean.clone()
    };
    Ok(SyntheticProblem {
        t,
        x_true,
        y_clean,
        y_delta,
        A,
        L,
    })
}
