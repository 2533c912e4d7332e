//! Negative log-posterior objective, its gradient components, and the
//! fixed-point profile objective used for contour diagnostics.
//!
//! The model is a Gaussian likelihood with noise precision `alpha`, a
//! Gaussian smoothness prior with precision `beta`, and independent Gamma
//! hyperpriors on both precisions:
//!
//! ```text
//! J(x, α, β) = ½·α·‖Ax − y‖² − (n/2 + a0 − 1)·ln α + b0·α
//!            + ½·β·‖Lx‖²    − (n/2 + a1 − 1)·ln β + b1·β
//! ```
//!
//! The logarithm terms are undefined for non-positive precisions, so every
//! entry point fails fast with [`EstimationError::InvalidHyperparameter`]
//! instead of returning a non-finite value.

use crate::engine::EstimationError;
use crate::faer_ndarray::solve_symmetric;
use crate::problem::{Hyperpriors, InverseProblem};
use ndarray::{Array1, Array2};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

pub(crate) fn check_positive(name: &'static str, value: f64) -> Result<(), EstimationError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(EstimationError::InvalidHyperparameter { name, value })
    }
}

/// Evaluate the negative log-posterior `J(x, alpha, beta)`.
pub fn neg_log_posterior(
    problem: &InverseProblem,
    priors: &Hyperpriors,
    x: &Array1<f64>,
    alpha: f64,
    beta: f64,
) -> Result<f64, EstimationError> {
    check_positive("alpha", alpha)?;
    check_positive("beta", beta)?;
    let half_n = problem.n() as f64 / 2.0;
    Ok(0.5 * alpha * problem.residual_norm_sq(x) - (half_n + priors.a0 - 1.0) * alpha.ln()
        + priors.b0 * alpha
        + 0.5 * beta * problem.smoothness_norm_sq(x)
        - (half_n + priors.a1 - 1.0) * beta.ln()
        + priors.b1 * beta)
}

/// The three partial-derivative components of `J` that feed the stopping
/// statistic.
///
/// The `x` component is the normal-equations residual
/// `(AᵗA + (β/α)·LᵗL)·x − Aᵗy`, i.e. `∇ₓJ / α`; the scalar components are the
/// exact partial derivatives with respect to `alpha` and `beta`.
#[derive(Clone, Debug)]
pub struct PosteriorGradient {
    pub x: Array1<f64>,
    pub alpha: f64,
    pub beta: f64,
}

impl PosteriorGradient {
    /// The convergence-monitor statistic
    /// `‖∂J/∂x‖² + (∂J/∂α)² + (∂J/∂β)²`.
    pub fn squared_norm(&self) -> f64 {
        self.x.dot(&self.x) + self.alpha * self.alpha + self.beta * self.beta
    }
}

/// The partial derivatives of `J` with respect to `alpha` and `beta` only.
/// Cheaper than [`gradient`] when the `x` component is not needed, as in the
/// gradient-stepped precision update.
pub fn precision_partials(
    problem: &InverseProblem,
    priors: &Hyperpriors,
    x: &Array1<f64>,
    alpha: f64,
    beta: f64,
) -> Result<(f64, f64), EstimationError> {
    check_positive("alpha", alpha)?;
    check_positive("beta", beta)?;
    let half_n = problem.n() as f64 / 2.0;
    let d_alpha =
        0.5 * problem.residual_norm_sq(x) - (half_n + priors.a0 - 1.0) / alpha + priors.b0;
    let d_beta =
        0.5 * problem.smoothness_norm_sq(x) - (half_n + priors.a1 - 1.0) / beta + priors.b1;
    Ok((d_alpha, d_beta))
}

/// Evaluate all three gradient components at `(x, alpha, beta)`.
pub fn gradient(
    problem: &InverseProblem,
    priors: &Hyperpriors,
    x: &Array1<f64>,
    alpha: f64,
    beta: f64,
) -> Result<PosteriorGradient, EstimationError> {
    let (d_alpha, d_beta) = precision_partials(problem, priors, x, alpha, beta)?;
    Ok(PosteriorGradient {
        x: problem.normal_residual(x, beta / alpha),
        alpha: d_alpha,
        beta: d_beta,
    })
}

/// Fixed-point profile objective: solve for the optimal `x` at the given
/// `(alpha, beta)` through the exact closed form and return `J` there.
///
/// Pure function used by contour diagnostics to sweep a 2-D grid of
/// hyperparameter values.
pub fn profile_objective(
    problem: &InverseProblem,
    priors: &Hyperpriors,
    alpha: f64,
    beta: f64,
) -> Result<f64, EstimationError> {
    check_positive("alpha", alpha)?;
    check_positive("beta", beta)?;
    let system = problem.normal_matrix(beta / alpha);
    let x_hat =
        solve_symmetric(&system, problem.aty()).map_err(EstimationError::LinearSolveFailure)?;
    neg_log_posterior(problem, priors, &x_hat, alpha, beta)
}

/// Evaluate [`profile_objective`] over the Cartesian grid `alphas × betas`.
///
/// Returns a matrix with `alphas.len()` rows and `betas.len()` columns. The
/// grid points are independent exact solves, so rows are evaluated in
/// parallel.
pub fn profile_objective_grid(
    problem: &InverseProblem,
    priors: &Hyperpriors,
    alphas: &[f64],
    betas: &[f64],
) -> Result<Array2<f64>, EstimationError> {
    let rows: Vec<Vec<f64>> = alphas
        .par_iter()
        .map(|&alpha| {
            betas
                .iter()
                .map(|&beta| profile_objective(problem, priors, alpha, beta))
                .collect::<Result<Vec<f64>, EstimationError>>()
        })
        .collect::<Result<_, _>>()?;
    let mut grid = Array2::zeros((alphas.len(), betas.len()));
    for (i, row) in rows.into_iter().enumerate() {
        for (j, value) in row.into_iter().enumerate() {
            grid[[i, j]] = value;
        }
    }
    Ok(grid)
}
