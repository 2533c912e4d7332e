//! Read-only problem data shared by every estimation variant.
//!
//! The forward operator `A`, the regularization operator `L`, and the noisy
//! observation `y_delta` are fixed for the duration of a run. The products
//! `AᵗA`, `LᵗL`, and `Aᵗy` appear in every objective, gradient, and update
//! evaluation, so they are computed once at construction and borrowed from
//! there on.

use crate::engine::EstimationError;
use ndarray::{Array1, Array2};

/// Gamma shape/rate pairs for the hyperpriors on the noise precision `alpha`
/// (`a0`, `b0`) and the smoothness-prior precision `beta` (`a1`, `b1`).
///
/// The defaults are near-noninformative: shape `1 + 1e-6`, rate `1e-6`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Hyperpriors {
    pub a0: f64,
    pub b0: f64,
    pub a1: f64,
    pub b1: f64,
}

impl Default for Hyperpriors {
    fn default() -> Self {
        Self {
            a0: 1.0 + 1e-6,
            b0: 1e-6,
            a1: 1.0 + 1e-6,
            b1: 1e-6,
        }
    }
}

impl Hyperpriors {
    pub fn validate(&self) -> Result<(), EstimationError> {
        for (name, value) in [
            ("a0", self.a0),
            ("b0", self.b0),
            ("a1", self.a1),
            ("b1", self.b1),
        ] {
            if !(value > 0.0 && value.is_finite()) {
                return Err(EstimationError::InvalidInput(format!(
                    "hyperprior {name} must be a positive finite number, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// One instance of the linear inverse problem `y_delta = A·x + noise`.
pub struct InverseProblem {
    A: Array2<f64>,
    L: Array2<f64>,
    y_delta: Array1<f64>,
    // Cached products, read-only after construction.
    AtA: Array2<f64>,
    LtL: Array2<f64>,
    Aty: Array1<f64>,
}

impl InverseProblem {
    pub fn new(
        A: Array2<f64>,
        L: Array2<f64>,
        y_delta: Array1<f64>,
    ) -> Result<Self, EstimationError> {
        let n = y_delta.len();
        if n == 0 {
            return Err(EstimationError::InvalidInput(
                "observation vector must be non-empty".to_string(),
            ));
        }
        if A.dim() != (n, n) {
            return Err(EstimationError::InvalidInput(format!(
                "forward operator has shape {:?}, expected ({n}, {n})",
                A.dim()
            )));
        }
        if L.dim() != (n, n) {
            return Err(EstimationError::InvalidInput(format!(
                "regularization operator has shape {:?}, expected ({n}, {n})",
                L.dim()
            )));
        }
        let AtA = A.t().dot(&A);
        let LtL = L.t().dot(&L);
        let Aty = A.t().dot(&y_delta);
        Ok(Self {
            A,
            L,
            y_delta,
            AtA,
            LtL,
            Aty,
        })
    }

    pub fn n(&self) -> usize {
        self.y_delta.len()
    }

    pub fn forward(&self) -> &Array2<f64> {
        &self.A
    }

    pub fn regularizer(&self) -> &Array2<f64> {
        &self.L
    }

    pub fn observation(&self) -> &Array1<f64> {
        &self.y_delta
    }

    pub fn aty(&self) -> &Array1<f64> {
        &self.Aty
    }

    /// The normal-equations system matrix `AᵗA + λ·LᵗL`.
    pub fn normal_matrix(&self, lambda: f64) -> Array2<f64> {
        &self.AtA + &(lambda * &self.LtL)
    }

    /// `‖A·x − y_delta‖²`.
    pub fn residual_norm_sq(&self, x: &Array1<f64>) -> f64 {
        let r = self.A.dot(x) - &self.y_delta;
        r.dot(&r)
    }

    /// `‖L·x‖²`.
    pub fn smoothness_norm_sq(&self, x: &Array1<f64>) -> f64 {
        let s = self.L.dot(x);
        s.dot(&s)
    }

    /// The applied gradient `(AᵗA + λ·LᵗL)·x − Aᵗy` without forming the
    /// system matrix.
    pub fn normal_residual(&self, x: &Array1<f64>, lambda: f64) -> Array1<f64> {
        self.AtA.dot(x) + lambda * self.LtL.dot(x) - &self.Aty
    }

    /// Scale-matched adjoint back-projection used as the shared initial guess:
    /// `x₀ = c·Aᵗy` with `c = ‖Aᵗy‖² / ‖AAᵗy‖²`, so the initial residual
    /// magnitude is consistent with the data's energy.
    pub fn initial_signal(&self) -> Array1<f64> {
        let aaty = self.A.dot(&self.Aty);
        let denom = aaty.dot(&aaty);
        if denom > 0.0 {
            (self.Aty.dot(&self.Aty) / denom) * &self.Aty
        } else {
            Array1::zeros(self.n())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array2, array};

    #[test]
    fn rejects_mismatched_shapes() {
        let a = Array2::<f64>::eye(3);
        let l = Array2::<f64>::eye(2);
        let y = array![1.0, 2.0, 3.0];
        assert!(InverseProblem::new(a, l, y).is_err());
    }

    #[test]
    fn initial_guess_matches_identity_back_projection() {
        // With A = I the back-projection scale is exactly 1, so x0 == y.
        let n = 4;
        let y = array![0.5, -1.0, 2.0, 0.25];
        let problem =
            InverseProblem::new(Array2::eye(n), Array2::eye(n), y.clone()).expect("problem");
        let x0 = problem.initial_signal();
        for i in 0..n {
            assert_abs_diff_eq!(x0[i], y[i], epsilon = 1e-15);
        }
    }

    #[test]
    fn normal_residual_matches_explicit_form() {
        let a = array![[1.0, 0.5], [0.0, 2.0]];
        let l = array![[1.0, -1.0], [0.0, 1.0]];
        let y = array![1.0, -2.0];
        let problem = InverseProblem::new(a, l, y).expect("problem");
        let x = array![0.3, 0.7];
        let lambda = 0.4;
        let explicit = problem.normal_matrix(lambda).dot(&x) - problem.aty();
        let fused = problem.normal_residual(&x, lambda);
        for i in 0..2 {
            assert_abs_diff_eq!(explicit[i], fused[i], epsilon = 1e-14);
        }
    }

    #[test]
    fn default_hyperpriors_validate() {
        Hyperpriors::default().validate().expect("defaults valid");
        let bad = Hyperpriors {
            b0: 0.0,
            ..Hyperpriors::default()
        };
        assert!(bad.validate().is_err());
    }
}
