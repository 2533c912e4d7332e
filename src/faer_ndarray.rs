//! Thin interop between `ndarray` containers and faer's dense symmetric solvers.
//!
//! The estimation loop repeatedly solves `(AᵗA + λ·LᵗL)·x = Aᵗy`. The system
//! matrix is symmetric and positive definite for any λ > 0 whenever `A` has
//! full rank, so an LLT factorization is attempted first; ill-conditioned
//! systems fall back to LDLT. A solve that produces non-finite values is
//! reported as an error instead of letting NaNs propagate into the outer loop.

use faer::linalg::solvers::{self, Ldlt as FaerLdlt, Llt as FaerLlt, Solve as FaerSolve};
use faer::{Mat, MatRef, Side};
use ndarray::{Array1, Array2};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FaerLinalgError {
    #[error("LDLT factorization failed: {0:?}")]
    Ldlt(solvers::LdltError),
    #[error("linear solve produced non-finite values; the system matrix is singular to working precision")]
    NonFiniteSolution,
}

pub enum FaerSymmetricFactor {
    Llt(FaerLlt<f64>),
    Ldlt(FaerLdlt<f64>),
}

impl FaerSymmetricFactor {
    #[inline]
    pub fn solve(&self, rhs: MatRef<'_, f64>) -> Mat<f64> {
        match self {
            FaerSymmetricFactor::Llt(f) => f.solve(rhs),
            FaerSymmetricFactor::Ldlt(f) => f.solve(rhs),
        }
    }
}

/// Factorize a symmetric system with an LLT first attempt and LDLT fallback.
#[inline]
pub fn factorize_symmetric_with_fallback(
    matrix: MatRef<'_, f64>,
    side: Side,
) -> Result<FaerSymmetricFactor, FaerLinalgError> {
    if let Ok(llt) = FaerLlt::new(matrix, side) {
        return Ok(FaerSymmetricFactor::Llt(llt));
    }
    let ldlt = FaerLdlt::new(matrix, side).map_err(FaerLinalgError::Ldlt)?;
    Ok(FaerSymmetricFactor::Ldlt(ldlt))
}

#[inline]
pub fn array2_to_mat(array: &Array2<f64>) -> Mat<f64> {
    let (rows, cols) = array.dim();
    Mat::from_fn(rows, cols, |i, j| array[[i, j]])
}

#[inline]
pub fn array1_to_col_mat(array: &Array1<f64>) -> Mat<f64> {
    Mat::from_fn(array.len(), 1, |i, _| array[i])
}

#[inline]
pub fn col_mat_to_array1(mat: MatRef<'_, f64>) -> Array1<f64> {
    Array1::from_shape_fn(mat.nrows(), |i| mat[(i, 0)])
}

/// Solve a symmetric linear system `M·x = rhs` with the LLT/LDLT fallback
/// policy, rejecting non-finite solutions.
pub fn solve_symmetric(
    matrix: &Array2<f64>,
    rhs: &Array1<f64>,
) -> Result<Array1<f64>, FaerLinalgError> {
    let m = array2_to_mat(matrix);
    let factor = factorize_symmetric_with_fallback(m.as_ref(), Side::Lower)?;
    let solution = factor.solve(array1_to_col_mat(rhs).as_ref());
    let x = col_mat_to_array1(solution.as_ref());
    if x.iter().all(|v| v.is_finite()) {
        Ok(x)
    } else {
        Err(FaerLinalgError::NonFiniteSolution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn solves_well_conditioned_spd_system() {
        let m = array![[4.0, 1.0], [1.0, 3.0]];
        let rhs = array![1.0, 2.0];
        let x = solve_symmetric(&m, &rhs).expect("solve");
        // Residual check: M x == rhs.
        let r = m.dot(&x) - &rhs;
        assert_abs_diff_eq!(r.dot(&r), 0.0, epsilon = 1e-24);
    }

    #[test]
    fn rejects_singular_system() {
        let m = array![[1.0, 1.0], [1.0, 1.0]];
        let rhs = array![1.0, 0.0];
        assert!(solve_symmetric(&m, &rhs).is_err());
    }
}
