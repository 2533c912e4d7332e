//! Conjugate-gradient solver for the symmetric positive definite
//! normal-equations systems produced by the inexact update strategy.
//!
//! The solver never fails: when the iteration cap is reached, or a breakdown
//! indicates the matrix is not positive definite, the last iterate is
//! returned with `converged = false` and the caller decides how to react.
//! The inexact engine variant counts these as soft divergences.

use ndarray::{Array1, Array2};

/// Inner-solver configuration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CgOptions {
    /// Relative residual tolerance: stop once `‖r‖ ≤ tol·‖b‖`.
    pub tol: f64,
    /// Iteration cap; `None` means `10·n`.
    pub max_iter: Option<usize>,
}

impl Default for CgOptions {
    fn default() -> Self {
        Self {
            tol: 1e-5,
            max_iter: None,
        }
    }
}

/// Result of one conjugate-gradient solve.
#[derive(Clone, Debug)]
pub struct CgOutcome {
    pub x: Array1<f64>,
    pub converged: bool,
    pub iterations: usize,
}

/// Solve `M·x = b` for symmetric positive definite `M` by conjugate
/// gradients, warm-started from `x0` when provided.
pub fn solve_spd(
    m: &Array2<f64>,
    b: &Array1<f64>,
    x0: Option<&Array1<f64>>,
    opts: &CgOptions,
) -> CgOutcome {
    let n = b.len();
    let max_iter = opts.max_iter.unwrap_or(10 * n.max(1));
    let mut x = match x0 {
        Some(x0) => x0.clone(),
        None => Array1::zeros(n),
    };

    let mut r = b - &m.dot(&x);
    let threshold_sq = {
        let t = opts.tol * b.dot(b).sqrt();
        t * t
    };
    let mut rs = r.dot(&r);
    if rs <= threshold_sq {
        return CgOutcome {
            x,
            converged: true,
            iterations: 0,
        };
    }

    let mut p = r.clone();
    let mut converged = false;
    let mut iterations = 0;
    for _ in 0..max_iter {
        let mp = m.dot(&p);
        let curvature = p.dot(&mp);
        if !(curvature > 0.0 && curvature.is_finite()) {
            // Breakdown: M is not positive definite along p.
            break;
        }
        let step = rs / curvature;
        x.scaled_add(step, &p);
        r.scaled_add(-step, &mp);
        iterations += 1;

        let rs_next = r.dot(&r);
        if rs_next <= threshold_sq {
            converged = true;
            break;
        }
        let ratio = rs_next / rs;
        p = &r + &(ratio * &p);
        rs = rs_next;
    }

    CgOutcome {
        x,
        converged,
        iterations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn matches_direct_solution_on_small_spd_system() {
        let m = array![[4.0, 1.0, 0.0], [1.0, 3.0, 0.5], [0.0, 0.5, 2.0]];
        let b = array![1.0, -2.0, 0.5];
        let out = solve_spd(&m, &b, None, &CgOptions::default());
        assert!(out.converged);
        let r = m.dot(&out.x) - &b;
        assert_abs_diff_eq!(r.dot(&r).sqrt(), 0.0, epsilon = 1e-4 * b.dot(&b).sqrt());
    }

    #[test]
    fn exact_convergence_within_n_steps_at_tight_tolerance() {
        // CG terminates in at most n steps in exact arithmetic.
        let m = array![[2.0, 0.0], [0.0, 5.0]];
        let b = array![2.0, 10.0];
        let opts = CgOptions {
            tol: 1e-12,
            max_iter: Some(2),
        };
        let out = solve_spd(&m, &b, None, &opts);
        assert!(out.converged);
        assert_abs_diff_eq!(out.x[0], 1.0, epsilon = 1e-10);
        assert_abs_diff_eq!(out.x[1], 2.0, epsilon = 1e-10);
    }

    #[test]
    fn iteration_cap_reports_non_convergence() {
        let m = array![[4.0, 1.0, 0.0], [1.0, 3.0, 0.5], [0.0, 0.5, 2.0]];
        let b = array![1.0, -2.0, 0.5];
        let opts = CgOptions {
            tol: 1e-14,
            max_iter: Some(1),
        };
        let out = solve_spd(&m, &b, None, &opts);
        assert!(!out.converged);
        assert_eq!(out.iterations, 1);
        assert!(out.x.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn warm_start_at_solution_converges_immediately() {
        let m = array![[3.0, 0.0], [0.0, 7.0]];
        let b = array![3.0, 14.0];
        let x0 = array![1.0, 2.0];
        let out = solve_spd(&m, &b, Some(&x0), &CgOptions::default());
        assert!(out.converged);
        assert_eq!(out.iterations, 0);
    }
}
