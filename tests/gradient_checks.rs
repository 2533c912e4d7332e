//! Finite-difference validation of the analytic gradient components and
//! fixed-point consistency of the exact update.

use approx::assert_relative_eq;
use bayesreg::engine::{
    EstimateOptions, EstimationState, ExactUpdate, Method, UpdateStrategy, estimate,
};
use bayesreg::objective::precision_partials;
use bayesreg::operators::{second_difference, synthetic_deconvolution};
use bayesreg::problem::{Hyperpriors, InverseProblem};
use bayesreg::{gradient, neg_log_posterior};
use ndarray::{Array1, Array2};

fn small_problem() -> InverseProblem {
    let synthetic = synthetic_deconvolution(8, 0.05, 42).expect("synthetic");
    InverseProblem::new(synthetic.A, synthetic.L, synthetic.y_delta).expect("problem")
}

#[test]
fn scalar_partials_match_central_differences() {
    let problem = small_problem();
    let priors = Hyperpriors::default();
    let x = Array1::from_iter((0..8).map(|i| 0.3 + 0.1 * i as f64));
    let (alpha, beta) = (4.0, 0.7);
    let g = gradient(&problem, &priors, &x, alpha, beta).expect("gradient");

    let eps = 1e-6;
    let j = |a: f64, b: f64| neg_log_posterior(&problem, &priors, &x, a, b).expect("finite");
    let fd_alpha = (j(alpha + eps, beta) - j(alpha - eps, beta)) / (2.0 * eps);
    let fd_beta = (j(alpha, beta + eps) - j(alpha, beta - eps)) / (2.0 * eps);

    assert_relative_eq!(g.alpha, fd_alpha, max_relative = 1e-6);
    assert_relative_eq!(g.beta, fd_beta, max_relative = 1e-6);
}

#[test]
fn signal_component_is_normal_residual_scaling_of_true_gradient() {
    // The x component carries the 1/alpha normal-equations scaling, so the
    // finite difference of J along e_i must equal alpha times the component.
    let problem = small_problem();
    let priors = Hyperpriors::default();
    let x = Array1::from_iter((0..8).map(|i| (-0.5_f64).powi(i as i32)));
    let (alpha, beta) = (3.0, 1.2);
    let g = gradient(&problem, &priors, &x, alpha, beta).expect("gradient");

    let eps = 1e-6;
    for i in 0..x.len() {
        let mut plus = x.clone();
        plus[i] += eps;
        let mut minus = x.clone();
        minus[i] -= eps;
        let fd = (neg_log_posterior(&problem, &priors, &plus, alpha, beta).expect("finite")
            - neg_log_posterior(&problem, &priors, &minus, alpha, beta).expect("finite"))
            / (2.0 * eps);
        assert_relative_eq!(alpha * g.x[i], fd, max_relative = 1e-5, epsilon = 1e-8);
    }
}

#[test]
fn cheap_precision_partials_agree_with_full_gradient() {
    let problem = small_problem();
    let priors = Hyperpriors::default();
    let x = Array1::from_elem(8, 0.25);
    let (alpha, beta) = (9.0, 0.4);
    let full = gradient(&problem, &priors, &x, alpha, beta).expect("gradient");
    let (d_alpha, d_beta) =
        precision_partials(&problem, &priors, &x, alpha, beta).expect("partials");
    assert_eq!(full.alpha, d_alpha);
    assert_eq!(full.beta, d_beta);
}

#[test]
fn exact_update_leaves_its_fixed_point_unchanged() {
    // Once the alternating update has settled, applying it one more time must
    // leave (x, alpha, beta) numerically unchanged.
    let n = 30;
    let t = Array1::linspace(0.0, 1.0, n);
    let x_true = t.mapv(|v| (std::f64::consts::PI * v).sin());
    let steps = Array1::from_iter((0..n).map(|i| i as f64));
    let l = second_difference(&steps).expect("operator");
    let problem = InverseProblem::new(Array2::eye(n), l, x_true).expect("problem");

    let opts = EstimateOptions::default();
    let mut strategy = ExactUpdate;
    let result = estimate(&problem, &mut strategy, &opts).expect("run");
    assert!(result.converged);

    // Polish well past the stopping tolerance so the comparison is against
    // the fixed point itself, not a near-converged iterate.
    let mut state = EstimationState {
        x: result.x,
        alpha: result.alpha,
        beta: result.beta,
    };
    for _ in 0..100 {
        strategy
            .update_signal(&problem, &opts, &mut state)
            .expect("signal");
        strategy
            .update_precisions(&problem, &opts, &mut state)
            .expect("precisions");
    }
    let settled = state.clone();
    strategy
        .update_signal(&problem, &opts, &mut state)
        .expect("signal");
    strategy
        .update_precisions(&problem, &opts, &mut state)
        .expect("precisions");

    assert_relative_eq!(state.alpha, settled.alpha, max_relative = 1e-10);
    assert_relative_eq!(state.beta, settled.beta, max_relative = 1e-10);
    let dx = &state.x - &settled.x;
    assert!(
        dx.dot(&dx) <= 1e-20 * settled.x.dot(&settled.x).max(1.0),
        "signal moved by squared norm {}",
        dx.dot(&dx)
    );
}

#[test]
fn exact_solution_zeroes_the_stationarity_conditions() {
    // At the converged point the signal solves the normal equations and the
    // precisions sit at their Gamma-posterior closed forms, so all three
    // gradient components should be tiny.
    let problem = small_problem();
    let opts = EstimateOptions::default();
    let mut strategy = Method::Exact.strategy();
    let result = estimate(&problem, strategy.as_mut(), &opts).expect("run");
    assert!(result.converged);

    let g = gradient(
        &problem,
        &opts.hyperpriors,
        &result.x,
        result.alpha,
        result.beta,
    )
    .expect("gradient");
    assert!(
        g.squared_norm() < opts.tol,
        "stationarity violated: {}",
        g.squared_norm()
    );
}
