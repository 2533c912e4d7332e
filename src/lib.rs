#![deny(dead_code)]
#![deny(unused_imports)]
#![allow(non_snake_case)]

pub mod cg;
pub mod engine;
pub mod faer_ndarray;
pub mod objective;
pub mod operators;
pub mod plot;
pub mod problem;
pub mod trajectory;

pub use cg::{CgOptions, CgOutcome, solve_spd};
pub use engine::{
    CgUpdate, EstimateOptions, EstimateResult, EstimationError, EstimationState, ExactUpdate,
    IterationSink, Method, PrecisionGradientUpdate, SignalGradientUpdate, UpdateOrder,
    UpdateStrategy, estimate, estimate_with_sink,
};
pub use objective::{
    PosteriorGradient, gradient, neg_log_posterior, profile_objective, profile_objective_grid,
};
pub use operators::{
    SyntheticProblem, forward_operator, second_difference, synthetic_deconvolution,
};
pub use problem::{Hyperpriors, InverseProblem};
pub use trajectory::{IterationRecord, Trajectory};
