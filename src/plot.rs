//! Figure export for engine runs: objective curves, signal overlays,
//! parameter trajectories, and the 2-D posterior landscape.
//!
//! Everything here consumes finished engine output; nothing feeds back into
//! the estimation loop. Figures are written as PNG files under a
//! caller-supplied path.

use crate::engine::EstimateResult;
use crate::objective::profile_objective_grid;
use crate::problem::{Hyperpriors, InverseProblem};
use crate::trajectory::Trajectory;
use ndarray::Array1;
use plotters::coord::Shift;
use plotters::prelude::*;
use std::path::Path;

pub type PlotError = Box<dyn std::error::Error>;

fn padded_range(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (mut lo, mut hi) = (f64::INFINITY, f64::NEG_INFINITY);
    for v in values {
        if v.is_finite() {
            lo = lo.min(v);
            hi = hi.max(v);
        }
    }
    if !lo.is_finite() || !hi.is_finite() {
        return (0.0, 1.0);
    }
    let pad = (0.05 * (hi - lo)).max(1e-12);
    (lo - pad, hi + pad)
}

fn line_panel(
    area: &DrawingArea<BitMapBackend<'_>, Shift>,
    caption: &str,
    series: &[f64],
    log_x: bool,
) -> Result<(), PlotError> {
    let points: Vec<(f64, f64)> = series
        .iter()
        .enumerate()
        .map(|(k, &v)| {
            let x = if log_x {
                (k as f64 + 1.0).log10()
            } else {
                k as f64
            };
            (x, v)
        })
        .collect();
    let x_max = points.last().map(|p| p.0).unwrap_or(1.0).max(1e-12);
    let (y_lo, y_hi) = padded_range(points.iter().map(|p| p.1));

    let caption = if log_x {
        format!("{caption} (log10 iterations)")
    } else {
        caption.to_string()
    };
    let mut chart = ChartBuilder::on(area)
        .caption(caption, ("sans-serif", 20))
        .margin(10)
        .x_label_area_size(30)
        .y_label_area_size(50)
        .build_cartesian_2d(0.0..x_max, y_lo..y_hi)?;
    chart.configure_mesh().draw()?;
    chart.draw_series(LineSeries::new(points, &BLUE))?;
    Ok(())
}

fn signal_panel(
    area: &DrawingArea<BitMapBackend<'_>, Shift>,
    caption: &str,
    t: &Array1<f64>,
    series: &[(&str, &Array1<f64>, RGBColor)],
) -> Result<(), PlotError> {
    let (x_lo, x_hi) = padded_range(t.iter().copied());
    let (y_lo, y_hi) = padded_range(series.iter().flat_map(|(_, s, _)| s.iter().copied()));
    let mut chart = ChartBuilder::on(area)
        .caption(caption, ("sans-serif", 20))
        .margin(10)
        .x_label_area_size(30)
        .y_label_area_size(50)
        .build_cartesian_2d(x_lo..x_hi, y_lo..y_hi)?;
    chart.configure_mesh().draw()?;
    for (label, values, color) in series {
        let color = *color;
        chart
            .draw_series(LineSeries::new(
                t.iter().copied().zip(values.iter().copied()),
                &color,
            ))?
            .label(*label)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
    }
    chart
        .configure_series_labels()
        .border_style(BLACK)
        .background_style(WHITE.mix(0.8))
        .draw()?;
    Ok(())
}

/// Objective curve, true-vs-estimated signal overlay, and data-vs-refit
/// overlay for one finished run, side by side.
pub fn plot_results(
    path: &Path,
    problem: &InverseProblem,
    t: &Array1<f64>,
    x_true: Option<&Array1<f64>>,
    result: &EstimateResult,
) -> Result<(), PlotError> {
    let root = BitMapBackend::new(path, (1500, 500)).into_drawing_area();
    root.fill(&WHITE)?;
    let areas = root.split_evenly((1, 3));

    line_panel(&areas[0], "objective J", &result.objective, false)?;

    let mut signal_series: Vec<(&str, &Array1<f64>, RGBColor)> = Vec::new();
    if let Some(x_true) = x_true {
        signal_series.push(("x true", x_true, BLUE));
    }
    signal_series.push(("x estimate", &result.x, RED));
    signal_panel(&areas[1], "signal estimate", t, &signal_series)?;

    let refit = problem.forward().dot(&result.x);
    signal_panel(
        &areas[2],
        "observation vs refit",
        t,
        &[
            ("y delta", problem.observation(), BLUE),
            ("A x estimate", &refit, RED),
        ],
    )?;

    root.present()?;
    Ok(())
}

/// 2×2 panel of the per-iteration `alpha`, `beta`, `lambda`, and `‖x‖²`
/// trajectories. Long runs switch to a log10 iteration axis, short runs stay
/// linear so individual alternations remain visible.
pub fn plot_estimates(path: &Path, trajectory: &Trajectory) -> Result<(), PlotError> {
    let root = BitMapBackend::new(path, (1100, 900)).into_drawing_area();
    root.fill(&WHITE)?;
    let areas = root.split_evenly((2, 2));
    let log_x = trajectory.len() > 10;

    line_panel(&areas[0], "alpha", &trajectory.alphas(), log_x)?;
    line_panel(&areas[1], "beta", &trajectory.betas(), log_x)?;
    line_panel(&areas[2], "lambda", &trajectory.lambdas(), log_x)?;
    line_panel(&areas[3], "x norm squared", &trajectory.x_norms(), log_x)?;

    root.present()?;
    Ok(())
}

// Three-stop gradient from dark violet through teal to yellow.
fn heat_color(v: f64) -> RGBColor {
    let v = v.clamp(0.0, 1.0);
    let lerp = |a: u8, b: u8, t: f64| (a as f64 + (b as f64 - a as f64) * t).round() as u8;
    if v < 0.5 {
        let t = v * 2.0;
        RGBColor(lerp(68, 33, t), lerp(1, 145, t), lerp(84, 140, t))
    } else {
        let t = (v - 0.5) * 2.0;
        RGBColor(lerp(33, 253, t), lerp(145, 231, t), lerp(140, 37, t))
    }
}

/// Heat map of the profile objective over a `(beta, alpha)` grid with the
/// run's hyperparameter trajectory overlaid. The grid sweep is the
/// embarrassingly parallel part of the pipeline; `ns` controls resolution.
pub fn plot_contour(
    path: &Path,
    problem: &InverseProblem,
    priors: &Hyperpriors,
    trajectory: &Trajectory,
    alpha_range: (f64, f64),
    beta_range: (f64, f64),
    ns: usize,
) -> Result<(), PlotError> {
    let alphas: Vec<f64> = Array1::linspace(alpha_range.0, alpha_range.1, ns).to_vec();
    let betas: Vec<f64> = Array1::linspace(beta_range.0, beta_range.1, ns).to_vec();
    let grid = profile_objective_grid(problem, priors, &alphas, &betas)?;
    let (g_lo, g_hi) = grid
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let span = (g_hi - g_lo).max(1e-300);

    let root = BitMapBackend::new(path, (900, 900)).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption("profile objective", ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(beta_range.0..beta_range.1, alpha_range.0..alpha_range.1)?;
    chart
        .configure_mesh()
        .x_desc("beta")
        .y_desc("alpha")
        .draw()?;

    let d_alpha = (alpha_range.1 - alpha_range.0) / ns.max(1) as f64;
    let d_beta = (beta_range.1 - beta_range.0) / ns.max(1) as f64;
    chart.draw_series(alphas.iter().enumerate().flat_map(|(i, &alpha)| {
        let grid = &grid;
        let betas = &betas;
        betas.iter().enumerate().map(move |(j, &beta)| {
            let v = (grid[[i, j]] - g_lo) / span;
            Rectangle::new(
                [(beta, alpha), (beta + d_beta, alpha + d_alpha)],
                heat_color(v).filled(),
            )
        })
    }))?;

    // Trajectory overlay, thinned to keep the markers readable.
    let path_points: Vec<(f64, f64)> = trajectory
        .records()
        .iter()
        .map(|r| (r.beta, r.alpha))
        .collect();
    chart.draw_series(LineSeries::new(path_points.clone(), &WHITE))?;
    let stride = (path_points.len() / 40).max(1);
    chart.draw_series(
        path_points
            .iter()
            .step_by(stride)
            .map(|&(b, a)| Circle::new((b, a), 4, RED.filled())),
    )?;
    if let Some(&(b, a)) = path_points.last() {
        chart.draw_series(std::iter::once(Cross::new((b, a), 7, &BLACK)))?;
    }

    root.present()?;
    Ok(())
}
