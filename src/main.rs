use bayesreg::engine::{EstimateOptions, EstimateResult, Method, estimate};
use bayesreg::operators::synthetic_deconvolution;
use bayesreg::plot::{plot_contour, plot_estimates, plot_results};
use bayesreg::problem::InverseProblem;
use bayesreg::{CgOptions, EstimationError};
use clap::{Parser, ValueEnum};
use comfy_table::{Cell, ContentArrangement, Row, Table, presets::UTF8_FULL};
use std::fs;
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum MethodArg {
    Exact,
    PrecisionGradient,
    SignalGradient,
    ConjugateGradient,
    All,
}

impl MethodArg {
    fn methods(self) -> Vec<Method> {
        match self {
            MethodArg::Exact => vec![Method::Exact],
            MethodArg::PrecisionGradient => vec![Method::PrecisionGradient],
            MethodArg::SignalGradient => vec![Method::SignalGradient],
            MethodArg::ConjugateGradient => vec![Method::ConjugateGradient],
            MethodArg::All => Method::ALL.to_vec(),
        }
    }
}

/// Compare hierarchical-Bayes estimation strategies on a synthetic 1-D
/// deconvolution problem.
#[derive(Parser, Debug)]
#[command(name = "bayesreg")]
#[command(about = "Empirical-Bayes regularization testbed", long_about = None)]
struct Cli {
    /// Grid size of the synthetic problem.
    #[arg(long, default_value_t = 50)]
    n: usize,
    /// Standard deviation of the additive observation noise.
    #[arg(long, default_value_t = 0.01)]
    noise: f64,
    /// RNG seed for the synthetic noise.
    #[arg(long, default_value_t = 7)]
    seed: u64,
    /// Which estimation variant(s) to run.
    #[arg(long, value_enum, default_value = "all")]
    method: MethodArg,
    /// Outer iteration budget.
    #[arg(long, default_value_t = 10_000)]
    max_iter: usize,
    /// Stopping tolerance for the squared gradient norm.
    #[arg(long, default_value_t = 1e-5)]
    tol: f64,
    /// Step size for the gradient-stepped signal update.
    #[arg(long, default_value_t = 1e-3)]
    mu: f64,
    /// Step size for the gradient-stepped alpha update.
    #[arg(long, default_value_t = 1e-3)]
    mu_alpha: f64,
    /// Step size for the gradient-stepped beta update.
    #[arg(long, default_value_t = 1e-3)]
    mu_beta: f64,
    /// Iteration cap for the inner conjugate-gradient solver.
    #[arg(long)]
    cg_max_iter: Option<usize>,
    /// Output directory for trajectory CSVs and figures.
    #[arg(long, default_value = "out")]
    output_dir: PathBuf,
    /// Label prefixed to every output file name.
    #[arg(long, default_value = "bayesreg")]
    label: String,
    /// Also render the (alpha, beta) posterior landscape for each run.
    #[arg(long, default_value_t = false)]
    contour: bool,
}

struct RunSummary {
    method: Method,
    result: EstimateResult,
    error_sq: f64,
}

fn run_experiment(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let synthetic = synthetic_deconvolution(cli.n, cli.noise, cli.seed)?;
    let problem = InverseProblem::new(
        synthetic.A.clone(),
        synthetic.L.clone(),
        synthetic.y_delta.clone(),
    )?;
    let opts = EstimateOptions {
        max_iter: cli.max_iter,
        tol: cli.tol,
        mu: cli.mu,
        mu_alpha: cli.mu_alpha,
        mu_beta: cli.mu_beta,
        cg: CgOptions {
            max_iter: cli.cg_max_iter,
            ..CgOptions::default()
        },
        ..EstimateOptions::default()
    };

    fs::create_dir_all(&cli.output_dir)?;

    let mut summaries = Vec::new();
    for method in cli.method.methods() {
        log::info!("running {} variant", method.name());
        let mut strategy = method.strategy();
        let result = match estimate(&problem, strategy.as_mut(), &opts) {
            Ok(result) => result,
            Err(err @ EstimationError::InvalidHyperparameter { .. }) => {
                // A too-aggressive step size kills one variant, not the run.
                log::error!("{} variant aborted: {err}", method.name());
                continue;
            }
            Err(err) => return Err(err.into()),
        };

        let stem = format!("{}_{}", cli.label, method.name());
        let csv_path = cli.output_dir.join(format!("{stem}_trajectory.csv"));
        result
            .trajectory
            .write_csv(fs::File::create(&csv_path)?)
            .map_err(|e| format!("writing {}: {e}", csv_path.display()))?;

        plot_results(
            &cli.output_dir.join(format!("{stem}_results.png")),
            &problem,
            &synthetic.t,
            Some(&synthetic.x_true),
            &result,
        )?;
        plot_estimates(
            &cli.output_dir.join(format!("{stem}_estimates.png")),
            &result.trajectory,
        )?;
        if cli.contour {
            plot_contour(
                &cli.output_dir.join(format!("{stem}_contour.png")),
                &problem,
                &opts.hyperpriors,
                &result.trajectory,
                (0.5, 150.0),
                (0.01, 10.0),
                50,
            )?;
        }

        let diff = &synthetic.x_true - &result.x;
        summaries.push(RunSummary {
            method,
            error_sq: diff.dot(&diff),
            result,
        });
    }

    print_summary(&summaries);
    Ok(())
}

fn print_summary(summaries: &[RunSummary]) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(Row::from(vec![
            "method",
            "iterations",
            "converged",
            "alpha",
            "beta",
            "lambda",
            "error",
            "final obj",
            "inner misses",
        ]));
    for s in summaries {
        table.add_row(Row::from(vec![
            Cell::new(s.method.name()),
            Cell::new(s.result.iterations),
            Cell::new(s.result.converged),
            Cell::new(format!("{:.4e}", s.result.alpha)),
            Cell::new(format!("{:.4e}", s.result.beta)),
            Cell::new(format!("{:.4e}", s.result.lambda())),
            Cell::new(format!("{:.4e}", s.error_sq)),
            Cell::new(format!(
                "{:.6e}",
                s.result.objective.last().copied().unwrap_or(f64::NAN)
            )),
            Cell::new(s.result.inner_solve_failures),
        ]));
    }
    println!("{table}");
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    if let Err(err) = run_experiment(&cli) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
